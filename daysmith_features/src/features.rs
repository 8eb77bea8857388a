use daysmith_rs::data::{CLOSE, VOLUME};
use daysmith_rs::{FeatureCategory, FeatureRegistry, FeatureSpec, Rule};

pub const RETURNS: &str = "Returns";
pub const LOG_RETURNS: &str = "Log_Returns";
pub const VOLUME_SMA: &str = "Volume_SMA_20";
pub const VOLUME_RATIO: &str = "Volume_Ratio";
pub const RSI: &str = "RSI";
pub const MACD: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD_Signal";
/// Hidden MACD line that keeps NaN where either average is undefined.
pub const MACD_LINE: &str = "MACD_Line";
pub const MACD_HISTOGRAM: &str = "MACD_Histogram";

pub const MOVING_AVERAGE_WINDOWS: [usize; 4] = [5, 10, 20, 50];
pub const RANK_WINDOWS: [usize; 3] = [5, 10, 20];
pub const VOLATILITY_WINDOWS: [usize; 3] = [5, 10, 20];
pub const MOMENTUM_PERIODS: [usize; 4] = [1, 3, 5, 10];
pub const VOLUME_WINDOW: usize = 20;
pub const RSI_WINDOW: usize = 14;
pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const VOLUME_SPIKE_RATIO: f64 = 2.0;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL_SPAN: usize = 9;

/// Non-lookback features offered to the model, in candidate order.
pub const INDICATOR_CANDIDATES: &[&str] = &[
    "RSI",
    "MACD",
    "MACD_Signal",
    "MACD_Histogram",
    "SMA_20",
    "EMA_20",
    "SMA_50",
    "EMA_50",
    "Volume_Ratio",
    "Volume_Spike",
    "RSI_30",
    "RSI_70",
];

fn source(name: &str) -> String {
    name.to_string()
}

/// Indicator columns derived from a sanitized OHLCV frame.
pub fn indicator_registry() -> FeatureRegistry {
    use FeatureCategory::*;

    let mut registry = FeatureRegistry::new();
    registry
        .register(FeatureSpec::new(
            RETURNS,
            Returns,
            Rule::PctChange {
                source: source(CLOSE),
                periods: 1,
            },
        ))
        .register(FeatureSpec::new(
            LOG_RETURNS,
            Returns,
            Rule::LogReturn {
                source: source(CLOSE),
            },
        ));

    for window in MOVING_AVERAGE_WINDOWS {
        registry
            .register(FeatureSpec::new(
                format!("SMA_{window}"),
                Trend,
                Rule::RollingMean {
                    source: source(CLOSE),
                    window,
                },
            ))
            .register(FeatureSpec::new(
                format!("EMA_{window}"),
                Trend,
                Rule::Ema {
                    source: source(CLOSE),
                    span: window,
                },
            ));
    }

    for window in RANK_WINDOWS {
        registry.register(FeatureSpec::new(
            format!("Close_Rank_{window}"),
            Oscillator,
            Rule::RangeRank {
                source: source(CLOSE),
                window,
            },
        ));
    }

    registry
        .register(FeatureSpec::new(
            VOLUME_SMA,
            Volume,
            Rule::RollingMeanOrSource {
                source: source(VOLUME),
                window: VOLUME_WINDOW,
            },
        ))
        .register(FeatureSpec::new(
            VOLUME_RATIO,
            Volume,
            Rule::Ratio {
                numerator: source(VOLUME),
                denominator: source(VOLUME_SMA),
                neutral: 1.0,
            },
        ))
        .register(FeatureSpec::new(
            "Volume_Spike",
            Flag,
            Rule::Above {
                source: source(VOLUME_RATIO),
                level: VOLUME_SPIKE_RATIO,
            },
        ));

    for window in VOLATILITY_WINDOWS {
        registry.register(FeatureSpec::new(
            format!("Volatility_{window}"),
            Volatility,
            Rule::RollingStd {
                source: source(RETURNS),
                window,
            },
        ));
    }

    for periods in MOMENTUM_PERIODS {
        registry.register(FeatureSpec::new(
            format!("Momentum_{periods}"),
            Momentum,
            Rule::PctChange {
                source: source(CLOSE),
                periods,
            },
        ));
    }

    registry
        .register(FeatureSpec::new(
            RSI,
            Oscillator,
            Rule::Rsi {
                source: source(CLOSE),
                window: RSI_WINDOW,
            },
        ))
        .register(FeatureSpec::new(
            "RSI_30",
            Flag,
            Rule::Below {
                source: source(RSI),
                level: RSI_OVERSOLD,
            },
        ))
        .register(FeatureSpec::new(
            "RSI_70",
            Flag,
            Rule::Above {
                source: source(RSI),
                level: RSI_OVERBOUGHT,
            },
        ));

    let fast = format!("EMA_{MACD_FAST}");
    let slow = format!("EMA_{MACD_SLOW}");
    registry
        .register(
            FeatureSpec::new(
                fast.clone(),
                Trend,
                Rule::Ema {
                    source: source(CLOSE),
                    span: MACD_FAST,
                },
            )
            .hidden(),
        )
        .register(
            FeatureSpec::new(
                slow.clone(),
                Trend,
                Rule::Ema {
                    source: source(CLOSE),
                    span: MACD_SLOW,
                },
            )
            .hidden(),
        )
        .register(
            FeatureSpec::new(
                MACD_LINE,
                Momentum,
                Rule::Difference {
                    left: fast.clone(),
                    right: slow.clone(),
                    neutral: f64::NAN,
                },
            )
            .hidden(),
        )
        .register(FeatureSpec::new(
            MACD,
            Momentum,
            Rule::Difference {
                left: fast,
                right: slow,
                neutral: 0.0,
            },
        ))
        // The signal averages the unresolved line so leading gaps are skipped
        // rather than counted as zeros.
        .register(FeatureSpec::new(
            MACD_SIGNAL,
            Momentum,
            Rule::Ema {
                source: source(MACD_LINE),
                span: MACD_SIGNAL_SPAN,
            },
        ))
        .register(FeatureSpec::new(
            MACD_HISTOGRAM,
            Momentum,
            Rule::Difference {
                left: source(MACD),
                right: source(MACD_SIGNAL),
                neutral: 0.0,
            },
        ));

    registry
}

pub fn lookback_returns(days: usize) -> String {
    format!("Returns_{days}d")
}

pub fn lookback_volatility(days: usize) -> String {
    format!("Volatility_{days}d")
}

pub fn lookback_average(days: usize) -> String {
    format!("MA_{days}d")
}

/// Lookback-window features plus the next-day direction label.
pub fn lookback_registry(lookback_days: &[usize], target_column: &str) -> FeatureRegistry {
    let mut registry = FeatureRegistry::new();
    for &days in lookback_days {
        registry
            .register(FeatureSpec::new(
                lookback_returns(days),
                FeatureCategory::Returns,
                Rule::PctChange {
                    source: source(CLOSE),
                    periods: days,
                },
            ))
            .register(FeatureSpec::new(
                lookback_volatility(days),
                FeatureCategory::Volatility,
                Rule::RollingStd {
                    source: source(RETURNS),
                    window: days,
                },
            ))
            .register(FeatureSpec::new(
                lookback_average(days),
                FeatureCategory::Trend,
                Rule::RollingMean {
                    source: source(CLOSE),
                    window: days,
                },
            ));
    }
    registry.register(FeatureSpec::new(
        target_column,
        FeatureCategory::Label,
        Rule::NextPositive {
            source: source(RETURNS),
        },
    ));
    registry
}

/// Candidate model inputs: all `Returns_{d}d`, then all `Volatility_{d}d`,
/// then all `MA_{d}d`, then the indicator candidates.
pub fn candidate_features(lookback_days: &[usize]) -> Vec<String> {
    let mut names: Vec<String> = lookback_days.iter().map(|&d| lookback_returns(d)).collect();
    names.extend(lookback_days.iter().map(|&d| lookback_volatility(d)));
    names.extend(lookback_days.iter().map(|&d| lookback_average(d)));
    names.extend(INDICATOR_CANDIDATES.iter().map(|name| name.to_string()));
    names
}
