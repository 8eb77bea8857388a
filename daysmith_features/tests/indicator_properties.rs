use anyhow::Result;
use chrono::NaiveDate;
use daysmith_features::{compute_indicators, features::INDICATOR_CANDIDATES, prepare_dataset_as_of};
use daysmith_rs::{PipelineConfig, PriceFrame, RawColumn, RawIndex, RawTable, sanitize};

/// Deterministic xorshift walk so the fixtures need no RNG dependency.
fn random_walk(n: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut state = seed;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % 10_000) as f64 / 10_000.0
    };
    let mut close = Vec::with_capacity(n);
    let mut volume = Vec::with_capacity(n);
    let mut price = 100.0;
    for _ in 0..n {
        price *= 1.0 + (next() - 0.5) * 0.04;
        close.push(price);
        volume.push(500_000.0 + 2_000_000.0 * next().powi(3));
    }
    (close, volume)
}

fn table(n: usize, seed: u64) -> RawTable {
    let (close, volume) = random_walk(n, seed);
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let dates = (0..n)
        .map(|i| start + chrono::Duration::days(i as i64))
        .collect();
    RawTable::new(
        RawIndex::Dates(dates),
        vec![
            RawColumn::from_values("Open", &close),
            RawColumn::from_values("High", &close.iter().map(|c| c * 1.01).collect::<Vec<_>>()),
            RawColumn::from_values("Low", &close.iter().map(|c| c * 0.99).collect::<Vec<_>>()),
            RawColumn::from_values("Close", &close),
            RawColumn::from_values("Volume", &volume),
        ],
    )
}

fn indicator_frame(n: usize, seed: u64) -> Result<PriceFrame> {
    let (frame, _) = compute_indicators(sanitize(table(n, seed))?.frame)?;
    Ok(frame)
}

#[test]
fn bounded_indicators_stay_in_range() -> Result<()> {
    for seed in [7, 42, 1234] {
        let frame = indicator_frame(260, seed)?;
        assert!(
            frame
                .float_column("RSI")?
                .iter()
                .all(|v| (0.0..=100.0).contains(v))
        );
        for window in [5, 10, 20] {
            let rank = frame.float_column(&format!("Close_Rank_{window}"))?;
            assert!(rank.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
    Ok(())
}

#[test]
fn macd_histogram_is_exact_difference() -> Result<()> {
    let frame = indicator_frame(260, 99)?;
    let macd = frame.float_column("MACD")?;
    let signal = frame.float_column("MACD_Signal")?;
    let histogram = frame.float_column("MACD_Histogram")?;
    for i in 0..macd.len() {
        assert_eq!(histogram[i], macd[i] - signal[i], "row {i}");
    }
    Ok(())
}

#[test]
fn volume_ratio_is_neutral_until_the_average_exists() -> Result<()> {
    let frame = indicator_frame(120, 5)?;
    let ratio = frame.float_column("Volume_Ratio")?;
    assert!(ratio[..19].iter().all(|v| *v == 1.0));
    assert!(ratio.iter().all(|v| v.is_finite() && *v > 0.0));
    let spikes = frame.float_column("Volume_Spike")?;
    for (r, s) in ratio.iter().zip(spikes.iter()) {
        assert_eq!(*s == 1.0, *r > 2.0);
    }
    Ok(())
}

#[test]
fn dataset_preserves_rows_and_binary_labels() -> Result<()> {
    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    for rows in [50, 75, 300] {
        let dataset = prepare_dataset_as_of(table(rows, 3), &PipelineConfig::default(), today)?;
        assert_eq!(dataset.n_samples(), rows);
        assert_eq!(dataset.features.n_rows(), rows);
        assert_eq!(dataset.cleaned.height(), rows);
        assert!(dataset.labels.iter().all(|label| *label <= 1));
        assert!(dataset.features.all_finite());
        let balance = dataset.class_balance();
        assert_eq!(balance.total(), rows);
        let (x, y) = dataset.trainable();
        assert_eq!(x.n_rows(), rows - 1);
        assert_eq!(y.len(), rows - 1);
    }
    Ok(())
}

#[test]
fn indicator_candidates_are_all_resolved() -> Result<()> {
    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let dataset = prepare_dataset_as_of(table(90, 11), &PipelineConfig::default(), today)?;
    for name in INDICATOR_CANDIDATES {
        assert!(dataset.feature_names.iter().any(|f| f == name));
    }
    Ok(())
}
