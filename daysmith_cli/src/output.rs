use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use daysmith_features::{ClassBalance, Dataset};
use daysmith_rs::{Diagnostics, FeatureScore, PipelineConfig, rank_features};
use polars::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreparedStatus {
    Written,
    Unchanged,
    Overwritten,
}

#[derive(Debug)]
pub struct PreparedFile {
    pub path: PathBuf,
    pub sha256: String,
    pub status: PreparedStatus,
}

/// Everything a caller needs to audit one prepared dataset without reading the CSV.
#[derive(Debug, Serialize)]
pub struct Summary<'a> {
    pub symbol: &'a str,
    pub rows: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub feature_names: &'a [String],
    pub selected_features: Vec<FeatureScore>,
    pub class_balance: ClassBalance,
    pub prepared_csv: String,
    pub prepared_sha256: &'a str,
    pub config: &'a PipelineConfig,
    pub diagnostics: &'a Diagnostics,
}

pub fn prepared_path(output_dir: &Path, symbol: &str) -> PathBuf {
    output_dir.join(format!("{symbol}_prepared.csv"))
}

pub fn summary_path(output_dir: &Path, symbol: &str) -> PathBuf {
    output_dir.join(format!("{symbol}_summary.json"))
}

/// Persist the cleaned table with its dates. An existing file is reused when
/// its bytes hash the same as the new table; a differing file is only
/// replaced when `ack_new_df` is set.
pub fn write_prepared(
    dataset: &Dataset,
    output_dir: &Path,
    symbol: &str,
    ack_new_df: bool,
) -> Result<PreparedFile> {
    let path = prepared_path(output_dir, symbol);
    let mut df = dataset.cleaned.to_data_frame_with_dates()?;
    let new_hash = sha256_dataframe_as_csv(&mut df)?;

    let mut status = PreparedStatus::Written;
    if path.exists() {
        let old_hash = sha256_file(&path)?;
        if old_hash == new_hash {
            info!(
                rows = df.height(),
                path = %path.display(),
                "Prepared dataset unchanged; reusing existing file"
            );
            return Ok(PreparedFile {
                path,
                sha256: new_hash,
                status: PreparedStatus::Unchanged,
            });
        }
        if !ack_new_df {
            return Err(anyhow!(
                "Existing {symbol}_prepared.csv differs from the newly prepared dataset.\n\
                 path: {}\n\
                 existing sha256: {}\n\
                 new sha256: {}\n\
                 Rerun with --ack-new-df to overwrite, or choose a fresh --output-dir \
                 to keep prior results.",
                path.display(),
                old_hash,
                new_hash
            ));
        }
        warn!(
            existing_hash = %old_hash,
            new_hash = %new_hash,
            path = %path.display(),
            "Prepared dataset hash mismatch; overwriting because ack_new_df=true"
        );
        status = PreparedStatus::Overwritten;
    }

    let mut file =
        File::create(&path).with_context(|| format!("Unable to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| "Failed to persist prepared dataset")?;
    info!(rows = df.height(), path = %path.display(), "Prepared dataset written");
    Ok(PreparedFile {
        path,
        sha256: new_hash,
        status,
    })
}

/// ANOVA scores of the dataset's features against its target, best `top_k` first.
pub fn top_features(dataset: &Dataset, config: &PipelineConfig) -> Result<Vec<FeatureScore>> {
    let mut columns = dataset.feature_names.clone();
    columns.push(config.target_column.clone());
    let subset = dataset.cleaned.select(columns.as_slice())?;
    let mut ranked = rank_features(subset.data_frame(), &config.target_column)?;
    ranked.truncate(config.top_k);
    Ok(ranked)
}

pub fn write_summary(path: &Path, summary: &Summary<'_>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn ensure_output_dir(output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Unable to create {}", output_dir.display()))
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Unable to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn sha256_dataframe_as_csv(df: &mut DataFrame) -> Result<String> {
    let mut writer = HashingWriter::new(io::sink());
    CsvWriter::new(&mut writer)
        .include_header(true)
        .finish(df)
        .with_context(|| "Failed to hash prepared dataset")?;
    Ok(writer.finalize_hex())
}

/// Forwards writes to `inner` while hashing every byte.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_writer_matches_file_hash() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frame.csv");
        let mut df = df!(
            "Date" => ["2024-01-02", "2024-01-03"],
            "Close" => [1.5, 2.5],
        )?;
        let mut file = File::create(&path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        drop(file);
        assert_eq!(sha256_file(&path)?, sha256_dataframe_as_csv(&mut df)?);
        Ok(())
    }

    #[test]
    fn output_paths_are_named_after_the_symbol() {
        let dir = Path::new("out");
        assert_eq!(prepared_path(dir, "AAPL"), dir.join("AAPL_prepared.csv"));
        assert_eq!(summary_path(dir, "AAPL"), dir.join("AAPL_summary.json"));
    }
}
