use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::category::Category;
use crate::error::Result;

pub const DEFAULT_ENDPOINT: &str =
    "https://arquivos.receitafederal.gov.br/dados/cnpj/dados_abertos_cnpj/2025-09/";

/// Runtime settings. Layered as: built-in defaults, optional `pipeline.toml`,
/// then `CNPJ_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub endpoint: String,
    pub user_agent: String,
    pub listing_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// No timeout when unset.
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub report_file: PathBuf,
    pub min_entry_bytes: u64,
    pub sniff_rows: usize,
    pub read_batch_size: usize,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("pipeline"))
    }

    /// `file_stem` is resolved without an extension, so `pipeline` picks up
    /// `pipeline.toml`, `pipeline.yaml`, ... when present.
    pub fn load_from(file_stem: &Path) -> Result<Self> {
        let settings = Config::builder()
            .set_default("endpoint", DEFAULT_ENDPOINT)?
            .set_default("user_agent", "Mozilla/5.0")?
            .set_default("listing_timeout_secs", 30_i64)?
            .set_default("probe_timeout_secs", 10_i64)?
            .set_default("data_dir", "data")?
            .set_default("logs_dir", "logs")?
            .set_default("report_file", "webscraping_resultado.json")?
            .set_default("min_entry_bytes", 100_i64)?
            .set_default("sniff_rows", 10_i64)?
            .set_default("read_batch_size", 100_000_i64)?
            .add_source(File::from(file_stem).required(false))
            .add_source(Environment::with_prefix("CNPJ").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn layout(&self) -> Layout {
        Layout {
            data_dir: self.data_dir.clone(),
            logs_dir: self.logs_dir.clone(),
            report_file: self.report_file.clone(),
        }
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs.map(Duration::from_secs)
    }
}

/// Fixed on-disk locations of every artifact the stages hand to each other.
#[derive(Debug, Clone)]
pub struct Layout {
    data_dir: PathBuf,
    logs_dir: PathBuf,
    report_file: PathBuf,
}

impl Layout {
    pub fn new(data_dir: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>, report_file: impl Into<PathBuf>) -> Self {
        Layout {
            data_dir: data_dir.into(),
            logs_dir: logs_dir.into(),
            report_file: report_file.into(),
        }
    }

    pub fn bronze_dir(&self) -> PathBuf {
        self.data_dir.join("bronze")
    }

    pub fn silver_dir(&self) -> PathBuf {
        self.data_dir.join("silver")
    }

    pub fn gold_dir(&self) -> PathBuf {
        self.data_dir.join("gold")
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn report_file(&self) -> &Path {
        &self.report_file
    }

    pub fn archive(&self, category: Category) -> PathBuf {
        self.bronze_dir().join(format!("{}.zip", category))
    }

    pub fn silver_table(&self, category: Category) -> PathBuf {
        self.silver_dir().join(format!("{}_silver.parquet", category))
    }

    pub fn gold_table(&self) -> PathBuf {
        self.gold_dir().join("cnpj_gold.parquet")
    }

    /// Create every directory the stages write into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.bronze_dir(), self.silver_dir(), self.gold_dir(), self.logs_dir.clone()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
