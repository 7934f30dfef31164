//! Run context and log routing.
//!
//! A [`RunContext`] is built once per process and handed to every stage. It
//! owns the [`Layout`] and a [`LogSink`] that the file layer of the tracing
//! subscriber writes into. Entering a stage switches the sink to that stage's
//! log file; every line also lands in `pipeline.log`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Layout, Settings};
use crate::error::Result;

pub const PIPELINE_LOG: &str = "pipeline.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Acquisition,
    Cleaning,
    Aggregation,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Discovery,
        Stage::Acquisition,
        Stage::Cleaning,
        Stage::Aggregation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Acquisition => "bronze",
            Stage::Cleaning => "silver",
            Stage::Aggregation => "gold",
        }
    }

    pub fn log_file(self) -> &'static str {
        match self {
            Stage::Discovery => "webscraping.log",
            Stage::Acquisition => "bronze.log",
            Stage::Cleaning => "silver.log",
            Stage::Aggregation => "gold.log",
        }
    }
}

#[derive(Default)]
struct SinkFiles {
    pipeline: Option<File>,
    stage: Option<File>,
}

/// Shared writer target for the file layer.
#[derive(Clone, Default)]
pub struct LogSink {
    files: Arc<Mutex<SinkFiles>>,
}

impl LogSink {
    fn lock(&self) -> MutexGuard<'_, SinkFiles> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open_pipeline(&self, logs_dir: &Path) -> Result<()> {
        self.lock().pipeline = Some(open_append(&logs_dir.join(PIPELINE_LOG))?);
        Ok(())
    }

    fn set_stage(&self, file: Option<File>) {
        self.lock().stage = file;
    }
}

pub struct SinkWriter {
    files: Arc<Mutex<SinkFiles>>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(f) = files.pipeline.as_mut() {
            f.write_all(buf)?;
        }
        if let Some(f) = files.stage.as_mut() {
            f.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(f) = files.pipeline.as_mut() {
            f.flush()?;
        }
        if let Some(f) = files.stage.as_mut() {
            f.flush()?;
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            files: Arc::clone(&self.files),
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Everything a stage needs besides its inputs.
pub struct RunContext {
    settings: Settings,
    layout: Layout,
    sink: LogSink,
}

impl RunContext {
    /// Create the directory layout and open `pipeline.log`. Does not install a
    /// subscriber; see [`RunContext::install_subscriber`].
    pub fn new(settings: Settings) -> Result<Self> {
        let layout = settings.layout();
        layout.ensure_dirs()?;
        let sink = LogSink::default();
        sink.open_pipeline(layout.logs_dir())?;
        Ok(RunContext {
            settings,
            layout,
            sink,
        })
    }

    /// Install the global subscriber: coloured stdout plus the plain file sink,
    /// both filtered by `RUST_LOG` (default `info`). A second call is a no-op.
    pub fn install_subscriber(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(self.sink.clone()),
            )
            .try_init();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Route log lines into `stage`'s file until the guard is dropped.
    pub fn enter(&self, stage: Stage) -> Result<StageGuard> {
        let file = open_append(&self.layout.logs_dir().join(stage.log_file()))?;
        self.sink.set_stage(Some(file));
        Ok(StageGuard {
            sink: self.sink.clone(),
        })
    }
}

pub struct StageGuard {
    sink: LogSink,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        self.sink.set_stage(None);
    }
}
