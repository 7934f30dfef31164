//! Stage wrappers and the end-to-end run.
//!
//! Every wrapper enters its stage on the [`RunContext`] so log lines land in
//! the stage's file, then delegates to the stage module.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::acquisition;
use crate::category::Category;
use crate::discovery::{self, DiscoveryReport};
use crate::error::{PipelineError, Result};
use crate::gold;
use crate::http::Remote;
use crate::logging::{RunContext, Stage};
use crate::silver::{self, sniff::SniffRules, SilverOutput};
use crate::table::{Columnar, GoldTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Every stage ran but aggregation had too little data to produce rows.
    Degraded,
    Failed(Stage),
}

impl Outcome {
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::Degraded => f.write_str("completed with degraded output"),
            Outcome::Failed(stage) => write!(f, "failed at {}", stage.name()),
        }
    }
}

/// `err` followed by each of its sources, `: `-separated.
pub fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn sniff_rules(ctx: &RunContext) -> SniffRules {
    SniffRules {
        min_bytes: ctx.settings().min_entry_bytes,
        sample_rows: ctx.settings().sniff_rows,
    }
}

pub fn discover(ctx: &RunContext, remote: &dyn Remote) -> Result<DiscoveryReport> {
    let _stage = ctx.enter(Stage::Discovery)?;
    info!("Discovering smallest archives");
    discovery::discover(remote, &ctx.settings().endpoint, ctx.layout().report_file())
}

pub fn download(
    ctx: &RunContext,
    remote: &dyn Remote,
    selection: &BTreeMap<Category, String>,
) -> Result<BTreeMap<Category, PathBuf>> {
    let _stage = ctx.enter(Stage::Acquisition)?;
    info!("Bronze: downloading into {}", ctx.layout().bronze_dir().display());
    acquisition::download_all(remote, ctx.layout(), selection)
}

/// Download the selection recorded by the last discovery run.
pub fn download_from_report(ctx: &RunContext, remote: &dyn Remote) -> Result<BTreeMap<Category, PathBuf>> {
    let path = ctx.layout().report_file();
    let report = DiscoveryReport::load(path)?;
    let selection = report.selection();
    if selection.is_empty() {
        return Err(PipelineError::MissingSelection(path.to_path_buf()));
    }
    download(ctx, remote, &selection)
}

pub fn clean(ctx: &RunContext, archives: &BTreeMap<Category, PathBuf>) -> Result<SilverOutput> {
    let _stage = ctx.enter(Stage::Cleaning)?;
    info!("Silver: cleaning into {}", ctx.layout().silver_dir().display());
    silver::run(ctx.layout(), archives, &sniff_rules(ctx))
}

/// Clean whatever archives the bronze directory holds.
pub fn clean_existing(ctx: &RunContext) -> Result<SilverOutput> {
    let archives = silver::existing_archives(ctx.layout());
    clean(ctx, &archives)
}

pub fn aggregate(ctx: &RunContext) -> Result<GoldTable> {
    let _stage = ctx.enter(Stage::Aggregation)?;
    info!("Gold: aggregating into {}", ctx.layout().gold_dir().display());
    gold::run(ctx.layout(), ctx.settings().read_batch_size)
}

fn stage_failed(stage: Stage, err: &PipelineError) -> Outcome {
    error!("Stage {} failed: {}", stage.name(), error_chain(err));
    Outcome::Failed(stage)
}

/// Discovery → acquisition → cleaning → aggregation, each gated on the
/// previous stage's output. Files written by finished stages are left in
/// place when a later stage fails.
pub fn run(ctx: &RunContext, remote: &dyn Remote) -> Outcome {
    info!("===== PIPELINE START =====");

    let report = match discover(ctx, remote) {
        Ok(report) => report,
        Err(e) => return stage_failed(Stage::Discovery, &e),
    };

    let archives = match download(ctx, remote, &report.selection()) {
        Ok(archives) => archives,
        Err(e) => return stage_failed(Stage::Acquisition, &e),
    };

    match clean(ctx, &archives) {
        Ok(output) if output.has_data() => {}
        Ok(_) => {
            error!("Silver produced no rows; stopping");
            return Outcome::Failed(Stage::Cleaning);
        }
        Err(e) => return stage_failed(Stage::Cleaning, &e),
    }

    let outcome = match aggregate(ctx) {
        Ok(gold) if gold.is_empty() => {
            warn!("Gold produced no rows");
            Outcome::Degraded
        }
        Ok(_) => Outcome::Completed,
        Err(e) => return stage_failed(Stage::Aggregation, &e),
    };

    info!("===== PIPELINE {} =====", outcome.to_string().to_uppercase());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_includes_sources() {
        let err = PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert_eq!(error_chain(&err), "disk full");

        let cfg = PipelineError::Config(::config::ConfigError::Message("bad key".into()));
        assert_eq!(error_chain(&cfg), "configuration error: bad key: bad key");
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::Failed(Stage::Cleaning).to_string(), "failed at silver");
        assert!(Outcome::Failed(Stage::Discovery).is_failure());
        assert!(!Outcome::Degraded.is_failure());
    }
}
