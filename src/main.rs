use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use cnpj_pipeline::pipeline;
use cnpj_pipeline::report;
use cnpj_pipeline::table::Columnar;
use cnpj_pipeline::{HttpRemote, RunContext, Settings};

#[derive(Parser)]
#[command(name = "cnpj_pipeline", about = "CNPJ open-data pipeline: bronze → silver → gold")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, download, clean and aggregate in one go
    Run,
    /// Find the smallest empresas/socios archives and write the report
    Discover,
    /// Download the archives selected by the last discovery
    Download,
    /// Clean the downloaded archives into silver tables
    Silver,
    /// Build the gold table from the silver tables
    Gold,
    /// Show tables, gold metrics and recent log lines
    Status {
        /// Log lines to show per file
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,
    },
    /// Check directories and endpoint reachability
    Check,
}

fn main() -> ExitCode {
    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = execute(cli.command);

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when the command ran but did not succeed.
fn execute(command: Commands) -> anyhow::Result<bool> {
    let settings = Settings::load().context("loading pipeline settings")?;

    match command {
        Commands::Status { lines } => {
            let layout = settings.layout();
            let status = report::status(&layout, settings.read_batch_size, lines)
                .context("reading pipeline outputs")?;
            status.print();
            return Ok(true);
        }
        Commands::Check => {
            let remote = HttpRemote::new(&settings)?;
            let lines = report::check(&settings, &remote);
            for line in &lines {
                let mark = if line.ok { "ok" } else { "FAIL" };
                println!("[{:>4}] {:<12} {}", mark, line.name, line.detail);
            }
            return Ok(lines.iter().all(|l| l.ok));
        }
        _ => {}
    }

    let ctx = RunContext::new(settings).context("preparing data and log directories")?;
    ctx.install_subscriber();
    let remote = HttpRemote::new(ctx.settings()).context("building HTTP client")?;

    match command {
        Commands::Run => {
            let outcome = pipeline::run(&ctx, &remote);
            println!("Pipeline {}", outcome);
            Ok(!outcome.is_failure())
        }
        Commands::Discover => {
            let report = pipeline::discover(&ctx, &remote).context("discovery failed")?;
            println!("Found {} candidates", report.total_candidates);
            for file in report.smallest.values() {
                println!("  {:<9} {} ({})", file.category, file.name, file.size_label());
            }
            Ok(true)
        }
        Commands::Download => {
            let archives = pipeline::download_from_report(&ctx, &remote).context("download failed")?;
            for (category, path) in &archives {
                println!("  {:<9} {}", category, path.display());
            }
            Ok(true)
        }
        Commands::Silver => {
            let output = pipeline::clean_existing(&ctx).context("cleaning failed")?;
            println!(
                "Silver: {} companies, {} partners",
                output.companies.len(),
                output.partners.len()
            );
            Ok(output.has_data())
        }
        Commands::Gold => {
            let gold = pipeline::aggregate(&ctx).context("aggregation failed")?;
            println!("Gold: {} companies", gold.len());
            Ok(!gold.is_empty())
        }
        Commands::Status { .. } | Commands::Check => Ok(true),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
