//! Read-only summaries for the `status` and `check` commands.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::category::Category;
use crate::config::{Layout, Settings};
use crate::error::Result;
use crate::http::Remote;
use crate::logging::{Stage, PIPELINE_LOG};
use crate::table::{describe, Columnar, GoldTable};

#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoldMetrics {
    pub total: usize,
    pub with_foreign_partner: usize,
    pub target: usize,
    pub mean_partners: f64,
}

impl GoldMetrics {
    pub fn from_table(gold: &GoldTable) -> Self {
        let total = gold.len();
        let partners: i64 = gold.partner_count.iter().sum();
        GoldMetrics {
            total,
            with_foreign_partner: gold.foreign_partner.iter().filter(|f| **f).count(),
            target: gold.target.iter().filter(|t| **t).count(),
            mean_partners: if total == 0 { 0.0 } else { partners as f64 / total as f64 },
        }
    }
}

#[derive(Debug)]
pub struct StatusReport {
    pub tables: Vec<TableSummary>,
    pub gold: Option<GoldMetrics>,
    pub logs: Vec<(PathBuf, Vec<String>)>,
}

/// Last `n` lines of a text file, oldest first.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut lines = VecDeque::with_capacity(n + 1);
    for line in reader.lines() {
        lines.push_back(line?);
        if lines.len() > n {
            lines.pop_front();
        }
    }
    Ok(lines.into())
}

fn log_files(layout: &Layout) -> Vec<PathBuf> {
    std::iter::once(PIPELINE_LOG)
        .chain(Stage::ALL.iter().map(|s| s.log_file()))
        .map(|name| layout.logs_dir().join(name))
        .collect()
}

/// Gather whatever the previous runs left on disk. Missing files are skipped.
pub fn status(layout: &Layout, batch_size: usize, lines: usize) -> Result<StatusReport> {
    let mut tables = Vec::new();
    let paths = Category::ALL
        .iter()
        .map(|c| layout.silver_table(*c))
        .chain(std::iter::once(layout.gold_table()));
    for path in paths.filter(|p| p.exists()) {
        let (rows, columns) = describe(&path)?;
        tables.push(TableSummary { path, rows, columns });
    }

    let gold_path = layout.gold_table();
    let gold = if gold_path.exists() {
        Some(GoldMetrics::from_table(&GoldTable::read_parquet(&gold_path, batch_size)?))
    } else {
        None
    };

    let mut logs = Vec::new();
    for path in log_files(layout).into_iter().filter(|p| p.exists()) {
        let tail = tail_lines(&path, lines)?;
        logs.push((path, tail));
    }

    Ok(StatusReport { tables, gold, logs })
}

impl StatusReport {
    pub fn print(&self) {
        if self.tables.is_empty() {
            println!("No tables yet. Run 'run' first.");
        }
        for t in &self.tables {
            println!("{}: {} rows", t.path.display(), t.rows);
            println!("  columns: {}", t.columns.join(", "));
        }

        if let Some(g) = &self.gold {
            println!();
            println!("Companies:               {}", g.total);
            println!("With foreign partner:    {}", g.with_foreign_partner);
            println!("Target documents:        {}", g.target);
            println!("Mean partners/company:   {:.2}", g.mean_partners);
        }

        for (path, lines) in &self.logs {
            println!("\n--- {} (last {}) ---", path.display(), lines.len());
            for line in lines {
                println!("{}", line);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckLine {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

fn check_writable(dir: &Path) -> std::result::Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let probe = dir.join(".write_check");
    fs::write(&probe, b"ok").map_err(|e| e.to_string())?;
    fs::remove_file(&probe).map_err(|e| e.to_string())
}

/// Directories writable and the listing endpoint reachable. One line per check.
pub fn check(settings: &Settings, remote: &dyn Remote) -> Vec<CheckLine> {
    let layout = settings.layout();
    let dirs = [
        ("bronze dir", layout.bronze_dir()),
        ("silver dir", layout.silver_dir()),
        ("gold dir", layout.gold_dir()),
        ("logs dir", layout.logs_dir().to_path_buf()),
    ];

    let mut lines: Vec<CheckLine> = dirs
        .into_iter()
        .map(|(name, dir)| {
            let result = check_writable(&dir);
            CheckLine {
                name: name.to_string(),
                ok: result.is_ok(),
                detail: result.err().unwrap_or_else(|| dir.display().to_string()),
            }
        })
        .collect();

    let endpoint = remote.fetch_text(&settings.endpoint);
    lines.push(CheckLine {
        name: "endpoint".to_string(),
        ok: endpoint.is_ok(),
        detail: match endpoint {
            Ok(body) => format!("{} ({} bytes)", settings.endpoint, body.len()),
            Err(e) => e.to_string(),
        },
    });
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRemote;
    use crate::table::CompanyTable;

    fn settings(root: &Path) -> Settings {
        let mut settings = Settings::load_from(&root.join("absent")).unwrap();
        settings.data_dir = root.join("data");
        settings.logs_dir = root.join("logs");
        settings.report_file = root.join("report.json");
        settings
    }

    #[test]
    fn tail_keeps_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.log");
        fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();
        assert_eq!(tail_lines(&path, 2).unwrap(), vec!["three", "four"]);
        assert_eq!(tail_lines(&path, 10).unwrap().len(), 4);
        assert!(tail_lines(&path, 0).unwrap().is_empty());

        let long: String = (0..5000).map(|i| format!("line {}\n", i)).collect();
        fs::write(&path, long).unwrap();
        assert_eq!(tail_lines(&path, 3).unwrap(), vec!["line 4997", "line 4998", "line 4999"]);
    }

    #[test]
    fn gold_metrics() {
        let gold = GoldTable {
            key: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            partner_count: vec![2, 1, 0, 3],
            foreign_partner: vec![true, false, false, true],
            target: vec![true, false, false, false],
        };
        let m = GoldMetrics::from_table(&gold);
        assert_eq!((m.total, m.with_foreign_partner, m.target), (4, 2, 1));
        assert_eq!(m.mean_partners, 1.5);
        assert_eq!(GoldMetrics::from_table(&GoldTable::default()).mean_partners, 0.0);
    }

    #[test]
    fn status_lists_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = settings(dir.path()).layout();
        layout.ensure_dirs().unwrap();

        let empty = status(&layout, 100, 5).unwrap();
        assert!(empty.tables.is_empty());
        assert!(empty.gold.is_none());

        let companies = CompanyTable {
            key: vec!["11222333".into()],
            legal_name: vec![None],
            legal_nature: vec![None],
            responsible_qualification: vec![None],
            share_capital: vec![None],
            size_code: vec![Some("03".into())],
        };
        companies.write_parquet(&layout.silver_table(Category::Companies)).unwrap();
        fs::write(layout.logs_dir().join(Stage::Cleaning.log_file()), "a\nb\nc\n").unwrap();

        let report = status(&layout, 100, 2).unwrap();
        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].rows, 1);
        assert_eq!(report.tables[0].columns[0], "cnpj");
        assert!(report.gold.is_none());
        assert_eq!(report.logs.len(), 1);
        assert_eq!(report.logs[0].1, vec!["b", "c"]);
    }

    #[test]
    fn check_reports_each_item() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let down = check(&settings, &FakeRemote::new());
        assert_eq!(down.len(), 5);
        assert!(down[..4].iter().all(|l| l.ok));
        assert!(!down[4].ok);
        assert!(layout_created(&settings));

        let remote = FakeRemote::new().with_page(&settings.endpoint, "<html></html>");
        assert!(check(&settings, &remote).iter().all(|l| l.ok));
    }

    fn layout_created(settings: &Settings) -> bool {
        settings.layout().silver_dir().is_dir()
    }
}
