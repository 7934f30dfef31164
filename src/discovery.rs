use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::category::Category;
use crate::error::{PipelineError, Result};
use crate::http::Remote;

/// Sequence number used when a filename carries none.
pub const NO_SEQUENCE: u32 = 9999;

/// A qualifying archive listed on the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredFile {
    pub name: String,
    pub url: String,
    pub category: Category,
    /// `None` when the probe failed or the server sent no length.
    pub size_bytes: Option<u64>,
    pub sequence: u32,
}

impl DiscoveredFile {
    /// Known sizes order before unknown ones.
    fn cmp_size(&self, other: &Self) -> Ordering {
        match (self.size_bytes, other.size_bytes) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    pub fn size_label(&self) -> String {
        match self.size_bytes {
            Some(bytes) => format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0),
            None => "unknown size".to_string(),
        }
    }
}

/// Audit record written after every discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub timestamp: DateTime<Local>,
    pub endpoint: String,
    pub total_candidates: usize,
    pub smallest: BTreeMap<Category, DiscoveredFile>,
    pub candidates: Vec<DiscoveredFile>,
}

impl DiscoveryReport {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Category → URL mapping handed to acquisition.
    pub fn selection(&self) -> BTreeMap<Category, String> {
        self.smallest
            .iter()
            .map(|(category, file)| (*category, file.url.clone()))
            .collect()
    }
}

/// Extract `(file name, absolute url)` for every `.zip` anchor on the page.
pub fn zip_links(html: &str, base: &Url) -> Vec<(String, String)> {
    static HREF_RE: OnceLock<Regex> = OnceLock::new();
    let re = HREF_RE.get_or_init(|| {
        Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).unwrap()
    });

    re.captures_iter(html)
        .filter_map(|caps| {
            let href = caps.get(1)?.as_str().trim();
            if !href.to_lowercase().ends_with(".zip") {
                return None;
            }
            let url = base.join(href).ok()?;
            let name = url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .unwrap_or(href)
                .to_string();
            Some((name, url.to_string()))
        })
        .collect()
}

/// Digits right before a trailing `.zip`, e.g. `Socios3.zip` → 3.
pub fn sequence_number(file_name: &str) -> u32 {
    static SEQ_RE: OnceLock<Regex> = OnceLock::new();
    let re = SEQ_RE.get_or_init(|| Regex::new(r"(?i)(\d+)\.zip$").unwrap());
    re.captures(file_name)
        .and_then(|caps| caps.get(1)?.as_str().parse().ok())
        .unwrap_or(NO_SEQUENCE)
}

/// Smallest file per category. Ties keep the first candidate seen, and an
/// unknown size never wins over a known one.
pub fn select_smallest(candidates: &[DiscoveredFile]) -> BTreeMap<Category, DiscoveredFile> {
    let mut smallest: BTreeMap<Category, DiscoveredFile> = BTreeMap::new();
    for file in candidates {
        match smallest.get(&file.category) {
            Some(current) if file.cmp_size(current) != Ordering::Less => {}
            _ => {
                smallest.insert(file.category, file.clone());
            }
        }
    }
    smallest
}

/// Classify and size every qualifying link on the listing page.
pub fn collect_candidates(remote: &dyn Remote, html: &str, base: &Url) -> Vec<DiscoveredFile> {
    let mut found = Vec::new();
    for (name, url) in zip_links(html, base) {
        let Some(category) = Category::classify(&name) else {
            continue;
        };
        let size_bytes = match remote.probe_size(&url) {
            Ok(size) => size,
            Err(e) => {
                warn!("Could not probe size of {}: {}", url, e);
                None
            }
        };
        let file = DiscoveredFile {
            sequence: sequence_number(&name),
            name,
            url,
            category,
            size_bytes,
        };
        info!("  {}: {} - {}", category, file.name, file.size_label());
        found.push(file);
    }
    info!("Relevant files found: {}", found.len());
    found
}

/// Fetch the listing, pick the smallest archive per category and write the
/// audit report to `report_path`.
pub fn discover(remote: &dyn Remote, endpoint: &str, report_path: &Path) -> Result<DiscoveryReport> {
    let base = Url::parse(endpoint).map_err(|e| PipelineError::InvalidUrl {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    info!("Fetching listing: {}", endpoint);
    let html = remote.fetch_text(endpoint).map_err(|e| {
        error!("Listing request failed: {}", e);
        e
    })?;
    info!("Listing fetched ({} bytes)", html.len());

    let candidates = collect_candidates(remote, &html, &base);
    if candidates.is_empty() {
        error!("No empresas/socios archives on the listing page");
        return Err(PipelineError::NoCandidates {
            endpoint: endpoint.to_string(),
        });
    }

    let smallest = select_smallest(&candidates);
    for category in Category::ALL {
        match smallest.get(&category) {
            Some(file) => info!("Smallest {}: {} - {}", category, file.name, file.size_label()),
            None => warn!("No {} archive listed; later stages will degrade", category),
        }
    }

    let report = DiscoveryReport {
        timestamp: Local::now(),
        endpoint: endpoint.to_string(),
        total_candidates: candidates.len(),
        smallest,
        candidates,
    };
    report.save(report_path)?;
    info!("Discovery report saved to {}", report_path.display());
    Ok(report)
}
