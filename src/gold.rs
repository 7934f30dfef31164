use std::collections::{HashMap, HashSet};
use std::fs;

use itertools::Itertools;
use tracing::{info, warn};

use crate::category::Category;
use crate::config::Layout;
use crate::error::Result;
use crate::table::{Columnar, CompanyTable, GoldTable, PartnerTable};

/// Masked document id the registry uses for partners domiciled abroad.
pub const FOREIGN_DOCUMENT: &str = "***999999**";

/// `cod_porte` value the target flag looks for.
pub const TARGET_SIZE_CODE: &str = "03";

#[derive(Debug, Default)]
struct PartnerStats<'a> {
    documents: HashSet<&'a str>,
    foreign: bool,
}

fn partner_stats(partners: &PartnerTable) -> HashMap<&str, PartnerStats<'_>> {
    let mut stats: HashMap<&str, PartnerStats<'_>> = HashMap::new();
    for (key, document) in partners.key.iter().zip(&partners.partner_document) {
        let entry = stats.entry(key.as_str()).or_default();
        if let Some(document) = document.as_deref() {
            entry.documents.insert(document);
            entry.foreign |= document == FOREIGN_DOCUMENT;
        }
    }
    stats
}

/// Join per-company partner aggregates onto the company table.
///
/// Keys keep their first occurrence and the company table's order. A company
/// with no partner rows gets a count of 0 and a false flag.
pub fn aggregate(companies: &CompanyTable, partners: &PartnerTable) -> GoldTable {
    let stats = partner_stats(partners);
    let mut gold = GoldTable::default();

    for (key, size_code) in companies
        .key
        .iter()
        .zip(&companies.size_code)
        .unique_by(|(key, _)| *key)
    {
        let (count, foreign) = stats
            .get(key.as_str())
            .map(|s| (s.documents.len() as i64, s.foreign))
            .unwrap_or((0, false));
        let target = size_code.as_deref() == Some(TARGET_SIZE_CODE) && count > 1;

        gold.key.push(key.clone());
        gold.partner_count.push(count);
        gold.foreign_partner.push(foreign);
        gold.target.push(target);
    }
    gold
}

fn soft_failure(layout: &Layout, reason: &str) -> Result<GoldTable> {
    warn!("{}", reason);
    let stale = layout.gold_table();
    if stale.exists() {
        fs::remove_file(&stale)?;
        info!("Removed stale {}", stale.display());
    }
    Ok(GoldTable::default())
}

/// Load both cleaned tables, build the gold table and persist it.
///
/// Missing or empty inputs are a soft failure: a warning and an empty table,
/// with any previous gold file removed.
pub fn run(layout: &Layout, batch_size: usize) -> Result<GoldTable> {
    let companies_path = layout.silver_table(Category::Companies);
    let partners_path = layout.silver_table(Category::Partners);
    if !companies_path.exists() || !partners_path.exists() {
        return soft_failure(layout, "Silver parquet files not found");
    }

    info!("Loading {}", companies_path.display());
    let companies = CompanyTable::read_parquet(&companies_path, batch_size)?;
    info!("Loading {}", partners_path.display());
    let partners = PartnerTable::read_parquet(&partners_path, batch_size)?;
    info!("Companies loaded: {} rows", companies.len());
    info!("Partners loaded: {} rows", partners.len());

    if companies.is_empty() || partners.is_empty() {
        return soft_failure(layout, "Not enough data to build the gold table");
    }

    let gold = aggregate(&companies, &partners);
    let dest = layout.gold_table();
    gold.write_parquet(&dest)?;
    info!("Gold saved: {} ({} rows)", dest.display(), gold.len());
    Ok(gold)
}
