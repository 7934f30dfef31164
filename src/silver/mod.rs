//! Cleaning stage: raw archive → typed columnar table.

pub mod coerce;
pub mod sniff;
pub mod validate;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use csv::ByteRecord;
use tracing::{error, info, warn};
use zip::ZipArchive;

use crate::category::Category;
use crate::config::Layout;
use crate::error::{PipelineError, Result};
use crate::table::{Columnar, CompanyTable, PartnerTable};

use self::sniff::{reader_builder, rejected, sniff, EntryHandle, EntryPreview, SniffRules, Verdict, PREFIX_BYTES};
use self::validate::{check_keys, check_partner_types, CheckResult};

/// A table the cleaning stage can fill from raw registry records.
pub trait Cleaned: Columnar {
    const CATEGORY: Category;

    fn append_record(&mut self, record: &ByteRecord);
    fn checks(&self) -> Vec<CheckResult>;
}

impl Cleaned for CompanyTable {
    const CATEGORY: Category = Category::Companies;

    fn append_record(&mut self, record: &ByteRecord) {
        coerce::append_company(self, record);
    }

    fn checks(&self) -> Vec<CheckResult> {
        vec![check_keys(&self.key)]
    }
}

impl Cleaned for PartnerTable {
    const CATEGORY: Category = Category::Partners;

    fn append_record(&mut self, record: &ByteRecord) {
        coerce::append_partner(self, record);
    }

    fn checks(&self) -> Vec<CheckResult> {
        vec![check_keys(&self.key), check_partner_types(&self.partner_type)]
    }
}

#[derive(Debug, Default)]
pub struct SilverOutput {
    pub companies: CompanyTable,
    pub partners: PartnerTable,
}

impl SilverOutput {
    /// At least one category produced rows.
    pub fn has_data(&self) -> bool {
        !self.companies.is_empty() || !self.partners.is_empty()
    }
}

fn archive_error(category: Category, path: &Path, source: zip::result::ZipError) -> PipelineError {
    PipelineError::Archive {
        category,
        path: path.to_path_buf(),
        source,
    }
}

/// Metadata and a body prefix for every entry. Prefixes are only read for
/// entries large enough to be considered.
pub fn read_previews<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    rules: &SniffRules,
) -> zip::result::ZipResult<Vec<EntryPreview>> {
    let mut previews = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let is_dir = entry.is_dir();
        let size = entry.size();
        let mut prefix = Vec::new();
        if !is_dir && size >= rules.min_bytes {
            (&mut entry).take(PREFIX_BYTES as u64).read_to_end(&mut prefix)?;
        }
        previews.push(EntryPreview {
            index,
            name: entry.name().to_string(),
            is_dir,
            size,
            prefix,
        });
    }
    Ok(previews)
}

fn parse_entry<T: Cleaned, R: Read + Seek>(archive: &mut ZipArchive<R>, handle: &EntryHandle) -> Result<T> {
    let entry = archive
        .by_index(handle.index)
        .map_err(|e| PipelineError::Io(e.into()))?;
    let mut reader = reader_builder().from_reader(entry);
    let mut table = T::default();
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        table.append_record(&record);
    }
    Ok(table)
}

fn locate<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    category: Category,
    rules: &SniffRules,
) -> zip::result::ZipResult<Option<EntryHandle>> {
    let previews = read_previews(archive, rules)?;
    for (preview, verdict) in rejected(&previews, category, rules) {
        match verdict {
            Verdict::TooSmall(size) => info!("Skipping {} ({} bytes)", preview.name, size),
            Verdict::Unparseable(e) => {
                warn!("{} is not valid delimited text for {}: {}", preview.name, category, e)
            }
            Verdict::NoRecords => warn!("{} has no records", preview.name),
            Verdict::TooFewColumns(n) => warn!(
                "{} has {} columns, {} needs at least {}",
                preview.name,
                n,
                category,
                category.min_columns()
            ),
            Verdict::Directory | Verdict::Accepted(_) => {}
        }
    }
    Ok(sniff(&previews, category, rules))
}

/// Clean one archive into `T` and persist it to `dest`.
///
/// An unreadable archive or one with no qualifying entry yields an empty
/// table; only a failed write is an error.
pub fn clean_archive<T: Cleaned>(archive_path: &Path, dest: &Path, rules: &SniffRules) -> Result<T> {
    let category = T::CATEGORY;
    let mut archive = match File::open(archive_path)
        .map_err(zip::result::ZipError::Io)
        .and_then(ZipArchive::new)
    {
        Ok(archive) => archive,
        Err(e) => {
            error!("{}", archive_error(category, archive_path, e));
            return Ok(T::default());
        }
    };

    let handle = match locate(&mut archive, category, rules) {
        Ok(Some(handle)) => handle,
        Ok(None) => {
            warn!("No {} entry processed in {}", category, archive_path.display());
            return Ok(T::default());
        }
        Err(e) => {
            error!("{}", archive_error(category, archive_path, e));
            return Ok(T::default());
        }
    };

    info!(
        "Processing {} entry {} ({} columns)",
        category, handle.name, handle.columns
    );
    let table: T = match parse_entry(&mut archive, &handle) {
        Ok(table) => table,
        Err(e) => {
            error!("Failed to parse {} in {}: {}", handle.name, archive_path.display(), e);
            return Ok(T::default());
        }
    };

    let checks = table.checks();
    for check in &checks {
        check.log();
    }
    if checks.iter().all(CheckResult::passed) {
        info!("Validation passed for {}", category);
    } else {
        warn!("Validation issues for {}; persisting anyway", category);
    }

    table.write_parquet(dest)?;
    info!("{} saved to {} with {} rows", category, dest.display(), table.len());
    Ok(table)
}

/// Clean every downloaded archive. A category without an archive comes back
/// empty.
pub fn run(layout: &Layout, archives: &BTreeMap<Category, PathBuf>, rules: &SniffRules) -> Result<SilverOutput> {
    let mut output = SilverOutput::default();
    for category in Category::ALL {
        let dest = layout.silver_table(category);
        let rows = match (category, archives.get(&category)) {
            (_, None) => {
                warn!("No {} archive to clean", category);
                0
            }
            (Category::Companies, Some(path)) => {
                output.companies = clean_archive(path, &dest, rules)?;
                output.companies.len()
            }
            (Category::Partners, Some(path)) => {
                output.partners = clean_archive(path, &dest, rules)?;
                output.partners.len()
            }
        };
        // An empty result must not leave the previous run's table behind.
        if rows == 0 && dest.exists() {
            fs::remove_file(&dest)?;
            info!("Removed stale {}", dest.display());
        }
    }
    Ok(output)
}

/// Archives already present in the bronze directory.
pub fn existing_archives(layout: &Layout) -> BTreeMap<Category, PathBuf> {
    Category::ALL
        .into_iter()
        .map(|category| (category, layout.archive(category)))
        .filter(|(_, path)| path.exists())
        .collect()
}
