//! Picking the data entry out of a registry archive.
//!
//! Archives ship the CSV payload next to small readme/layout files, under
//! names that change between releases, so entries are judged by content: the
//! first sizeable entry whose leading records parse as `;`-delimited text with
//! enough columns wins.

use csv::ReaderBuilder;

use crate::category::Category;

/// Bytes read from each entry for the trial parse.
pub const PREFIX_BYTES: usize = 64 * 1024;

/// Dialect of the registry files: `;`-separated, `"`-quoted, no header row.
pub fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder
        .delimiter(b';')
        .quote(b'"')
        .has_headers(false)
        .flexible(true);
    builder
}

#[derive(Debug, Clone, Copy)]
pub struct SniffRules {
    pub min_bytes: u64,
    pub sample_rows: usize,
}

impl Default for SniffRules {
    fn default() -> Self {
        SniffRules {
            min_bytes: 100,
            sample_rows: 10,
        }
    }
}

/// What the archive says about one entry, plus the first bytes of its body.
#[derive(Debug, Clone)]
pub struct EntryPreview {
    pub index: usize,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub prefix: Vec<u8>,
}

/// The entry chosen for a full parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHandle {
    pub index: usize,
    pub name: String,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Directory,
    TooSmall(u64),
    Unparseable(String),
    NoRecords,
    TooFewColumns(usize),
    Accepted(usize),
}

/// Field count of the first record in `prefix`, after parsing up to
/// `sample_rows` records.
pub fn trial_columns(prefix: &[u8], sample_rows: usize) -> Result<Option<usize>, csv::Error> {
    let mut reader = reader_builder().from_reader(prefix);
    let mut first = None;
    for record in reader.byte_records().take(sample_rows.max(1)) {
        let record = record?;
        first.get_or_insert(record.len());
    }
    Ok(first)
}

pub fn assess(preview: &EntryPreview, category: Category, rules: &SniffRules) -> Verdict {
    if preview.is_dir {
        return Verdict::Directory;
    }
    if preview.size < rules.min_bytes {
        return Verdict::TooSmall(preview.size);
    }
    match trial_columns(&preview.prefix, rules.sample_rows) {
        Err(e) => Verdict::Unparseable(e.to_string()),
        Ok(None) => Verdict::NoRecords,
        Ok(Some(n)) if n < category.min_columns() => Verdict::TooFewColumns(n),
        Ok(Some(n)) => Verdict::Accepted(n),
    }
}

/// First entry that looks like `category`'s data file, if any.
pub fn sniff(previews: &[EntryPreview], category: Category, rules: &SniffRules) -> Option<EntryHandle> {
    previews.iter().find_map(|preview| match assess(preview, category, rules) {
        Verdict::Accepted(columns) => Some(EntryHandle {
            index: preview.index,
            name: preview.name.clone(),
            columns,
        }),
        _ => None,
    })
}

/// Verdicts for the non-directory entries passed over before the accepted
/// one, or for all of them when nothing qualifies.
pub fn rejected<'a>(
    previews: &'a [EntryPreview],
    category: Category,
    rules: &SniffRules,
) -> Vec<(&'a EntryPreview, Verdict)> {
    let mut out = Vec::new();
    for preview in previews {
        match assess(preview, category, rules) {
            Verdict::Accepted(_) => break,
            Verdict::Directory => {}
            verdict => out.push((preview, verdict)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview(index: usize, name: &str, body: &str) -> EntryPreview {
        EntryPreview {
            index,
            name: name.to_string(),
            is_dir: name.ends_with('/'),
            size: body.len() as u64,
            prefix: body.as_bytes().to_vec(),
        }
    }

    const COMPANY_ROWS: &str = "\"11222333\";\"ACME LTDA\";\"2062\";\"49\";\"1000,00\";\"03\";\"\"\n\
                                \"44555666\";\"BETA SA\";\"2046\";\"10\";\"50000,00\";\"05\";\"\"\n\
                                \"77888999\";\"GAMA ME\";\"2135\";\"50\";\"0,00\";\"01\";\"\"\n";

    #[test]
    fn skips_dirs_and_tiny_entries() {
        let rules = SniffRules::default();
        let previews = vec![
            preview(0, "K3241/", ""),
            preview(1, "LEIAME.txt", "layout v2"),
            preview(2, "K3241.EMPRECSV", COMPANY_ROWS),
        ];
        assert_eq!(assess(&previews[0], Category::Companies, &rules), Verdict::Directory);
        assert_eq!(assess(&previews[1], Category::Companies, &rules), Verdict::TooSmall(9));
        assert_eq!(
            sniff(&previews, Category::Companies, &rules),
            Some(EntryHandle {
                index: 2,
                name: "K3241.EMPRECSV".to_string(),
                columns: 7
            })
        );
    }

    #[test]
    fn too_few_columns_is_rejected() {
        let rules = SniffRules::default();
        let body = "\"11222333\";\"2\";\"MARIA\";\"***123456**\"\n".repeat(10);
        let previews = vec![preview(0, "SOCIOCSV", &body)];
        assert_eq!(
            assess(&previews[0], Category::Partners, &rules),
            Verdict::TooFewColumns(4)
        );
        assert_eq!(sniff(&previews, Category::Partners, &rules), None);
    }

    #[test]
    fn first_qualifying_entry_wins() {
        let rules = SniffRules::default();
        let narrow = "a;b;c\n".repeat(40);
        let previews = vec![
            preview(0, "notes.csv", &narrow),
            preview(1, "first.csv", COMPANY_ROWS),
            preview(2, "second.csv", COMPANY_ROWS),
        ];
        let handle = sniff(&previews, Category::Partners, &rules).unwrap();
        assert_eq!(handle.name, "first.csv");
    }

    #[test]
    fn column_count_comes_from_first_record() {
        let body = "a;b;c;d;e;f\nshort;row\n";
        assert_eq!(trial_columns(body.as_bytes(), 10).unwrap(), Some(6));
        assert_eq!(trial_columns(b"", 10).unwrap(), None);
    }

    #[test]
    fn custom_threshold_applies() {
        let rules = SniffRules {
            min_bytes: 10_000,
            sample_rows: 10,
        };
        let previews = vec![preview(0, "K.EMPRECSV", COMPANY_ROWS)];
        assert_eq!(sniff(&previews, Category::Companies, &rules), None);
    }

    #[test]
    fn rejections_stop_at_accepted_entry() {
        let rules = SniffRules::default();
        let narrow = "a;b;c\n".repeat(40);
        let previews = vec![
            preview(0, "K3241/", ""),
            preview(1, "LEIAME.txt", "layout v2"),
            preview(2, "notes.csv", &narrow),
            preview(3, "K3241.EMPRECSV", COMPANY_ROWS),
            preview(4, "extra.csv", &narrow),
        ];
        let verdicts: Vec<_> = rejected(&previews, Category::Companies, &rules)
            .into_iter()
            .map(|(p, v)| (p.name.as_str(), v))
            .collect();
        assert_eq!(
            verdicts,
            vec![
                ("LEIAME.txt", Verdict::TooSmall(9)),
                ("notes.csv", Verdict::TooFewColumns(3)),
            ]
        );
        assert_eq!(rejected(&previews[4..], Category::Companies, &rules).len(), 1);
    }
}
