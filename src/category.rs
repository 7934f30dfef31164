use std::fmt;

use serde::{Deserialize, Serialize};

/// The two registry file families the pipeline consumes.
///
/// `Companies` is the primary entity table (one row per CNPJ root), `Partners`
/// the secondary table of associates per company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "empresas")]
    Companies,
    #[serde(rename = "socios")]
    Partners,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Companies, Category::Partners];

    /// Keyword used in portal filenames and in local file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Companies => "empresas",
            Category::Partners => "socios",
        }
    }

    /// Minimum field count an archive entry needs to be taken for this category.
    pub fn min_columns(self) -> usize {
        match self {
            Category::Companies => 6,
            Category::Partners => 5,
        }
    }

    /// Classify a remote filename by keyword, case-insensitive.
    /// Anything that is neither family returns `None`.
    pub fn classify(file_name: &str) -> Option<Category> {
        let lower = file_name.to_lowercase();
        if lower.contains(Category::Companies.as_str()) {
            Some(Category::Companies)
        } else if lower.contains(Category::Partners.as_str()) {
            Some(Category::Partners)
        } else {
            None
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
