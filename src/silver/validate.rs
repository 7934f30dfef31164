//! Sampled sanity checks on cleaned tables. Results are reported, never
//! enforced.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

/// Relation-type codes the registry documents for partners.
pub const KNOWN_PARTNER_TYPES: [i64; 3] = [1, 2, 3];

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: &'static str,
    pub valid: usize,
    pub total: usize,
    /// Pass when the valid percentage is strictly above this.
    pub threshold_pct: f64,
}

impl CheckResult {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.valid as f64 / self.total as f64 * 100.0
        }
    }

    pub fn passed(&self) -> bool {
        self.percent() > self.threshold_pct
    }

    pub fn log(&self) {
        if self.passed() {
            info!(
                "Validation {}: {}/{} ({:.1}%) valid",
                self.name,
                self.valid,
                self.total,
                self.percent()
            );
        } else {
            warn!(
                "Validation {}: {}/{} ({:.1}%) valid, below {:.0}%",
                self.name,
                self.valid,
                self.total,
                self.percent(),
                self.threshold_pct
            );
        }
    }
}

/// Keys holding an 8-digit CNPJ root anywhere in the raw string.
pub fn check_keys(keys: &[String]) -> CheckResult {
    static ROOT_RE: OnceLock<Regex> = OnceLock::new();
    let re = ROOT_RE.get_or_init(|| Regex::new(r"\d{8}").unwrap());
    CheckResult {
        name: "cnpj",
        valid: keys.iter().filter(|k| re.is_match(k)).count(),
        total: keys.len(),
        threshold_pct: 80.0,
    }
}

pub fn check_partner_types(types: &[Option<i64>]) -> CheckResult {
    CheckResult {
        name: "tipo_socio",
        valid: types
            .iter()
            .filter(|t| matches!(t, Some(code) if KNOWN_PARTNER_TYPES.contains(code)))
            .count(),
        total: types.len(),
        threshold_pct: 50.0,
    }
}
