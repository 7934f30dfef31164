use csv::ByteRecord;

use crate::table::{CompanyTable, PartnerTable};

/// Registry files are ISO-8859-1: every byte is its own code point.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// 2^63 as f64; integral values at or past it do not fit an `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Integer code; anything non-numeric or out of `i64` range becomes `None`.
pub fn parse_code(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok().or_else(|| {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(v))
            .map(|v| v as i64)
    })
}

/// Decimal-comma amount (`"1234,56"`); anything non-numeric becomes `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn field(record: &ByteRecord, i: usize) -> Option<String> {
    record.get(i).filter(|f| !f.is_empty()).map(latin1)
}

fn key(record: &ByteRecord) -> String {
    record.get(0).map(latin1).unwrap_or_default().trim().to_string()
}

/// Apply the positional `empresas` layout to one raw record.
pub fn append_company(table: &mut CompanyTable, record: &ByteRecord) {
    table.key.push(key(record));
    table.legal_name.push(field(record, 1));
    table.legal_nature.push(field(record, 2).as_deref().and_then(parse_code));
    table
        .responsible_qualification
        .push(field(record, 3).as_deref().and_then(parse_code));
    table.share_capital.push(field(record, 4).as_deref().and_then(parse_amount));
    table.size_code.push(field(record, 5));
}

/// Apply the positional `socios` layout; columns past the fifth are ignored.
pub fn append_partner(table: &mut PartnerTable, record: &ByteRecord) {
    table.key.push(key(record));
    table.partner_type.push(field(record, 1).as_deref().and_then(parse_code));
    table.partner_name.push(field(record, 2));
    table.partner_document.push(field(record, 3));
    table.qualification_code.push(field(record, 4));
}
