//! WB category ids.
//!
//! A category written as `wb: <subjectId> - <entity>` gets a stable id: the
//! CRC-32 (IEEE) of `"<subjectId>_<entity>"`. Any other category string
//! yields 0, meaning "no id".

const WB_PREFIX: &str = "wb:";

/// Splits a WB category into `(subject_id, entity)`.
pub fn parse_wb_category(category: &str) -> Option<(&str, &str)> {
    let trimmed = category.trim();
    let prefix = trimmed.get(..WB_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(WB_PREFIX) {
        return None;
    }
    let rest = trimmed.get(WB_PREFIX.len()..)?.trim();

    let mut parts = rest.split(" - ");
    let subject = parts.next()?.trim();
    let entity = parts.next()?.trim();
    if parts.next().is_some() || subject.is_empty() || entity.is_empty() {
        return None;
    }
    Some((subject, entity))
}

pub fn generate(category: &str) -> i64 {
    match parse_wb_category(category) {
        Some((subject, entity)) => from_parts(subject, entity),
        None => 0,
    }
}

pub fn from_parts(subject: &str, entity: &str) -> i64 {
    let combined = format!("{}_{}", subject, entity);
    i64::from(crc32fast::hash(combined.as_bytes()))
}
