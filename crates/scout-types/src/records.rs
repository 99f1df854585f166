//! Accessors over raw result records.
//!
//! Workers write free-form JSON objects; the merge only looks at a few
//! fields and passes everything else through untouched.

use serde_json::Value;

pub const JOB_URL_FIELD: &str = "job_url";
pub const MATCH_SCORE_FIELD: &str = "match_score";
pub const COMPANY_NAME_FIELD: &str = "name";

/// Dedup key of a job record. Missing, non-string and blank urls yield `None`.
pub fn job_url(record: &Value) -> Option<&str> {
    record
        .get(JOB_URL_FIELD)
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
}

/// Ranking score of a job record; absent or non-numeric scores rank as 0.
pub fn match_score(record: &Value) -> f64 {
    match record.get(MATCH_SCORE_FIELD) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn company_name(record: &Value) -> Option<&str> {
    record
        .get(COMPANY_NAME_FIELD)
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
}
