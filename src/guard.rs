//! Response Guard
//!
//! Extracts structured contracts from raw, untrusted generator text and
//! enforces the SELECT-only safety fallback. Extraction never panics and
//! never partially populates a contract: every path ends in either a fully
//! parsed value or the contract's documented fallback.

use crate::catalog::TableDescriptor;
use crate::intent::RoleFilter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

/// Table the role filter is scoped to; questions about parties resolve here.
const PARTY_TABLE: &str = "T_M_Party";

/// Why extraction of a contract from raw text failed. Callers handle this
/// branch explicitly and select the fallback; it is never surfaced as a
/// pipeline error.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("no JSON object found in generator output")]
    NoJsonObject,

    #[error("generator output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("generator output is missing required contract keys: {0}")]
    MissingKeys(String),

    #[error("no SELECT statement found in generator output")]
    NoSelectStatement,
}

/// Expected shape of generator output for SQL generation and refinement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqlContract {
    pub query: String,
    pub confidence: f64,
}

impl SqlContract {
    /// Deterministic fallback: empty query, zero confidence.
    pub fn fallback() -> Self {
        Self {
            query: String::new(),
            confidence: 0.0,
        }
    }

    /// Extract from raw generator text, or fail. Both required keys must be
    /// present; a valid JSON object missing either one is a contract
    /// violation, never a partial parse.
    pub fn extract(raw: &str) -> Result<Self, ExtractionFailure> {
        let value = extract_json_object(raw)?;
        serde_json::from_value(value)
            .map_err(|e| ExtractionFailure::MissingKeys(e.to_string()))
    }

    /// Extract with the fallback applied on any violation.
    pub fn extract_or_fallback(raw: &str) -> Self {
        match Self::extract(raw) {
            Ok(contract) => contract,
            Err(e) => {
                warn!("SQL contract violation, using fallback: {}", e);
                Self::fallback()
            }
        }
    }
}

/// Expected shape of generator output for the insight variant. `suggestions`
/// and `evidence` are optional per configuration; the core keys are not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightContract {
    pub insight: String,
    pub greeting: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub confidence: f64,
}

impl InsightContract {
    /// All-empty, zero-confidence fallback.
    pub fn fallback() -> Self {
        Self {
            insight: String::new(),
            greeting: String::new(),
            suggestions: vec![String::new(), String::new(), String::new()],
            evidence: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn extract(raw: &str) -> Result<Self, ExtractionFailure> {
        let value = extract_json_object(raw)?;
        serde_json::from_value(value)
            .map_err(|e| ExtractionFailure::MissingKeys(e.to_string()))
    }

    pub fn extract_or_fallback(raw: &str) -> Self {
        match Self::extract(raw) {
            Ok(contract) => contract,
            Err(e) => {
                warn!("insight contract violation, using fallback: {}", e);
                Self::fallback()
            }
        }
    }
}

/// Locate the span between the first `{` and the last `}` and parse it as a
/// JSON object, tolerating surrounding prose or markdown fences.
pub fn extract_json_object(raw: &str) -> Result<serde_json::Value, ExtractionFailure> {
    let start = raw.find('{').ok_or(ExtractionFailure::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(ExtractionFailure::NoJsonObject)?;
    if end < start {
        return Err(ExtractionFailure::NoJsonObject);
    }

    let span = &raw[start..=end];
    let value: serde_json::Value =
        serde_json::from_str(span).map_err(|e| ExtractionFailure::InvalidJson(e.to_string()))?;

    if value.is_object() {
        Ok(value)
    } else {
        Err(ExtractionFailure::NoJsonObject)
    }
}

/// Matcher for a terminated `SELECT ... ;` statement, compiled once.
fn statement_re() -> &'static Regex {
    static STATEMENT_RE: OnceLock<Regex> = OnceLock::new();
    STATEMENT_RE.get_or_init(|| Regex::new(r"(?is)\bSELECT\b.*?;").expect("statement regex"))
}

/// Extract a raw SQL statement when the prompt asked for "SQL only, no JSON".
///
/// Strips markdown fences and leading language markers, then takes the first
/// `SELECT ... ;` statement; a cleaned text starting with SELECT but missing
/// the terminator yields its first line as a best-effort statement.
pub fn extract_sql_statement(raw: &str) -> Result<String, ExtractionFailure> {
    let mut cleaned = raw.trim().to_string();

    for marker in ["```sql", "```tsql", "```"] {
        cleaned = cleaned.replace(marker, "");
    }
    let cleaned = cleaned.trim();
    let lowered = cleaned.to_lowercase();
    let cleaned = match lowered.strip_prefix("sql:") {
        Some(_) => cleaned["sql:".len()..].trim(),
        None => cleaned,
    };

    // First terminated statement wins
    if let Some(m) = statement_re().find(cleaned) {
        return Ok(m.as_str().trim().to_string());
    }

    if cleaned.to_lowercase().starts_with("select") {
        let first_line = cleaned.lines().next().unwrap_or(cleaned);
        return Ok(first_line.trim().to_string());
    }

    Err(ExtractionFailure::NoSelectStatement)
}

/// Outcome of the SELECT-only safety guard.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedSql {
    pub sql: String,
    /// True when the deterministic fallback replaced the candidate
    pub used_fallback: bool,
}

/// Guarantee the pipeline always returns something executable: any candidate
/// that does not begin with SELECT is replaced by a bounded wildcard query
/// over the primary table.
pub fn guard_sql(candidate: &str, primary: &TableDescriptor) -> GuardedSql {
    let trimmed = candidate.trim();
    if trimmed.to_lowercase().starts_with("select") {
        GuardedSql {
            sql: trimmed.to_string(),
            used_fallback: false,
        }
    } else {
        warn!(
            "unsafe or empty SQL candidate, substituting fallback over {}",
            primary.qualified_name()
        );
        GuardedSql {
            sql: format!("SELECT TOP 100 * FROM {}", primary.qualified_name()),
            used_fallback: true,
        }
    }
}

/// Append the role-filter predicate when the statement touches the party
/// table. Applied after extraction so the filter is enforced even if the
/// generator omitted it.
pub fn apply_role_filter(sql: &str, filter: Option<RoleFilter>) -> String {
    let Some(filter) = filter else {
        return sql.to_string();
    };
    if !sql.contains(PARTY_TABLE) {
        return sql.to_string();
    }

    if sql.to_lowercase().contains("where") {
        format!("{} AND {}", sql, filter.predicate())
    } else {
        format!("{} WHERE {}", sql, filter.predicate())
    }
}
