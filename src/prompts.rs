//! Prompt Compiler
//!
//! Pure functions rendering the strict-contract instruction templates for the
//! three prompt variants: SQL generation, SQL refinement, and result-set
//! insight. Compiling the same inputs twice yields byte-identical text; the
//! current date is injected by the caller, never read here.

use crate::executor::ExecutionResult;
use crate::projection::SchemaInput;
use chrono::NaiveDate;

/// Append the current date so relative phrasing ("last month") is
/// disambiguated without the generator inventing a clock.
pub fn augment_with_current_date(question: &str, today: NaiveDate) -> String {
    format!("{} [Current date: {}]", question, today.format("%Y-%m-%d"))
}

/// SQL generation prompt. The schema block is authoritative; the contract
/// requires a `{query, confidence}` JSON object and a zero-confidence empty
/// query instead of guessed identifiers.
pub fn build_sql_prompt(question: &str, schema: &SchemaInput) -> String {
    let schema_text = schema.render();

    format!(
        r#"ROLE
You are an expert Microsoft SQL Server (T-SQL) query generator.

OBJECTIVE
Convert the user's business question into a valid, executable T-SQL SELECT query.

OUTPUT FORMAT (STRICT JSON ONLY)
{{
  "query": "<the T-SQL SELECT statement, or empty string>",
  "confidence": <number between 0 and 1>
}}
- confidence 1.0 means every table and column is verified against the schema
- confidence 0.0 means the question cannot be answered from the schema; in that case return an empty query, do NOT guess
- Do NOT include explanations, comments, or markdown

MANDATORY RULES
1. Generate ONLY a SELECT statement
2. NEVER generate INSERT, UPDATE, DELETE, DROP, or ALTER
3. Use ONLY the tables and columns explicitly listed in the schema
4. Do NOT invent tables or columns
5. Do NOT use JOINs
6. Use SQL Server-supported date functions only:
   GETDATE(), DATEADD(), DATEDIFF(), YEAR(), MONTH()
7. NEVER use PostgreSQL/MySQL syntax:
   EXTRACT(), INTERVAL, DATE_SUB(), LIMIT
8. Use TOP instead of LIMIT when required
9. Use correct GROUP BY rules for aggregate queries

DATE LOGIC RULES
- For "last month", "this month", etc., prefer date-range filtering using:
  DATEADD + DATEDIFF
- Do NOT apply YEAR() or MONTH() to non-date values

SCHEMA (AUTHORITATIVE - DO NOT QUESTION)
{schema_text}

USER QUESTION
{question}

FINAL INSTRUCTION
Return ONLY the JSON object."#
    )
}

/// SQL refinement prompt: presents the failing statement and the exact error,
/// restricts fixes to schema-listed identifiers, same output contract as
/// generation.
pub fn build_refine_prompt(failed_sql: &str, error_message: &str, schema_text: &str) -> String {
    format!(
        r#"ROLE
You are an expert Microsoft SQL Server (T-SQL) query fixer.

A generated query failed to execute. Fix it using ONLY the tables and columns
listed in the schema below.

FAILED QUERY
{failed_sql}

DATABASE ERROR
{error_message}

SCHEMA (AUTHORITATIVE - DO NOT QUESTION)
{schema_text}

OUTPUT FORMAT (STRICT JSON ONLY)
{{
  "query": "<the corrected T-SQL SELECT statement, or empty string>",
  "confidence": <number between 0 and 1>
}}

MANDATORY RULES
1. The corrected query must be a SELECT statement - never INSERT, UPDATE,
   DELETE, DROP, or ALTER
2. If the error refers to a column or table that is not in the schema, return
   an empty query with confidence 0.0 - do NOT guess a replacement
3. Do NOT use JOINs
4. Use TOP instead of LIMIT; SQL Server date functions only
5. Do NOT include explanations, comments, or markdown

Return ONLY the JSON object."#
    )
}

/// Insight prompt: embeds the (possibly truncated, possibly empty) result set
/// as pretty-printed JSON plus an explicit validity flag.
pub fn build_insight_prompt(question: &str, result: &ExecutionResult) -> String {
    let data_json = serde_json::to_string_pretty(&result.data)
        .unwrap_or_else(|_| "[]".to_string());

    let data_flag = if result.is_empty() {
        "[EMPTY DATASET]"
    } else {
        "[DATA VALID]"
    };

    let truncation_note = if result.is_truncated {
        format!(
            "\nNOTE: The dataset was truncated ({}); treat totals as partial.",
            result
                .truncation_reason
                .as_deref()
                .unwrap_or("limit reached")
        )
    } else {
        String::new()
    };

    format!(
        r#"You are an enterprise ERP business insight engine.

USER QUERY:
"{question}"

DATA STATUS: {data_flag}{truncation_note}

DATA (AUTHORITATIVE, DO NOT QUESTION):
{data_json}

OUTPUT FORMAT (STRICT JSON ONLY):
{{
  "insight": "<2-3 lines describing what the data shows>",
  "greeting": "<1 line encouraging or neutral progress message>",
  "suggestions": ["<action 1>", "<action 2>", "<action 3>"],
  "evidence": ["<key:value from data>", "..."],
  "confidence": <number between 0 and 1>
}}

STRICT RULES:
- Use ONLY the provided data
- Do NOT invent numbers or trends
- suggestions MUST have exactly 3 items
- If the dataset is empty, insufficient, or ambiguous, return:
  {{
    "insight": "",
    "greeting": "",
    "suggestions": ["", "", ""],
    "evidence": [],
    "confidence": 0.0
  }}
- Do NOT output explanations, markdown, or comments

Now produce the JSON output."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_augmentation_is_appended() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();
        assert_eq!(
            augment_with_current_date("How many orders?", date),
            "How many orders? [Current date: 2026-08-27]"
        );
    }

    #[test]
    fn sql_prompt_is_idempotent() {
        let schema = SchemaInput::Preformatted("dbo.T_Ord_Main (ord_id, ord_date)".to_string());
        let a = build_sql_prompt("How many orders?", &schema);
        let b = build_sql_prompt("How many orders?", &schema);
        assert_eq!(a, b);
        assert!(a.contains("dbo.T_Ord_Main"));
        assert!(a.contains("NEVER generate INSERT"));
    }

    #[test]
    fn refine_prompt_carries_sql_and_error() {
        let prompt = build_refine_prompt(
            "SELECT bad_col FROM dbo.T_Ord_Main",
            "Invalid column name 'bad_col'",
            "dbo.T_Ord_Main (ord_id)",
        );
        assert!(prompt.contains("SELECT bad_col FROM dbo.T_Ord_Main"));
        assert!(prompt.contains("Invalid column name 'bad_col'"));
        assert!(prompt.contains("confidence 0.0"));
    }

    #[test]
    fn insight_prompt_flags_empty_dataset() {
        let result = ExecutionResult::empty_success();
        let prompt = build_insight_prompt("total orders", &result);
        assert!(prompt.contains("[EMPTY DATASET]"));
        assert!(!prompt.contains("[DATA VALID]"));
    }

    #[test]
    fn insight_prompt_notes_truncation() {
        let mut result = ExecutionResult::empty_success();
        result.data.push(serde_json::Map::new());
        result.row_count = 1;
        result.is_truncated = true;
        result.truncation_reason = Some("row limit (10)".to_string());

        let prompt = build_insight_prompt("total orders", &result);
        assert!(prompt.contains("[DATA VALID]"));
        assert!(prompt.contains("row limit (10)"));
    }
}
