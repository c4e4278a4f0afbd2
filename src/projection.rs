//! Schema Projector
//!
//! Picks the single anchor table a generated query is built around, plus an
//! optional detail table, and renders the minimal schema text the prompt
//! embeds. A module may map to several header/detail/master tables; the
//! generator must anchor on exactly one to keep JOIN-free prompts tractable.

use crate::catalog::TableDescriptor;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Priority-ordered anchor candidates; first one present wins, else the first
/// candidate in catalog order.
const MAIN_TABLE_PRIORITY: &[&str] = &[
    "T_Ord_Main",
    "T_Invoice_Main",
    "Purchase_Yarn_Bill_Receipt_Main_New",
    "Accessories_Pur_Bill",
    "T_M_Party",
];

/// Vocabulary that asks for line-item breakdowns.
const DETAIL_KEYWORDS: &[&str] = &[
    "detail",
    "details",
    "line item",
    "breakup",
    "item wise",
    "item-wise",
];

/// Schema text handed to the prompt compiler: either a structured
/// table→columns mapping or text already rendered elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchemaInput {
    Structured(Vec<(String, Vec<String>)>),
    Preformatted(String),
}

impl SchemaInput {
    pub fn render(&self) -> String {
        match self {
            SchemaInput::Structured(tables) => tables
                .iter()
                .map(|(name, cols)| format!("{} ({})", name, cols.join(", ")))
                .collect::<Vec<_>>()
                .join("\n"),
            SchemaInput::Preformatted(text) => text.clone(),
        }
    }
}

/// Result of projecting resolved tables for one request.
#[derive(Debug, Clone)]
pub struct SchemaProjection {
    pub primary_table: TableDescriptor,
    pub detail_table: Option<TableDescriptor>,
    pub rendered_text: String,
}

impl SchemaProjection {
    pub fn schema_input(&self) -> SchemaInput {
        SchemaInput::Preformatted(self.rendered_text.clone())
    }
}

pub fn needs_detail_table(question: &str) -> bool {
    let q = question.to_lowercase();
    DETAIL_KEYWORDS.iter().any(|k| q.contains(k))
}

fn select_primary_table<'a>(candidates: &[&'a TableDescriptor]) -> &'a TableDescriptor {
    for name in MAIN_TABLE_PRIORITY {
        if let Some(table) = candidates.iter().find(|t| t.table_name == *name) {
            return table;
        }
    }
    candidates[0]
}

/// Project candidate tables into a primary (and optionally one detail) table
/// plus the rendered schema text. No column filtering happens here - the full
/// column list is projected; prompt rules forbid inventing columns.
pub fn project(question: &str, candidates: &[&TableDescriptor]) -> Result<SchemaProjection> {
    if candidates.is_empty() {
        return Err(EngineError::Catalog(
            "no candidate tables for resolved modules".to_string(),
        ));
    }

    let primary = select_primary_table(candidates);

    let mut detail = None;
    if needs_detail_table(question) {
        detail = candidates
            .iter()
            .find(|t| {
                t.table_name != primary.table_name
                    && t.table_name.to_lowercase().contains("detail")
            })
            .map(|t| (*t).clone());
    }

    let mut lines = vec![format!(
        "{} ({})",
        primary.qualified_name(),
        primary.column_names().join(", ")
    )];
    if let Some(ref d) = detail {
        lines.push(format!(
            "{} ({})",
            d.qualified_name(),
            d.column_names().join(", ")
        ));
    }

    Ok(SchemaProjection {
        primary_table: primary.clone(),
        detail_table: detail,
        rendered_text: lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnDescriptor;

    fn desc(table: &str, cols: &[&str]) -> TableDescriptor {
        TableDescriptor {
            module: "Sales_Order".to_string(),
            schema: "dbo".to_string(),
            table_name: table.to_string(),
            columns: cols
                .iter()
                .map(|c| ColumnDescriptor {
                    name: c.to_string(),
                    data_type: None,
                })
                .collect(),
            description: None,
        }
    }

    #[test]
    fn priority_table_wins_over_catalog_order() {
        let detail = desc("T_Ord_Detail", &["ord_id", "item"]);
        let main = desc("T_Ord_Main", &["ord_id", "ord_date"]);
        let candidates = vec![&detail, &main];

        let projection = project("how many orders", &candidates).unwrap();
        assert_eq!(projection.primary_table.table_name, "T_Ord_Main");
        assert!(projection.detail_table.is_none());
    }

    #[test]
    fn falls_back_to_first_candidate_without_priority_match() {
        let a = desc("Yarn_Stock", &["qty"]);
        let b = desc("Fabric_Stock", &["qty"]);
        let candidates = vec![&a, &b];

        let projection = project("stock levels", &candidates).unwrap();
        assert_eq!(projection.primary_table.table_name, "Yarn_Stock");
    }

    #[test]
    fn detail_keyword_appends_one_detail_table() {
        let main = desc("T_Ord_Main", &["ord_id"]);
        let detail = desc("T_Ord_Detail", &["ord_id", "item"]);
        let second_detail = desc("T_Ord_Detail_Tax", &["ord_id", "tax"]);
        let candidates = vec![&main, &detail, &second_detail];

        let projection = project("order details item wise", &candidates).unwrap();
        assert_eq!(
            projection.detail_table.as_ref().unwrap().table_name,
            "T_Ord_Detail"
        );
        assert_eq!(
            projection.rendered_text,
            "dbo.T_Ord_Main (ord_id)\ndbo.T_Ord_Detail (ord_id, item)"
        );
    }

    #[test]
    fn empty_candidates_is_an_error() {
        assert!(project("anything", &[]).is_err());
    }

    #[test]
    fn structured_schema_input_renders_lines() {
        let input = SchemaInput::Structured(vec![
            ("dbo.T_Ord_Main".to_string(), vec!["ord_id".to_string(), "ord_date".to_string()]),
        ]);
        assert_eq!(input.render(), "dbo.T_Ord_Main (ord_id, ord_date)");
    }
}
