//! Table Resolver - keyword strategy and role-filter classifier
//!
//! Maps a business question onto catalog modules via an ordered phrase table.
//! The table is literal data, not code branches, so it stays independently
//! testable and swappable without touching pipeline logic.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Inventory questions rarely say which material type they mean, so any
/// inventory keyword selects every inventory sub-module at once.
const INVENTORY_MODULES: &[&str] = &[
    "Inventory_Yarn",
    "Inventory_Fabric",
    "Inventory_Accessories",
    "Inventory_FG",
];

const INVENTORY_KEYWORDS: &[&str] = &[
    "inventory",
    "stock",
    "stock balance",
    "stock inward",
    "stock outward",
    "closing stock",
    "opening stock",
];

const SUPPLIER_TERMS: &[&str] = &["supplier", "suppliers", "vendor", "vendors", "creditor"];
const BUYER_TERMS: &[&str] = &["buyer", "buyers", "customer", "customers", "debtor"];

/// Predicate distinguishing supplier from buyer records in the shared party
/// table. Appended to generated SQL by the response guard, never by the
/// generator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleFilter {
    Creditors,
    Debtors,
}

impl RoleFilter {
    pub fn predicate(&self) -> &'static str {
        match self {
            RoleFilter::Creditors => "parent LIKE '%CREDITORS%'",
            RoleFilter::Debtors => "parent LIKE '%DEBTORS%'",
        }
    }
}

/// Keyword-driven module resolver.
pub struct IntentParser {
    /// (phrase, module), sorted longest-phrase-first at construction so the
    /// most specific phrase wins ("sales order" before "order")
    keyword_map: Vec<(String, String)>,
}

impl IntentParser {
    pub fn new() -> Self {
        let entries: &[(&str, &str)] = &[
            // sales
            ("sales order", "Sales_Order"),
            ("sales orders", "Sales_Order"),
            ("order", "Sales_Order"),
            ("orders", "Sales_Order"),
            ("so", "Sales_Order"),
            ("service order", "Sales_Order"),
            ("dispatch", "Sales_Order"),
            ("delivery", "Sales_Order"),
            ("pending orders", "Sales_Order"),
            // invoice / billing
            ("invoice", "Invoice"),
            ("invoices", "Invoice"),
            ("billing", "Invoice"),
            ("bill", "Invoice"),
            ("bills", "Invoice"),
            ("tax invoice", "Invoice"),
            ("gst invoice", "Invoice"),
            ("sales invoice", "Invoice"),
            // purchase (generic)
            ("purchase", "Purchase_Generic"),
            ("purchases", "Purchase_Generic"),
            ("procurement", "Purchase_Generic"),
            // purchase - yarn
            ("purchase yarn", "Purchase_Yarn"),
            ("yarn purchase", "Purchase_Yarn"),
            ("yarn bill", "Purchase_Yarn"),
            ("yarn receipt", "Purchase_Yarn"),
            ("yarn grn", "Purchase_Yarn"),
            // purchase - accessories
            ("purchase accessories", "Purchase_Accessories"),
            ("accessories purchase", "Purchase_Accessories"),
            ("accessories bill", "Purchase_Accessories"),
            ("accessories indent", "Purchase_Accessories"),
            // purchase - fabric
            ("purchase fabric", "Purchase_Fabric"),
            ("fabric purchase", "Purchase_Fabric"),
            ("fabric order", "Purchase_Fabric"),
            ("fabric grn", "Purchase_Fabric"),
            // purchase - finished goods / madeups
            ("purchase fg", "Purchase_FG_Madeups"),
            ("finished goods purchase", "Purchase_FG_Madeups"),
            ("madeups purchase", "Purchase_FG_Madeups"),
            // suppliers / buyers
            ("supplier", "Suppliers_Buyers"),
            ("suppliers", "Suppliers_Buyers"),
            ("vendor", "Suppliers_Buyers"),
            ("vendors", "Suppliers_Buyers"),
            ("buyer", "Suppliers_Buyers"),
            ("buyers", "Suppliers_Buyers"),
            ("customer", "Suppliers_Buyers"),
            ("customers", "Suppliers_Buyers"),
            ("party", "Suppliers_Buyers"),
            ("party master", "Suppliers_Buyers"),
        ];

        let mut keyword_map: Vec<(String, String)> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        keyword_map.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self { keyword_map }
    }

    /// Resolve a question to one or more catalog modules.
    ///
    /// Inventory keywords expand to all inventory sub-modules; otherwise the
    /// longest matching phrase selects a single module.
    pub fn resolve(&self, question: &str) -> Result<Vec<String>> {
        let question_lower = question.to_lowercase();

        // Inventory expansion takes priority over single-module phrases so
        // "stock balance" never collapses to one material type.
        if INVENTORY_KEYWORDS.iter().any(|k| question_lower.contains(k)) {
            return Ok(INVENTORY_MODULES.iter().map(|m| m.to_string()).collect());
        }

        for (phrase, module) in &self.keyword_map {
            if question_lower.contains(phrase.as_str()) {
                return Ok(vec![module.clone()]);
            }
        }

        Err(EngineError::NoModuleDetected)
    }

    /// Independent classifier over the same question. Supplier vocabulary
    /// takes precedence when both vocabularies co-occur; at most one filter
    /// is ever produced.
    pub fn detect_role_filter(&self, question: &str) -> Option<RoleFilter> {
        let question_lower = question.to_lowercase();

        if SUPPLIER_TERMS.iter().any(|t| question_lower.contains(t)) {
            return Some(RoleFilter::Creditors);
        }
        if BUYER_TERMS.iter().any(|t| question_lower.contains(t)) {
            return Some(RoleFilter::Debtors);
        }
        None
    }
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new()
    }
}
