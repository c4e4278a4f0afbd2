//! Schema Catalog
//!
//! Loads per-table descriptor records from a directory of JSON files and
//! serves read-only lookups by module. Loaded once at startup, shared via
//! `Arc`, never mutated afterwards.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDescriptor {
    pub module: String,
    pub schema: String,
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    /// Free-text description; feeds the semantic index
    #[serde(default)]
    pub description: Option<String>,
}

impl TableDescriptor {
    /// Fully qualified `schema.table_name` form used in generated SQL.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table_name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Read-only catalog of table descriptors grouped by module.
#[derive(Debug, Clone)]
pub struct TableCatalog {
    tables_by_module: HashMap<String, Vec<TableDescriptor>>,
    /// Modules in first-encounter order, so candidate iteration is stable
    module_order: Vec<String>,
}

impl TableCatalog {
    /// Load every `*.json` descriptor in `dir`. Unparseable files are skipped
    /// with a warning; duplicate `table_name` within a module+schema pair is
    /// a hard error.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(EngineError::Catalog(format!(
                "catalog directory not found: {}",
                dir.display()
            )));
        }

        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        entries.sort();

        let mut descriptors = Vec::new();
        for path in entries {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<TableDescriptor>(&contents) {
                Ok(desc) => descriptors.push(desc),
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }

        Self::from_descriptors(descriptors)
    }

    /// Build a catalog from already-parsed descriptors.
    pub fn from_descriptors(descriptors: Vec<TableDescriptor>) -> Result<Self> {
        let mut tables_by_module: HashMap<String, Vec<TableDescriptor>> = HashMap::new();
        let mut module_order = Vec::new();
        let mut seen: HashSet<(String, String, String)> = HashSet::new();

        for desc in descriptors {
            let key = (
                desc.module.clone(),
                desc.schema.clone(),
                desc.table_name.clone(),
            );
            if !seen.insert(key) {
                return Err(EngineError::Catalog(format!(
                    "duplicate table {} in module {}",
                    desc.qualified_name(),
                    desc.module
                )));
            }
            if !tables_by_module.contains_key(&desc.module) {
                module_order.push(desc.module.clone());
            }
            tables_by_module
                .entry(desc.module.clone())
                .or_default()
                .push(desc);
        }

        let catalog = Self {
            tables_by_module,
            module_order,
        };
        info!(
            "catalog loaded: {} tables across {} modules",
            catalog.table_count(),
            catalog.module_count()
        );
        Ok(catalog)
    }

    pub fn tables_for_module(&self, module: &str) -> Option<&[TableDescriptor]> {
        self.tables_by_module.get(module).map(|v| v.as_slice())
    }

    /// Candidate tables for a resolved module set, in catalog order. Modules
    /// without tables contribute nothing.
    pub fn tables_for_modules(&self, modules: &[String]) -> Vec<&TableDescriptor> {
        let mut out = Vec::new();
        for module in modules {
            if let Some(tables) = self.tables_by_module.get(module) {
                out.extend(tables.iter());
            }
        }
        out
    }

    pub fn all_tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.module_order
            .iter()
            .flat_map(move |m| self.tables_by_module[m].iter())
    }

    pub fn table_count(&self) -> usize {
        self.tables_by_module.values().map(|v| v.len()).sum()
    }

    pub fn module_count(&self) -> usize {
        self.tables_by_module.len()
    }
}
