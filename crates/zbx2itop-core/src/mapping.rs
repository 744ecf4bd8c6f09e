//! Host to CSV row mapping.

use std::collections::HashSet;

use crate::config::{Column, OutputConfig};
use crate::error::Result;
use crate::template::TemplateEngine;
use crate::zabbix::ZabbixHost;

/// One CSV row, values in column order.
pub type Row = Vec<String>;

/// Builds rows for one output from its column definitions.
pub struct RowBuilder {
    columns: Vec<Column>,
    names: Vec<String>,
    engine: TemplateEngine,
}

impl RowBuilder {
    /// Validate the columns and compile template columns.
    pub fn new(output: &OutputConfig) -> Result<Self> {
        let names = output.destination_columns()?;
        let mut engine = TemplateEngine::new();
        for column in &output.columns {
            if let Column::Template { itop, template } = column {
                engine.add_template(itop, template)?;
            }
        }
        Ok(Self {
            columns: output.columns.clone(),
            names,
            engine,
        })
    }

    /// Destination attribute names (the CSV header).
    pub fn columns(&self) -> &[String] {
        &self.names
    }

    pub fn build(&self, host: &ZabbixHost) -> Result<Row> {
        self.columns
            .iter()
            .map(|column| match column {
                Column::Static { value, .. } => Ok(value.clone()),
                Column::Template { itop, .. } => self.engine.render_host(itop, host),
                Column::Map { zabbix, .. } => Ok(host.resolve(zabbix)),
            })
            .collect()
    }
}

/// Ordered rows, deduplicated on the configured key columns.
#[derive(Debug, Default)]
pub struct RowSet {
    key_indices: Vec<usize>,
    seen: HashSet<Vec<String>>,
    rows: Vec<Row>,
}

impl RowSet {
    /// With no key columns every row is kept.
    pub fn new(key_indices: Vec<usize>) -> Self {
        Self {
            key_indices,
            seen: HashSet::new(),
            rows: Vec::new(),
        }
    }

    /// Add a row. Returns false if a row with the same key was already added.
    pub fn insert(&mut self, row: Row) -> bool {
        if !self.key_indices.is_empty() {
            let key: Vec<String> = self
                .key_indices
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect();
            if self.seen.contains(&key) {
                tracing::debug!(key = ?key, "Row key already reported as unique, skipping");
                return false;
            }
            self.seen.insert(key);
        }
        self.rows.push(row);
        true
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}
