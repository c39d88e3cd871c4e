//! Results Table Module
//!
//! Tabular query results: ordered column names plus rows, with plain-text
//! rendering and CSV/JSON/Markdown export.

use crate::core::db::driver::{Row, Value};
use crate::core::{BridgeError, Result};
use serde_json::{Map, Value as JsonValue};

/// A query result with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl QueryTable {
    /// Pairs column names with rows. Column order is preserved.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        QueryTable { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The value at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row)?.get(index)
    }

    /// All values of column `name`, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }

    /// Splits the table back into its parts.
    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }

    fn cells(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(Value::to_string).collect())
            .collect()
    }

    /// Renders the table as an aligned plain-text grid.
    pub fn render(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }
        let cells = self.cells();
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        let pad = |values: &[String]| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(value, width)| format!("{:<width$}", value, width = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut output = pad(&self.columns);
        output.push('\n');
        let underline: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        output.push_str(&underline.join("-+-"));
        output.push('\n');
        for row in &cells {
            output.push_str(&pad(row));
            output.push('\n');
        }
        output
    }

    /// Exports the table to a specified format.
    /// Supported formats: CSV, JSON, Markdown.
    pub fn export(&self, format: &str) -> Result<String> {
        match format.to_lowercase().as_str() {
            "csv" => Ok(self.export_to_csv()),
            "json" => self.export_to_json(),
            "markdown" | "md" => Ok(self.export_to_markdown()),
            _ => Err(BridgeError::Export(format!(
                "Unsupported export format: '{}'. Supported formats: csv, json, markdown",
                format
            ))),
        }
    }

    fn export_to_csv(&self) -> String {
        let mut output = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| csv_field(c)).collect();
        output.push_str(&header.join(","));
        output.push('\n');
        for row in &self.rows {
            let fields: Vec<String> = row
                .iter()
                .map(|value| match value {
                    Value::Null => String::new(),
                    other => csv_field(&other.to_string()),
                })
                .collect();
            output.push_str(&fields.join(","));
            output.push('\n');
        }
        output
    }

    fn export_to_json(&self) -> Result<String> {
        let mut records = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut record = Map::new();
            for (column, value) in self.columns.iter().zip(row) {
                let value = serde_json::to_value(value)
                    .map_err(|e| BridgeError::Export(format!("JSON encoding failed: {}", e)))?;
                record.insert(column.clone(), value);
            }
            records.push(JsonValue::Object(record));
        }
        serde_json::to_string(&records).map_err(|e| BridgeError::Export(format!("JSON encoding failed: {}", e)))
    }

    fn export_to_markdown(&self) -> String {
        let mut output = format!("| {} |\n", self.columns.join(" | "));
        let underline: Vec<&str> = self.columns.iter().map(|_| "---").collect();
        output.push_str(&format!("| {} |\n", underline.join(" | ")));
        for row in self.cells() {
            let escaped: Vec<String> = row.iter().map(|cell| cell.replace('|', "\\|")).collect();
            output.push_str(&format!("| {} |\n", escaped.join(" | ")));
        }
        output
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> QueryTable {
        QueryTable::new(
            vec!["col1".to_string(), "col2".to_string()],
            vec![
                vec![Value::Integer(1), Value::from("data1")],
                vec![Value::Integer(2), Value::from("data2")],
            ],
        )
    }

    #[test]
    fn test_accessors() {
        let table = sample_table();
        assert_eq!(table.columns(), ["col1", "col2"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_index("col2"), Some(1));
        assert_eq!(table.get(1, "col1"), Some(&Value::Integer(2)));
        assert_eq!(table.get(5, "col1"), None);
        assert_eq!(table.get(0, "missing"), None);
        assert_eq!(
            table.column("col2"),
            Some(vec![&Value::from("data1"), &Value::from("data2")])
        );
    }

    #[test]
    fn test_render_empty_table() {
        let table = QueryTable::new(Vec::new(), Vec::new());
        assert_eq!(table.render(), "");
    }

    #[test]
    fn test_render_aligns_columns() {
        let table = QueryTable::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Value::Integer(1), Value::from("Alice")],
                vec![Value::Integer(100), Value::Null],
            ],
        );
        let expected = "id  | name\n----+------\n1   | Alice\n100 | NULL\n";
        assert_eq!(table.render(), expected);
    }

    #[test]
    fn test_export_to_csv() {
        let table = QueryTable::new(
            vec!["id".to_string(), "note".to_string()],
            vec![
                vec![Value::Integer(1), Value::from("a,b")],
                vec![Value::Integer(2), Value::Null],
            ],
        );
        let csv = table.export("csv").unwrap();
        assert_eq!(csv, "id,note\n1,\"a,b\"\n2,\n");
    }

    #[test]
    fn test_export_to_json_keeps_types() {
        let json = sample_table().export("json").unwrap();
        assert_eq!(json, r#"[{"col1":1,"col2":"data1"},{"col1":2,"col2":"data2"}]"#);
    }

    #[test]
    fn test_export_to_markdown() {
        let markdown = sample_table().export("markdown").unwrap();
        let lines: Vec<&str> = markdown.lines().collect();
        assert_eq!(
            lines,
            vec!["| col1 | col2 |", "| --- | --- |", "| 1 | data1 |", "| 2 | data2 |"]
        );
    }

    #[test]
    fn test_export_unsupported_format() {
        match sample_table().export("xml") {
            Err(BridgeError::Export(msg)) => {
                assert!(msg.contains("Unsupported export format"));
                assert!(msg.contains("xml"));
            }
            other => panic!("Expected Export error, got {:?}", other),
        }
    }
}
