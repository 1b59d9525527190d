//! Structured setting values
//!
//! Two value shapes cross the RPC surface: a labeled numeric series
//! (video configuration, surface alphas) whose text form is a JSON
//! object, and a labeled corner table with an explicit integer index
//! column whose text form is CSV with an unnamed leading index header.

use serde_json::{Map, Number, Value};

use crate::error::SettingsError;

/// Ordered, labeled numeric series
///
/// An empty series is the "all absent" value, distinct from a missing
/// setting only at the document layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    entries: Vec<(String, Number)>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append a labeled value, keeping insertion order
    pub fn push(&mut self, label: impl Into<String>, value: Number) {
        self.entries.push((label.into(), value));
    }

    pub fn get(&self, label: &str) -> Option<&Number> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(String, Number)] {
        &self.entries
    }

    /// Parse the JSON object text form, preserving label order
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let value: Value = serde_json::from_str(text)?;
        let object = value
            .as_object()
            .ok_or_else(|| SettingsError::MalformedJson("expected a JSON object".to_string()))?;

        let mut series = Series::new();
        for (label, entry) in object {
            match entry.as_number() {
                Some(number) => series.push(label.clone(), number.clone()),
                None => {
                    return Err(SettingsError::MalformedJson(format!(
                        "value for '{label}' is not a number"
                    )))
                }
            }
        }
        Ok(series)
    }

    /// Serialize to the JSON object text form (`{}` when empty)
    pub fn to_json(&self) -> String {
        let mut object = Map::new();
        for (label, value) in &self.entries {
            object.insert(label.clone(), Value::Number(value.clone()));
        }
        Value::Object(object).to_string()
    }
}

/// Two-dimensional labeled table with an explicit integer index column
///
/// The CSV text form mirrors the companion's output: an unnamed index
/// header cell followed by column labels, then one row per index.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerTable {
    columns: Vec<String>,
    index: Vec<i64>,
    rows: Vec<Vec<f64>>,
}

impl CornerTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            index: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row under `index`; the row must match the column count
    pub fn push_row(&mut self, index: i64, row: Vec<f64>) -> Result<(), SettingsError> {
        if row.len() != self.columns.len() {
            return Err(SettingsError::RowArity {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.index.push(index);
        self.rows.push(row);
        Ok(())
    }

    /// Parse the CSV text form
    pub fn from_csv(text: &str) -> Result<Self, SettingsError> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| SettingsError::MalformedCsv("empty text".to_string()))?;

        let mut cells = header.split(',');
        let index_cell = cells.next().unwrap_or("");
        if !index_cell.is_empty() {
            return Err(SettingsError::MalformedCsv(
                "header must start with an unnamed index column".to_string(),
            ));
        }
        let columns: Vec<String> = cells.map(str::to_string).collect();
        if columns.is_empty() {
            return Err(SettingsError::MalformedCsv("no columns".to_string()));
        }

        let mut table = CornerTable::new(columns);
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let mut cells = line.split(',');
            let index = cells
                .next()
                .unwrap_or("")
                .parse::<i64>()
                .map_err(|e| SettingsError::MalformedCsv(format!("bad index: {e}")))?;
            let row = cells
                .map(|cell| {
                    cell.parse::<f64>()
                        .map_err(|e| SettingsError::MalformedCsv(format!("bad value: {e}")))
                })
                .collect::<Result<Vec<f64>, SettingsError>>()?;
            table.push_row(index, row)?;
        }
        Ok(table)
    }

    /// Serialize to the CSV text form, trailing newline included
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push(',');
        out.push_str(&self.columns.join(","));
        out.push('\n');
        for (index, row) in self.index.iter().zip(&self.rows) {
            out.push_str(&index.to_string());
            for value in row {
                out.push(',');
                out.push_str(&fmt_float(*value));
            }
            out.push('\n');
        }
        out
    }
}

/// Format a cell the way the companion writes them: whole values keep
/// one decimal place.
fn fmt_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
