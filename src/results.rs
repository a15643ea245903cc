use std::sync::Arc;

use crate::types::ParamValue;

/// A single row fetched from a forward-only cursor.
///
/// Column names are shared across all rows of one statement execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    column_names: Arc<Vec<String>>,
    values: Vec<ParamValue>,
}

impl Row {
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<ParamValue>) -> Self {
        Self {
            column_names,
            values,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Get a value by column name, or `None` if the column is not present.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&ParamValue> {
        let index = self
            .column_names
            .iter()
            .position(|name| name == column_name)?;
        self.values.get(index)
    }

    /// Get a value by column index, or `None` if out of bounds.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }
}

/// The unit emitted by query execution: a row for reads, an affected-row
/// count for writes. Tagged so downstream mapping knows which shape to expect.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultElement {
    Row(Row),
    RowsAffected(usize),
}

impl ResultElement {
    #[must_use]
    pub fn as_row(&self) -> Option<&Row> {
        if let ResultElement::Row(row) = self {
            Some(row)
        } else {
            None
        }
    }

    #[must_use]
    pub fn rows_affected(&self) -> Option<usize> {
        if let ResultElement::RowsAffected(count) = self {
            Some(*count)
        } else {
            None
        }
    }
}
