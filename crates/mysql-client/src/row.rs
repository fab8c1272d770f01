//! Row representation for query results.
//!
//! A [`Row`] holds decoded values plus a shared reference to the column
//! list of its result set, so rows of one result set share column metadata.

use std::sync::Arc;

use mysql_protocol::{ColumnDefinition, ColumnFlags, ColumnType};
use mysql_types::{FromSql, SqlValue, TypeError};

/// Column metadata describing a result set column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    index: usize,
    definition: ColumnDefinition,
}

impl Column {
    /// Wrap a column definition received from the server.
    #[must_use]
    pub fn new(index: usize, definition: ColumnDefinition) -> Self {
        Self { index, definition }
    }

    /// Column label (alias or name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Column index (0-based).
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Table alias the column comes from.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.definition.table
    }

    /// Schema the column comes from.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.definition.schema
    }

    /// Wire type.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        self.definition.column_type
    }

    /// Column flags.
    #[must_use]
    pub fn flags(&self) -> ColumnFlags {
        self.definition.flags
    }

    /// Collation id.
    #[must_use]
    pub fn charset(&self) -> u16 {
        self.definition.charset
    }

    /// Declared display length.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.definition.column_length
    }

    /// Number of decimals.
    #[must_use]
    pub fn decimals(&self) -> u8 {
        self.definition.decimals
    }

    /// Whether integer values are unsigned.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        self.definition.is_unsigned()
    }

    /// Whether the column allows NULL.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.definition.is_nullable()
    }

    /// The full definition as sent by the server.
    #[must_use]
    pub fn definition(&self) -> &ColumnDefinition {
        &self.definition
    }
}

/// Build the shared column list of a result set.
pub(crate) fn columns_from(definitions: &[ColumnDefinition]) -> Arc<[Column]> {
    definitions
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, def)| Column::new(i, def))
        .collect()
}

/// Something that selects a column: an index or a column name.
pub trait ColumnIndex: std::fmt::Debug {
    /// Resolve to an index into `columns`.
    fn index_of(&self, columns: &[Column]) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn index_of(&self, columns: &[Column]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }
}

impl ColumnIndex for &str {
    fn index_of(&self, columns: &[Column]) -> Option<usize> {
        columns
            .iter()
            .position(|c| c.name() == *self)
            .or_else(|| columns.iter().position(|c| c.name().eq_ignore_ascii_case(self)))
    }
}

impl ColumnIndex for String {
    fn index_of(&self, columns: &[Column]) -> Option<usize> {
        self.as_str().index_of(columns)
    }
}

/// A row from a query result.
#[derive(Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from decoded values.
    #[must_use]
    pub fn new(columns: Arc<[Column]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Get a typed value by index or column name.
    ///
    /// ```rust,ignore
    /// let id: i64 = row.get(0)?;
    /// let name: Option<String> = row.get("name")?;
    /// ```
    pub fn get<T: FromSql>(&self, index: impl ColumnIndex) -> Result<T, TypeError> {
        let value = self.value(&index).ok_or_else(|| TypeError::TypeMismatch {
            expected: "existing column",
            actual: format!("{index:?}"),
        })?;
        T::from_sql(value)
    }

    /// Get a typed value, returning `None` on a missing column, NULL or
    /// conversion failure.
    pub fn try_get<T: FromSql>(&self, index: impl ColumnIndex) -> Option<T> {
        self.value(&index).and_then(|v| T::from_sql(v).ok())
    }

    /// Raw value by index or column name.
    pub fn value(&self, index: &impl ColumnIndex) -> Option<&SqlValue> {
        index
            .index_of(&self.columns)
            .and_then(|i| self.values.get(i))
    }

    /// Check whether a column is NULL. Missing columns count as NULL.
    pub fn is_null(&self, index: impl ColumnIndex) -> bool {
        self.value(&index).is_none_or(SqlValue::is_null)
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Take the values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Column, &SqlValue)> {
        self.columns.iter().zip(&self.values)
    }
}

impl std::ops::Index<usize> for Row {
    type Output = SqlValue;

    fn index(&self, index: usize) -> &SqlValue {
        &self.values[index]
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (column, value) in self.iter() {
            map.entry(&column.name(), value);
        }
        map.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row() -> Row {
        let columns = columns_from(&[
            ColumnDefinition::new("id", ColumnType::LongLong),
            ColumnDefinition::new("Name", ColumnType::VarString),
            ColumnDefinition::new("note", ColumnType::VarString),
        ]);
        Row::new(
            columns,
            vec![
                SqlValue::Int(7),
                SqlValue::String("ada".into()),
                SqlValue::Null,
            ],
        )
    }

    #[test]
    fn test_get_by_index_and_name() {
        let row = row();
        assert_eq!(row.get::<i64>(0).unwrap(), 7);
        assert_eq!(row.get::<String>("Name").unwrap(), "ada");
        assert_eq!(row.get::<String>("name").unwrap(), "ada");
        assert_eq!(row.get::<Option<String>>("note").unwrap(), None);
        assert_eq!(row.columns()[1].index(), 1);
    }

    #[test]
    fn test_get_errors() {
        let row = row();
        assert!(matches!(
            row.get::<String>("note"),
            Err(TypeError::UnexpectedNull)
        ));
        assert!(row.get::<i64>(9).is_err());
        assert!(row.get::<i64>("missing").is_err());
        assert_eq!(row.try_get::<i64>("missing"), None);
    }

    #[test]
    fn test_null_checks() {
        let row = row();
        assert!(row.is_null("note"));
        assert!(row.is_null(10));
        assert!(!row.is_null(0));
        assert_eq!(row[0], SqlValue::Int(7));
    }

    #[test]
    fn test_debug_shows_names() {
        let debug = format!("{:?}", row());
        assert!(debug.contains("\"id\""));
        assert!(debug.contains("ada"));
    }
}
