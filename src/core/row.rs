//! Result rows and typed column access
//!
//! A [`DatabaseRow`] is an owned copy of one row. It stays readable after the
//! cursor that produced it has moved on; all rows of one batch share a single
//! [`RowSchema`].

use super::config::ColumnMatching;
use super::decode::{DateTimeKind, DbEnum, FromDatabaseValue, Timestamp};
use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;
use chrono::{NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Ordered column names of one result batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSchema {
    names: Vec<String>,
    matching: ColumnMatching,
}

impl RowSchema {
    /// Create a schema from column names in result order
    pub fn new(names: Vec<String>, matching: ColumnMatching) -> Self {
        Self { names, matching }
    }

    /// Column names in result order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of `column`, or `None` when the batch has no such column.
    ///
    /// An exact match always wins; case-insensitive matching only applies when
    /// no column matches exactly.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|name| name == column)
            .or_else(|| match self.matching {
                ColumnMatching::CaseInsensitive => self
                    .names
                    .iter()
                    .position(|name| name.eq_ignore_ascii_case(column)),
                ColumnMatching::CaseSensitive => None,
            })
    }
}

/// A single row of a result batch
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseRow {
    schema: Arc<RowSchema>,
    values: Vec<DatabaseValue>,
}

impl DatabaseRow {
    /// Create a row; `values` must be in schema order
    pub fn new(schema: Arc<RowSchema>, values: Vec<DatabaseValue>) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        Self { schema, values }
    }

    /// Build a standalone row from `(column, value)` pairs
    pub fn from_pairs<I, S>(pairs: I, matching: ColumnMatching) -> Self
    where
        I: IntoIterator<Item = (S, DatabaseValue)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<DatabaseValue>) = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .unzip();
        Self::new(Arc::new(RowSchema::new(names, matching)), values)
    }

    /// Column names in result order
    pub fn columns(&self) -> &[String] {
        self.schema.names()
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    /// Raw value of `column`
    pub fn value(&self, column: &str) -> Result<&DatabaseValue> {
        self.schema
            .index_of(column)
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| DatabaseError::ColumnNotFound(column.to_string()))
    }

    /// Raw value at a zero-based position
    pub fn get_by_index(&self, index: usize) -> Option<&DatabaseValue> {
        self.values.get(index)
    }

    /// Whether `column` holds NULL
    pub fn is_null(&self, column: &str) -> Result<bool> {
        Ok(self.value(column)?.is_null())
    }

    /// Decode `column`, failing on NULL
    pub fn get<T: FromDatabaseValue>(&self, column: &str) -> Result<T> {
        self.get_or_null(column)?
            .ok_or_else(|| DatabaseError::null_value(column))
    }

    /// Decode `column`, mapping NULL to `None`
    pub fn get_or_null<T: FromDatabaseValue>(&self, column: &str) -> Result<Option<T>> {
        let value = self.value(column)?;
        if value.is_null() {
            return Ok(None);
        }
        T::from_database_value(value)
            .map(Some)
            .ok_or_else(|| DatabaseError::type_conversion(column, T::TYPE_NAME, describe(value)))
    }

    pub fn get_string(&self, column: &str) -> Result<String> {
        self.get(column)
    }

    pub fn get_string_or_null(&self, column: &str) -> Result<Option<String>> {
        self.get_or_null(column)
    }

    pub fn get_i32(&self, column: &str) -> Result<i32> {
        self.get(column)
    }

    pub fn get_i32_or_null(&self, column: &str) -> Result<Option<i32>> {
        self.get_or_null(column)
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        self.get(column)
    }

    pub fn get_i64_or_null(&self, column: &str) -> Result<Option<i64>> {
        self.get_or_null(column)
    }

    pub fn get_f64(&self, column: &str) -> Result<f64> {
        self.get(column)
    }

    pub fn get_f64_or_null(&self, column: &str) -> Result<Option<f64>> {
        self.get_or_null(column)
    }

    pub fn get_decimal(&self, column: &str) -> Result<Decimal> {
        self.get(column)
    }

    pub fn get_decimal_or_null(&self, column: &str) -> Result<Option<Decimal>> {
        self.get_or_null(column)
    }

    pub fn get_bool(&self, column: &str) -> Result<bool> {
        self.get(column)
    }

    pub fn get_bool_or_null(&self, column: &str) -> Result<Option<bool>> {
        self.get_or_null(column)
    }

    /// Decode a timestamp and label it with `kind`
    pub fn get_timestamp(&self, column: &str, kind: DateTimeKind) -> Result<Timestamp> {
        self.get::<NaiveDateTime>(column)
            .map(|value| Timestamp::new(value, kind))
    }

    pub fn get_timestamp_or_null(
        &self,
        column: &str,
        kind: DateTimeKind,
    ) -> Result<Option<Timestamp>> {
        Ok(self
            .get_or_null::<NaiveDateTime>(column)?
            .map(|value| Timestamp::new(value, kind)))
    }

    pub fn get_duration(&self, column: &str) -> Result<TimeDelta> {
        self.get(column)
    }

    pub fn get_duration_or_null(&self, column: &str) -> Result<Option<TimeDelta>> {
        self.get_or_null(column)
    }

    pub fn get_uuid(&self, column: &str) -> Result<Uuid> {
        self.get(column)
    }

    pub fn get_uuid_or_null(&self, column: &str) -> Result<Option<Uuid>> {
        self.get_or_null(column)
    }

    pub fn get_bytes(&self, column: &str) -> Result<Vec<u8>> {
        self.get(column)
    }

    pub fn get_bytes_or_null(&self, column: &str) -> Result<Option<Vec<u8>>> {
        self.get_or_null(column)
    }

    /// Decode an enum case by exact name (text) or discriminant (integer)
    pub fn get_enum<E: DbEnum>(&self, column: &str) -> Result<E> {
        self.get_enum_or_null(column)?
            .ok_or_else(|| DatabaseError::null_value(column))
    }

    /// Like [`get_enum`](Self::get_enum), returning `default` for NULL
    pub fn get_enum_or_default<E: DbEnum>(&self, column: &str, default: E) -> Result<E> {
        Ok(self.get_enum_or_null(column)?.unwrap_or(default))
    }

    /// Like [`get_enum`](Self::get_enum), returning `None` for NULL
    pub fn get_enum_or_null<E: DbEnum>(&self, column: &str) -> Result<Option<E>> {
        let value = self.value(column)?;
        let decoded = match value {
            DatabaseValue::Null => return Ok(None),
            DatabaseValue::String(name) => E::from_name(name),
            DatabaseValue::Int(_) | DatabaseValue::Long(_) => {
                value.as_integer().and_then(E::from_ordinal)
            }
            other => {
                return Err(DatabaseError::type_conversion(
                    column,
                    E::TYPE_NAME,
                    describe(other),
                ))
            }
        };
        decoded
            .map(Some)
            .ok_or_else(|| DatabaseError::invalid_enum(column, E::TYPE_NAME, value.to_sql_literal()))
    }
}

fn describe(value: &DatabaseValue) -> String {
    match value {
        DatabaseValue::Bytes(b) => format!("bytes ({} bytes)", b.len()),
        other => format!("{} {}", other.type_name(), other.to_sql_literal()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Status {
        Unknown,
        Active,
    }

    crate::db_enum!(Status { Unknown, Active });

    fn row(pairs: Vec<(&str, DatabaseValue)>) -> DatabaseRow {
        DatabaseRow::from_pairs(pairs, ColumnMatching::CaseInsensitive)
    }

    #[test]
    fn test_null_decimal() {
        let row = row(vec![("Amount", DatabaseValue::Null)]);

        assert!(matches!(
            row.get_decimal("Amount"),
            Err(DatabaseError::NullValue { .. })
        ));
        assert_eq!(row.get_decimal_or_null("Amount").unwrap(), None);
        assert!(row.is_null("Amount").unwrap());
    }

    #[test]
    fn test_conversion_failure_is_not_null_failure() {
        let row = row(vec![("Name", DatabaseValue::from("Alice"))]);

        assert!(matches!(
            row.get_i32("Name"),
            Err(DatabaseError::TypeConversion { expected: "i32", .. })
        ));
        assert!(matches!(
            row.get_i32_or_null("Name"),
            Err(DatabaseError::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_column_order_and_lookup() {
        let row = row(vec![
            ("id", DatabaseValue::Long(1)),
            ("Name", DatabaseValue::from("Alice")),
            ("name", DatabaseValue::from("exact")),
        ]);

        assert_eq!(row.columns(), ["id", "Name", "name"]);
        assert_eq!(row.get_string("name").unwrap(), "exact");
        assert_eq!(row.get_string("Name").unwrap(), "Alice");
        assert_eq!(row.get_i64("ID").unwrap(), 1);
        assert_eq!(row.get_by_index(1), Some(&DatabaseValue::from("Alice")));
    }

    #[test]
    fn test_case_sensitive_matching() {
        let row = DatabaseRow::from_pairs(
            vec![("Id", DatabaseValue::Long(1))],
            ColumnMatching::CaseSensitive,
        );

        assert_eq!(row.get_i64("Id").unwrap(), 1);
        assert!(matches!(
            row.get_i64("id"),
            Err(DatabaseError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_missing_column() {
        let row = row(vec![("id", DatabaseValue::Null)]);

        assert!(matches!(
            row.get_string("missing"),
            Err(DatabaseError::ColumnNotFound(_))
        ));
        assert!(matches!(
            row.get_string_or_null("missing"),
            Err(DatabaseError::ColumnNotFound(_))
        ));
        assert!(matches!(
            row.is_null("missing"),
            Err(DatabaseError::ColumnNotFound(_))
        ));
        assert!(matches!(
            row.get_enum_or_null::<Status>("missing"),
            Err(DatabaseError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_enum_decoding() {
        let active = row(vec![("Status", DatabaseValue::from("Active"))]);
        assert_eq!(active.get_enum::<Status>("Status").unwrap(), Status::Active);

        let bogus = row(vec![("Status", DatabaseValue::from("Bogus"))]);
        assert!(matches!(
            bogus.get_enum::<Status>("Status"),
            Err(DatabaseError::InvalidEnumValue { enum_name: "Status", .. })
        ));
        assert!(matches!(
            bogus.get_enum_or_null::<Status>("Status"),
            Err(DatabaseError::InvalidEnumValue { .. })
        ));

        let null = row(vec![("Status", DatabaseValue::Null)]);
        assert_eq!(
            null.get_enum_or_default("Status", Status::Unknown).unwrap(),
            Status::Unknown
        );
        assert_eq!(null.get_enum_or_null::<Status>("Status").unwrap(), None);
        assert!(matches!(
            null.get_enum::<Status>("Status"),
            Err(DatabaseError::NullValue { .. })
        ));

        let ordinal = row(vec![("Status", DatabaseValue::Long(1))]);
        assert_eq!(ordinal.get_enum::<Status>("Status").unwrap(), Status::Active);
    }

    #[test]
    fn test_timestamp_kind_label() {
        let row = row(vec![("At", DatabaseValue::from("2024-05-06 07:08:09"))]);

        let utc = row.get_timestamp("At", DateTimeKind::Utc).unwrap();
        let local = row.get_timestamp("At", DateTimeKind::Local).unwrap();
        assert_eq!(utc.naive(), local.naive());
        assert_eq!(utc.kind(), DateTimeKind::Utc);
        assert_eq!(local.kind(), DateTimeKind::Local);
    }
}
