//! Result-set model (component A): in-memory column schema + row matrix,
//! size estimation, and null semantics.
//!
//! A [`ResultSet`] is built once by draining a live reader
//! ([`crate::driver::RowReader`]) and is immutable afterwards, which is
//! what lets it be shared lock-free between the store and any number of
//! in-flight [`crate::reader::CachedRowReader`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The whitelisted scalar element types the codec will ever (de)serialize.
///
/// This whitelist is the security boundary described in the
/// specification: deserialization must reject anything not in this set,
/// so an attacker able to influence L2 cache bytes cannot make the core
/// materialize an arbitrary type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Decimal,
    String,
    Char,
    ByteArray,
    Guid,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    TimeSpan,
}

impl ScalarType {
    /// The canonical wire identifier used by the codec (§6.4).
    pub fn canonical_name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "int8",
            ScalarType::UInt8 => "uint8",
            ScalarType::Int16 => "int16",
            ScalarType::UInt16 => "uint16",
            ScalarType::Int32 => "int32",
            ScalarType::UInt32 => "uint32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
            ScalarType::Decimal => "decimal",
            ScalarType::String => "string",
            ScalarType::Char => "char",
            ScalarType::ByteArray => "byte-array",
            ScalarType::Guid => "guid",
            ScalarType::Date => "date",
            ScalarType::Time => "time",
            ScalarType::DateTime => "date-time",
            ScalarType::DateTimeOffset => "date-time-with-offset",
            ScalarType::TimeSpan => "time-span",
        }
    }

    /// Parse a wire identifier back into a type, rejecting anything not
    /// in the whitelist. Used by the codec's security check.
    pub fn from_canonical_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => ScalarType::Bool,
            "int8" => ScalarType::Int8,
            "uint8" => ScalarType::UInt8,
            "int16" => ScalarType::Int16,
            "uint16" => ScalarType::UInt16,
            "int32" => ScalarType::Int32,
            "uint32" => ScalarType::UInt32,
            "int64" => ScalarType::Int64,
            "uint64" => ScalarType::UInt64,
            "float32" => ScalarType::Float32,
            "float64" => ScalarType::Float64,
            "decimal" => ScalarType::Decimal,
            "string" => ScalarType::String,
            "char" => ScalarType::Char,
            "byte-array" => ScalarType::ByteArray,
            "guid" => ScalarType::Guid,
            "date" => ScalarType::Date,
            "time" => ScalarType::Time,
            "date-time" => ScalarType::DateTime,
            "date-time-with-offset" => ScalarType::DateTimeOffset,
            "time-span" => ScalarType::TimeSpan,
            _ => return None,
        })
    }

    /// Per-cell byte estimate table from the specification's capture
    /// sizing rules. `len` is only consulted for `String`/`ByteArray`.
    fn base_estimate(self, len: usize) -> u64 {
        match self {
            ScalarType::Bool => 1,
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Float64 => 8,
            ScalarType::Date | ScalarType::Time | ScalarType::DateTime => 12,
            ScalarType::DateTimeOffset | ScalarType::Guid => 16,
            ScalarType::TimeSpan => 8,
            ScalarType::Decimal => 16,
            ScalarType::String => 2 * len as u64 + 40,
            ScalarType::ByteArray => len as u64 + 24,
            ScalarType::Char => 2,
        }
    }
}

/// A single scalar value stored in a row. `None` at the [`Row`] level
/// represents the language-neutral absent-value marker (spec.md §4.A);
/// there is no separate "DB null" sentinel inside a stored cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Decimal(rust_decimal::Decimal),
    String(String),
    Char(char),
    ByteArray(Vec<u8>),
    Guid(uuid::Uuid),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
    DateTimeOffset(DateTime<chrono::FixedOffset>),
    TimeSpan(chrono::Duration),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::Bool(_) => ScalarType::Bool,
            ScalarValue::Int8(_) => ScalarType::Int8,
            ScalarValue::UInt8(_) => ScalarType::UInt8,
            ScalarValue::Int16(_) => ScalarType::Int16,
            ScalarValue::UInt16(_) => ScalarType::UInt16,
            ScalarValue::Int32(_) => ScalarType::Int32,
            ScalarValue::UInt32(_) => ScalarType::UInt32,
            ScalarValue::Int64(_) => ScalarType::Int64,
            ScalarValue::UInt64(_) => ScalarType::UInt64,
            ScalarValue::Float32(_) => ScalarType::Float32,
            ScalarValue::Float64(_) => ScalarType::Float64,
            ScalarValue::Decimal(_) => ScalarType::Decimal,
            ScalarValue::String(_) => ScalarType::String,
            ScalarValue::Char(_) => ScalarType::Char,
            ScalarValue::ByteArray(_) => ScalarType::ByteArray,
            ScalarValue::Guid(_) => ScalarType::Guid,
            ScalarValue::Date(_) => ScalarType::Date,
            ScalarValue::Time(_) => ScalarType::Time,
            ScalarValue::DateTime(_) => ScalarType::DateTime,
            ScalarValue::DateTimeOffset(_) => ScalarType::DateTimeOffset,
            ScalarValue::TimeSpan(_) => ScalarType::TimeSpan,
        }
    }

    /// Byte estimate for this cell per the specification's table.
    fn approx_size(&self) -> u64 {
        let len = match self {
            ScalarValue::String(s) => s.len(),
            ScalarValue::ByteArray(b) => b.len(),
            _ => 0,
        };
        self.scalar_type().base_estimate(len)
    }

    /// Invariant-culture textual rendering used by the key generator's
    /// canonicalization rule (spec.md §4.D).
    pub fn to_invariant_string(&self) -> String {
        match self {
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Int8(v) => v.to_string(),
            ScalarValue::UInt8(v) => v.to_string(),
            ScalarValue::Int16(v) => v.to_string(),
            ScalarValue::UInt16(v) => v.to_string(),
            ScalarValue::Int32(v) => v.to_string(),
            ScalarValue::UInt32(v) => v.to_string(),
            ScalarValue::Int64(v) => v.to_string(),
            ScalarValue::UInt64(v) => v.to_string(),
            ScalarValue::Float32(v) => v.to_string(),
            ScalarValue::Float64(v) => v.to_string(),
            ScalarValue::Decimal(v) => v.to_string(),
            ScalarValue::String(v) => v.clone(),
            ScalarValue::Char(v) => v.to_string(),
            ScalarValue::ByteArray(v) => hex::encode(v),
            ScalarValue::Guid(v) => v.to_string(),
            ScalarValue::Date(v) => v.to_string(),
            ScalarValue::Time(v) => v.to_string(),
            ScalarValue::DateTime(v) => v.to_string(),
            ScalarValue::DateTimeOffset(v) => v.to_rfc3339(),
            ScalarValue::TimeSpan(v) => v.num_milliseconds().to_string(),
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_invariant_string() == other.to_invariant_string()
            && self.scalar_type() == other.scalar_type()
    }
}

/// A single nullable cell: `None` is the absent-value marker.
pub type Cell = Option<ScalarValue>;

/// A fixed-length row whose length equals the owning [`ResultSet`]'s
/// schema length.
pub type Row = Vec<Cell>;

/// Ordered column metadata: `(name, ordinal, driver-type-name, value-type,
/// nullable-allowed)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub ordinal: usize,
    pub driver_type_name: String,
    pub value_type: ScalarType,
    pub nullable: bool,
}

/// A lowercased table-name dependency tag. Comparison is case-insensitive
/// by construction: the constructor always lowercases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Tag(String);

impl Tag {
    pub fn new(name: impl AsRef<str>) -> Self {
        Tag(name.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Tag::new(s)
    }
}

/// Marker returned by [`crate::model::ResultSet::capture`] when the row
/// limit is exceeded during capture. Carries the rows already drained so
/// callers can choose to replay them (see spec.md §9 Open Question).
pub struct TooLarge {
    pub schema: Vec<ColumnSchema>,
    pub rows_drained: Vec<Row>,
    pub records_affected: i32,
}

/// `(schema, rows[], approx-byte-size, captured-at-wallclock,
/// records-affected)`.
///
/// Invariant: every row length equals `schema.len()`; every non-null
/// element's runtime type is in the whitelist (enforced by construction,
/// since [`ScalarValue`] only has whitelisted variants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    pub schema: Vec<ColumnSchema>,
    pub rows: Vec<Row>,
    pub approx_byte_size: u64,
    pub captured_at: DateTime<Utc>,
    pub records_affected: i32,
}

impl ResultSet {
    /// Build a result set from already-known parts, recomputing the size
    /// estimate. Used by the codec on successful deserialization and by
    /// tests constructing fixtures directly.
    pub fn new(
        schema: Vec<ColumnSchema>,
        rows: Vec<Row>,
        records_affected: i32,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let approx_byte_size = estimate_size(&schema, &rows);
        Self {
            schema,
            rows,
            approx_byte_size,
            captured_at,
            records_affected,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.schema
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.ordinal)
    }
}

impl PartialEq for ResultSet {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(other.rows.iter())
                .all(|(a, b)| a == b)
            && self.records_affected == other.records_affected
    }
}

/// Per-column schema overhead plus per-row overhead (one reference + one
/// reference per cell) plus the per-cell byte estimate table, exactly as
/// specified in spec.md §4.A. Not authoritative for memory accounting —
/// only compared against admission limits.
fn estimate_size(schema: &[ColumnSchema], rows: &[Row]) -> u64 {
    const SCHEMA_COLUMN_OVERHEAD: u64 = 64;
    const ROW_OVERHEAD: u64 = 8;
    const CELL_REFERENCE_OVERHEAD: u64 = 8;

    let mut size = schema.len() as u64 * SCHEMA_COLUMN_OVERHEAD;

    for row in rows {
        size += ROW_OVERHEAD;
        for cell in row {
            size += CELL_REFERENCE_OVERHEAD;
            size += match cell {
                None => 0,
                Some(v) => v.approx_size(),
            };
        }
    }

    size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(names: &[&str]) -> Vec<ColumnSchema> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ColumnSchema {
                name: n.to_string(),
                ordinal: i,
                driver_type_name: "INT".to_string(),
                value_type: ScalarType::Int32,
                nullable: true,
            })
            .collect()
    }

    #[test]
    fn scalar_type_roundtrips_canonical_name() {
        for ty in [
            ScalarType::Bool,
            ScalarType::Int8,
            ScalarType::UInt8,
            ScalarType::Int16,
            ScalarType::UInt16,
            ScalarType::Int32,
            ScalarType::UInt32,
            ScalarType::Int64,
            ScalarType::UInt64,
            ScalarType::Float32,
            ScalarType::Float64,
            ScalarType::Decimal,
            ScalarType::String,
            ScalarType::Char,
            ScalarType::ByteArray,
            ScalarType::Guid,
            ScalarType::Date,
            ScalarType::Time,
            ScalarType::DateTime,
            ScalarType::DateTimeOffset,
            ScalarType::TimeSpan,
        ] {
            let name = ty.canonical_name();
            assert_eq!(ScalarType::from_canonical_name(name), Some(ty));
        }
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        assert_eq!(ScalarType::from_canonical_name("object"), None);
        assert_eq!(ScalarType::from_canonical_name(""), None);
    }

    #[test]
    fn tag_is_case_insensitive_by_construction() {
        assert_eq!(Tag::new("Orders"), Tag::new("orders"));
        assert_eq!(Tag::new("ORDERS").as_str(), "orders");
    }

    #[test]
    fn empty_result_set_has_zero_rows_but_is_valid() {
        let rs = ResultSet::new(schema(&["id"]), vec![], -1, Utc::now());
        assert!(rs.is_empty());
        assert_eq!(rs.row_count(), 0);
    }

    #[test]
    fn null_cell_is_none_not_a_sentinel_value() {
        let rs = ResultSet::new(schema(&["id"]), vec![vec![None]], 1, Utc::now());
        assert!(rs.rows[0][0].is_none());
    }

    #[test]
    fn size_estimate_grows_with_string_length() {
        let short = ResultSet::new(
            schema(&["s"]),
            vec![vec![Some(ScalarValue::String("a".into()))]],
            -1,
            Utc::now(),
        );
        let long = ResultSet::new(
            schema(&["s"]),
            vec![vec![Some(ScalarValue::String("a".repeat(100)))]],
            -1,
            Utc::now(),
        );
        assert!(long.approx_byte_size > short.approx_byte_size);
    }
}
