//! Result-set codec (component B): serialize/deserialize a [`ResultSet`]
//! to a self-describing structured byte document, enforcing the
//! element-type whitelist on the way back in (spec.md §4.B, §6.4).
//!
//! The wire document is a `serde`-driven structure (the teacher already
//! depends on `serde`/`serde_json`; we piggyback on that rather than
//! introducing a second serialization stack) with element types stored by
//! their canonical identifier string so the whitelist check happens
//! explicitly rather than being implied by Rust's own enum decoding.

use crate::model::{ColumnSchema, ResultSet, Row, ScalarType, ScalarValue};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct WireColumn {
    name: String,
    ordinal: usize,
    driver_type_name: String,
    element_type: String,
    nullable: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
enum WireCell {
    Null,
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
    Decimal(String),
    String(String),
    Char(char),
    ByteArray(Vec<u8>),
    Guid(String),
    Date(String),
    Time(String),
    DateTime(String),
    DateTimeOffset(String),
    TimeSpan(i64),
    /// Any element type name outside the whitelist. Only ever produced if
    /// a malicious/corrupt payload smuggled an unknown tag in; decoding it
    /// is what triggers the `Corrupt` outcome.
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize)]
struct WireDocument {
    columns: Vec<WireColumn>,
    rows: Vec<Vec<WireCell>>,
    records_affected: i32,
    approx_byte_size: u64,
    captured_at: chrono::DateTime<chrono::Utc>,
}

fn cell_to_wire(cell: &Option<ScalarValue>) -> WireCell {
    match cell {
        None => WireCell::Null,
        Some(ScalarValue::Bool(v)) => WireCell::Bool(*v),
        Some(ScalarValue::Int8(v)) => WireCell::Int8(*v),
        Some(ScalarValue::UInt8(v)) => WireCell::UInt8(*v),
        Some(ScalarValue::Int16(v)) => WireCell::Int16(*v),
        Some(ScalarValue::UInt16(v)) => WireCell::UInt16(*v),
        Some(ScalarValue::Int32(v)) => WireCell::Int32(*v),
        Some(ScalarValue::UInt32(v)) => WireCell::UInt32(*v),
        Some(ScalarValue::Int64(v)) => WireCell::Int64(*v),
        Some(ScalarValue::UInt64(v)) => WireCell::UInt64(*v),
        Some(ScalarValue::Float32(v)) => WireCell::Float32(*v),
        Some(ScalarValue::Float64(v)) => WireCell::Float64(*v),
        Some(ScalarValue::Decimal(v)) => WireCell::Decimal(v.to_string()),
        Some(ScalarValue::String(v)) => WireCell::String(v.clone()),
        Some(ScalarValue::Char(v)) => WireCell::Char(*v),
        Some(ScalarValue::ByteArray(v)) => WireCell::ByteArray(v.clone()),
        Some(ScalarValue::Guid(v)) => WireCell::Guid(v.to_string()),
        Some(ScalarValue::Date(v)) => WireCell::Date(v.to_string()),
        Some(ScalarValue::Time(v)) => WireCell::Time(v.to_string()),
        Some(ScalarValue::DateTime(v)) => WireCell::DateTime(v.to_string()),
        Some(ScalarValue::DateTimeOffset(v)) => WireCell::DateTimeOffset(v.to_rfc3339()),
        Some(ScalarValue::TimeSpan(v)) => WireCell::TimeSpan(v.num_milliseconds()),
    }
}

/// Decode a wire cell back to a scalar, failing closed (`None` => treat
/// the whole document as corrupt) on any malformed or out-of-range value.
fn wire_to_cell(cell: WireCell) -> Option<Option<ScalarValue>> {
    Some(match cell {
        WireCell::Null => None,
        WireCell::Bool(v) => Some(ScalarValue::Bool(v)),
        WireCell::Int8(v) => Some(ScalarValue::Int8(v)),
        WireCell::UInt8(v) => Some(ScalarValue::UInt8(v)),
        WireCell::Int16(v) => Some(ScalarValue::Int16(v)),
        WireCell::UInt16(v) => Some(ScalarValue::UInt16(v)),
        WireCell::Int32(v) => Some(ScalarValue::Int32(v)),
        WireCell::UInt32(v) => Some(ScalarValue::UInt32(v)),
        WireCell::Int64(v) => Some(ScalarValue::Int64(v)),
        WireCell::UInt64(v) => Some(ScalarValue::UInt64(v)),
        WireCell::Float32(v) => Some(ScalarValue::Float32(v)),
        WireCell::Float64(v) => Some(ScalarValue::Float64(v)),
        WireCell::Decimal(s) => Some(ScalarValue::Decimal(s.parse().ok()?)),
        WireCell::String(v) => Some(ScalarValue::String(v)),
        WireCell::Char(v) => Some(ScalarValue::Char(v)),
        WireCell::ByteArray(v) => Some(ScalarValue::ByteArray(v)),
        WireCell::Guid(s) => Some(ScalarValue::Guid(s.parse().ok()?)),
        WireCell::Date(s) => Some(ScalarValue::Date(s.parse().ok()?)),
        WireCell::Time(s) => Some(ScalarValue::Time(s.parse().ok()?)),
        WireCell::DateTime(s) => Some(ScalarValue::DateTime(s.parse().ok()?)),
        WireCell::DateTimeOffset(s) => Some(ScalarValue::DateTimeOffset(
            chrono::DateTime::parse_from_rfc3339(&s).ok()?,
        )),
        WireCell::TimeSpan(ms) => Some(ScalarValue::TimeSpan(chrono::Duration::milliseconds(ms))),
        WireCell::Unknown => return None,
    })
}

/// Serialize a result set to bytes. Serialization errors for whitelisted
/// element types must not happen (spec.md §7); if `serde_json` somehow
/// fails here, we let it escape rather than silently drop data.
pub fn serialize(result: &ResultSet) -> Vec<u8> {
    let doc = WireDocument {
        columns: result
            .schema
            .iter()
            .map(|c| WireColumn {
                name: c.name.clone(),
                ordinal: c.ordinal,
                driver_type_name: c.driver_type_name.clone(),
                element_type: c.value_type.canonical_name().to_string(),
                nullable: c.nullable,
            })
            .collect(),
        rows: result
            .rows
            .iter()
            .map(|row| row.iter().map(cell_to_wire).collect())
            .collect(),
        records_affected: result.records_affected,
        approx_byte_size: result.approx_byte_size,
        captured_at: result.captured_at,
    };
    serde_json::to_vec(&doc).expect("whitelisted element types always serialize")
}

/// Deserialize bytes back into a result set. Never panics or throws to
/// its caller: any unrecognized element-type name, out-of-range value,
/// truncated input, or malformed document yields `None`, which the
/// caller treats as a cache miss (spec.md §4.B, §7).
pub fn deserialize(bytes: &[u8]) -> Option<ResultSet> {
    let doc: WireDocument = serde_json::from_slice(bytes).ok()?;

    let mut schema = Vec::with_capacity(doc.columns.len());
    for col in doc.columns {
        let value_type = ScalarType::from_canonical_name(&col.element_type)?;
        schema.push(ColumnSchema {
            name: col.name,
            ordinal: col.ordinal,
            driver_type_name: col.driver_type_name,
            value_type,
            nullable: col.nullable,
        });
    }

    let mut rows: Vec<Row> = Vec::with_capacity(doc.rows.len());
    for wire_row in doc.rows {
        let mut row = Vec::with_capacity(wire_row.len());
        for cell in wire_row {
            row.push(wire_to_cell(cell)?);
        }
        rows.push(row);
    }

    Some(ResultSet {
        schema,
        rows,
        approx_byte_size: doc.approx_byte_size,
        captured_at: doc.captured_at,
        records_affected: doc.records_affected,
    })
}
