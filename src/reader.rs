//! Cached row reader (component C): replays an immutable [`ResultSet`]
//! back through the same forward-only streaming contract
//! [`crate::driver::RowReader`] exposes, so the ORM cannot tell a cache
//! hit from a live query.

use crate::driver::RowReader;
use crate::error::{Result, StashError};
use crate::model::{ResultSet, ScalarValue};
use std::sync::Arc;

/// A forward-only reader over a shared, immutable result set. Each
/// instance owns its own cursor starting at -1, so any number of readers
/// over the same `Arc<ResultSet>` iterate independently and lock-free —
/// the result set never mutates after capture.
pub struct CachedRowReader {
    result: Arc<ResultSet>,
    cursor: isize,
    closed: bool,
}

impl CachedRowReader {
    pub fn new(result: Arc<ResultSet>) -> Self {
        Self {
            result,
            cursor: -1,
            closed: false,
        }
    }

    pub fn has_rows(&self) -> bool {
        !self.result.rows.is_empty()
    }

    pub fn get_ordinal(&self, name: &str) -> Option<usize> {
        self.result.ordinal_of(name)
    }

    fn current_row(&self) -> &[Option<ScalarValue>] {
        &self.result.rows[self.cursor as usize]
    }

    pub fn get_value(&self, ordinal: usize) -> Option<ScalarValue> {
        self.current_row()[ordinal].clone()
    }

    pub fn is_null(&self, ordinal: usize) -> bool {
        self.current_row()[ordinal].is_none()
    }

    pub fn get_bytes(&self, ordinal: usize) -> Result<Vec<u8>> {
        match &self.current_row()[ordinal] {
            Some(ScalarValue::ByteArray(b)) => Ok(b.clone()),
            Some(v) => Ok(v.to_invariant_string().into_bytes()),
            None => Err(StashError::InvalidInput(
                "cannot read bytes from a null cell".to_string(),
            )),
        }
    }

    pub fn get_chars(&self, ordinal: usize) -> Result<Vec<char>> {
        match &self.current_row()[ordinal] {
            Some(ScalarValue::String(s)) => Ok(s.chars().collect()),
            Some(ScalarValue::Char(c)) => Ok(vec![*c]),
            Some(v) => Ok(v.to_invariant_string().chars().collect()),
            None => Err(StashError::InvalidInput(
                "cannot read chars from a null cell".to_string(),
            )),
        }
    }

    /// Exact-typed if the stored element already has the requested
    /// numeric width; otherwise widens via a convertible numeric cast.
    /// Fails with `InvalidInput` if asked to cast a null cell.
    pub fn get_field_value_i64(&self, ordinal: usize) -> Result<i64> {
        match &self.current_row()[ordinal] {
            Some(ScalarValue::Int64(v)) => Ok(*v),
            Some(ScalarValue::Int32(v)) => Ok(*v as i64),
            Some(ScalarValue::Int16(v)) => Ok(*v as i64),
            Some(ScalarValue::Int8(v)) => Ok(*v as i64),
            Some(ScalarValue::UInt32(v)) => Ok(*v as i64),
            Some(ScalarValue::UInt16(v)) => Ok(*v as i64),
            Some(ScalarValue::UInt8(v)) => Ok(*v as i64),
            Some(other) => Err(StashError::InvalidInput(format!(
                "cannot widen {:?} to i64",
                other.scalar_type()
            ))),
            None => Err(StashError::InvalidInput(
                "cannot cast null to i64".to_string(),
            )),
        }
    }

    pub fn get_field_value_i32(&self, ordinal: usize) -> Result<i32> {
        match &self.current_row()[ordinal] {
            Some(ScalarValue::Int32(v)) => Ok(*v),
            Some(ScalarValue::Int16(v)) => Ok(*v as i32),
            Some(ScalarValue::Int8(v)) => Ok(*v as i32),
            Some(ScalarValue::UInt16(v)) => Ok(*v as i32),
            Some(ScalarValue::UInt8(v)) => Ok(*v as i32),
            Some(ScalarValue::Int64(v)) => i32::try_from(*v).map_err(|_| {
                StashError::InvalidInput("i64 value does not fit in i32".to_string())
            }),
            Some(other) => Err(StashError::InvalidInput(format!(
                "cannot widen {:?} to i32",
                other.scalar_type()
            ))),
            None => Err(StashError::InvalidInput(
                "cannot cast null to i32".to_string(),
            )),
        }
    }

    pub fn get_field_value_string(&self, ordinal: usize) -> Result<String> {
        match &self.current_row()[ordinal] {
            Some(v) => Ok(v.to_invariant_string()),
            None => Err(StashError::InvalidInput(
                "cannot cast null to String".to_string(),
            )),
        }
    }
}

impl RowReader for CachedRowReader {
    fn read(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.cursor += 1;
        Ok((self.cursor as usize) < self.result.rows.len())
    }

    fn field_count(&self) -> usize {
        self.result.column_count()
    }

    fn get_name(&self, ordinal: usize) -> String {
        self.result.schema[ordinal].name.clone()
    }

    fn get_data_type_name(&self, ordinal: usize) -> String {
        self.result.schema[ordinal].driver_type_name.clone()
    }

    fn is_null(&self, ordinal: usize) -> bool {
        CachedRowReader::is_null(self, ordinal)
    }

    fn get_value(&self, ordinal: usize) -> Option<ScalarValue> {
        CachedRowReader::get_value(self, ordinal)
    }

    fn records_affected(&self) -> i32 {
        self.result.records_affected
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// `NextResult()` is always `false`: a replayed result set never has a
/// "next" batch, by design (spec.md §4.C).
pub fn next_result() -> bool {
    false
}
