//! Driver-side contract (§6.1): what the core consumes from the SQL
//! driver the ORM sits on top of. This module is a trait boundary only —
//! no concrete driver is implemented here, consistent with "the SQL
//! driver" being named an out-of-scope external collaborator.

use crate::error::Result;
use crate::model::ScalarValue;

/// A single named, typed command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Option<ScalarValue>,
    pub declared_type: String,
}

/// An opaque parameterized command: SQL text plus an ordered parameter
/// list. Both "reader" and "scalar" commands are represented uniformly;
/// the interceptor decides how to treat the result.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub text: String,
    pub parameters: Vec<Parameter>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }
}

/// Richer per-column metadata a driver may optionally expose in addition
/// to `field_count`/`get_name`/`get_data_type_name` (spec.md §4.A: "reads
/// the full column schema first (preferring a rich schema API; falling
/// back to field-count+type)").
#[derive(Debug, Clone)]
pub struct DriverColumn {
    pub name: String,
    pub data_type_name: String,
    pub nullable: bool,
}

/// The synchronous row-reader contract the core consumes from the driver.
///
/// Implementations wrap whatever live cursor the ORM's driver exposes.
/// `close` must be idempotent; the capture routine in
/// [`crate::model::ResultSet`] calls it on every exit path.
pub trait RowReader {
    fn read(&mut self) -> Result<bool>;
    fn field_count(&self) -> usize;
    fn get_name(&self, ordinal: usize) -> String;
    fn get_data_type_name(&self, ordinal: usize) -> String;
    fn is_null(&self, ordinal: usize) -> bool;
    fn get_value(&self, ordinal: usize) -> Option<ScalarValue>;
    /// Richer per-column metadata, when the driver exposes it.
    fn column_schema(&self) -> Option<Vec<DriverColumn>> {
        None
    }
    fn records_affected(&self) -> i32 {
        -1
    }
    fn close(&mut self);
}

/// The asynchronous counterpart of [`RowReader`]. A blanket adapter is
/// intentionally not provided: async readers suspend at I/O points
/// (spec.md §5), which a sync-to-async shim cannot honor correctly.
#[async_trait::async_trait]
pub trait AsyncRowReader: Send {
    async fn read(&mut self) -> Result<bool>;
    fn field_count(&self) -> usize;
    fn get_name(&self, ordinal: usize) -> String;
    fn get_data_type_name(&self, ordinal: usize) -> String;
    fn is_null(&self, ordinal: usize) -> bool;
    fn get_value(&self, ordinal: usize) -> Option<ScalarValue>;
    fn column_schema(&self) -> Option<Vec<DriverColumn>> {
        None
    }
    fn records_affected(&self) -> i32 {
        -1
    }
    async fn close(&mut self);
}
