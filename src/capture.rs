//! Capture/replay glue for component A: turns a live [`RowReader`] into an
//! immutable [`ResultSet`], or a [`crate::model::TooLarge`] marker if the
//! row limit is exceeded.

use crate::driver::{AsyncRowReader, DriverColumn, RowReader};
use crate::model::{ColumnSchema, Row, ScalarType, ScalarValue};
use chrono::Utc;

/// Result of draining a reader: either a complete, cacheable result set,
/// or a marker carrying whatever rows were drained before the limit hit.
pub enum Capture {
    Complete(crate::model::ResultSet),
    TooLarge(crate::model::TooLarge),
}

fn schema_from_driver(columns: Option<Vec<DriverColumn>>, reader_field_count: usize) -> Vec<ColumnSchema> {
    match columns {
        Some(cols) => cols
            .into_iter()
            .enumerate()
            .map(|(i, c)| ColumnSchema {
                name: c.name,
                ordinal: i,
                driver_type_name: c.data_type_name,
                value_type: scalar_type_hint(),
                nullable: c.nullable,
            })
            .collect(),
        None => (0..reader_field_count)
            .map(|i| ColumnSchema {
                name: format!("col{i}"),
                ordinal: i,
                driver_type_name: "unknown".to_string(),
                value_type: scalar_type_hint(),
                nullable: true,
            })
            .collect(),
    }
}

// The driver-type-name carries the authoritative type; `value_type` on a
// freshly captured schema is refined once the first non-null value in
// each column is observed (see `refine_schema_types` below). Until then
// it is a placeholder.
fn scalar_type_hint() -> ScalarType {
    ScalarType::String
}

fn refine_schema_types(schema: &mut [ColumnSchema], rows: &[Row]) {
    for (ordinal, col) in schema.iter_mut().enumerate() {
        for row in rows {
            if let Some(Some(value)) = row.get(ordinal) {
                col.value_type = value.scalar_type();
                break;
            }
        }
    }
}

/// Drain `reader` into a result set, closing the reader on every exit
/// path. Stops after `max_rows` and returns `TooLarge` without producing
/// a partial [`crate::model::ResultSet`] (spec.md §4.A).
pub fn capture_sync(reader: &mut dyn RowReader, max_rows: usize) -> Capture {
    let driver_columns = reader.column_schema();
    let mut schema = schema_from_driver(driver_columns, reader.field_count());
    let mut rows: Vec<Row> = Vec::new();

    loop {
        match reader.read() {
            Ok(true) => {
                if rows.len() >= max_rows {
                    reader.close();
                    return Capture::TooLarge(crate::model::TooLarge {
                        schema,
                        rows_drained: rows,
                        records_affected: reader.records_affected(),
                    });
                }
                let row = (0..reader.field_count())
                    .map(|i| {
                        if reader.is_null(i) {
                            None
                        } else {
                            reader.get_value(i)
                        }
                    })
                    .collect();
                rows.push(row);
            }
            Ok(false) => break,
            Err(_) => break,
        }
    }

    let records_affected = reader.records_affected();
    reader.close();
    refine_schema_types(&mut schema, &rows);
    Capture::Complete(crate::model::ResultSet::new(
        schema,
        rows,
        records_affected,
        Utc::now(),
    ))
}

/// Asynchronous counterpart of [`capture_sync`]. Suspends at every row
/// read (spec.md §5's only async suspension point inside capture).
pub async fn capture_async(reader: &mut dyn AsyncRowReader, max_rows: usize) -> Capture {
    let driver_columns = reader.column_schema();
    let mut schema = schema_from_driver(driver_columns, reader.field_count());
    let mut rows: Vec<Row> = Vec::new();

    loop {
        match reader.read().await {
            Ok(true) => {
                if rows.len() >= max_rows {
                    reader.close().await;
                    return Capture::TooLarge(crate::model::TooLarge {
                        schema,
                        rows_drained: rows,
                        records_affected: reader.records_affected(),
                    });
                }
                let row = (0..reader.field_count())
                    .map(|i| {
                        if reader.is_null(i) {
                            None
                        } else {
                            reader.get_value(i)
                        }
                    })
                    .collect();
                rows.push(row);
            }
            Ok(false) => break,
            Err(_) => break,
        }
    }

    let records_affected = reader.records_affected();
    reader.close().await;
    refine_schema_types(&mut schema, &rows);
    Capture::Complete(crate::model::ResultSet::new(
        schema,
        rows,
        records_affected,
        Utc::now(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScalarValue;

    struct FakeReader {
        rows: Vec<Vec<Option<ScalarValue>>>,
        cursor: usize,
        closed: bool,
    }

    impl RowReader for FakeReader {
        fn read(&mut self) -> crate::error::Result<bool> {
            if self.cursor < self.rows.len() {
                self.cursor += 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }
        fn field_count(&self) -> usize {
            self.rows.first().map(|r| r.len()).unwrap_or(1)
        }
        fn get_name(&self, ordinal: usize) -> String {
            format!("col{ordinal}")
        }
        fn get_data_type_name(&self, _ordinal: usize) -> String {
            "INT".to_string()
        }
        fn is_null(&self, ordinal: usize) -> bool {
            self.rows[self.cursor - 1][ordinal].is_none()
        }
        fn get_value(&self, ordinal: usize) -> Option<ScalarValue> {
            self.rows[self.cursor - 1][ordinal].clone()
        }
        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn capture_drains_all_rows_under_limit() {
        let mut reader = FakeReader {
            rows: vec![
                vec![Some(ScalarValue::Int32(1))],
                vec![Some(ScalarValue::Int32(2))],
            ],
            cursor: 0,
            closed: false,
        };
        match capture_sync(&mut reader, 10) {
            Capture::Complete(rs) => assert_eq!(rs.row_count(), 2),
            Capture::TooLarge(_) => panic!("expected complete capture"),
        }
        assert!(reader.closed);
    }

    #[test]
    fn capture_stops_at_row_limit_without_partial_result() {
        let mut reader = FakeReader {
            rows: vec![
                vec![Some(ScalarValue::Int32(1))],
                vec![Some(ScalarValue::Int32(2))],
                vec![Some(ScalarValue::Int32(3))],
            ],
            cursor: 0,
            closed: false,
        };
        match capture_sync(&mut reader, 2) {
            Capture::TooLarge(marker) => assert_eq!(marker.rows_drained.len(), 2),
            Capture::Complete(_) => panic!("expected too-large marker"),
        }
        assert!(reader.closed);
    }

    #[test]
    fn reader_is_always_closed() {
        let mut reader = FakeReader {
            rows: vec![],
            cursor: 0,
            closed: false,
        };
        let _ = capture_sync(&mut reader, 10);
        assert!(reader.closed);
    }
}
