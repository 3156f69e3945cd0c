// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Row-to-column conversion for JDBC result sets.
//!
//! Driver rows arrive one value at a time as [`JdbcValue`]; each output slot owns a typed Arrow
//! builder chosen from the tuple descriptor. A value the slot type cannot hold fails the batch.

use std::borrow::Cow;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Float32Builder, Float64Builder,
    Int8Builder, Int16Builder, Int32Builder, Int64Builder, RecordBatch, RecordBatchOptions,
    StringBuilder,
};
use arrow::datatypes::{DataType, SchemaRef};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::common::status::{ScanError, ScanResult};
use crate::exec::chunk::Chunk;

// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A single value read from a driver row.
#[derive(Clone, Debug, PartialEq)]
pub enum JdbcValue<'a> {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    /// Text or binary payload; MySQL's text protocol delivers numbers this way too.
    Bytes(Cow<'a, [u8]>),
    DateTime(NaiveDateTime),
}

impl JdbcValue<'_> {
    fn type_name(&self) -> &'static str {
        match self {
            JdbcValue::Null => "NULL",
            JdbcValue::Int(_) => "integer",
            JdbcValue::UInt(_) => "unsigned integer",
            JdbcValue::Double(_) => "double",
            JdbcValue::Bytes(_) => "bytes",
            JdbcValue::DateTime(_) => "datetime",
        }
    }

    fn as_text(&self) -> Cow<'_, str> {
        match self {
            JdbcValue::Null => Cow::Borrowed(""),
            JdbcValue::Int(v) => Cow::Owned(v.to_string()),
            JdbcValue::UInt(v) => Cow::Owned(v.to_string()),
            JdbcValue::Double(v) => Cow::Owned(v.to_string()),
            JdbcValue::Bytes(b) => String::from_utf8_lossy(b),
            JdbcValue::DateTime(dt) => Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }

    fn to_bool(&self) -> Result<bool, String> {
        match self {
            JdbcValue::Int(v) => Ok(*v != 0),
            JdbcValue::UInt(v) => Ok(*v != 0),
            JdbcValue::Double(v) => Ok(*v != 0.0),
            // BIT(1) comes back as a raw byte.
            JdbcValue::Bytes(b) if b.len() == 1 && b[0] <= 1 => Ok(b[0] == 1),
            JdbcValue::Bytes(_) => match self.as_text().trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "t" => Ok(true),
                "0" | "false" | "f" => Ok(false),
                other => Err(format!("cannot convert '{other}' to Boolean")),
            },
            other => Err(format!("cannot convert {} to Boolean", other.type_name())),
        }
    }

    fn to_i64(&self) -> Result<i64, String> {
        match self {
            JdbcValue::Int(v) => Ok(*v),
            JdbcValue::UInt(v) => i64::try_from(*v).map_err(|_| format!("value {v} overflows Int64")),
            JdbcValue::Double(v) if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 => {
                Ok(*v as i64)
            }
            JdbcValue::Bytes(_) => {
                let text = self.as_text();
                text.trim()
                    .parse::<i64>()
                    .map_err(|_| format!("cannot convert '{text}' to integer"))
            }
            other => Err(format!("cannot convert {} to integer", other.type_name())),
        }
    }

    fn to_f64(&self) -> Result<f64, String> {
        match self {
            JdbcValue::Int(v) => Ok(*v as f64),
            JdbcValue::UInt(v) => Ok(*v as f64),
            JdbcValue::Double(v) => Ok(*v),
            JdbcValue::Bytes(_) => {
                let text = self.as_text();
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| format!("cannot convert '{text}' to floating point"))
            }
            other => Err(format!("cannot convert {} to floating point", other.type_name())),
        }
    }

    fn to_date32(&self) -> Result<i32, String> {
        let date = match self {
            JdbcValue::DateTime(dt) => dt.date(),
            JdbcValue::Bytes(_) => {
                let text = self.as_text();
                let text = text.trim();
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .or_else(|_| {
                        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.date())
                    })
                    .map_err(|_| format!("cannot convert '{text}' to Date32"))?
            }
            other => return Err(format!("cannot convert {} to Date32", other.type_name())),
        };
        Ok(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, type_name: &str) -> Result<T, String> {
    T::try_from(value).map_err(|_| format!("value {value} overflows {type_name}"))
}

enum TypedBuilder {
    Boolean(BooleanBuilder),
    Int8(Int8Builder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Utf8(StringBuilder),
    Binary(BinaryBuilder),
    Date32(Date32Builder),
}

impl TypedBuilder {
    fn try_new(data_type: &DataType, capacity: usize) -> Option<Self> {
        Some(match data_type {
            DataType::Boolean => TypedBuilder::Boolean(BooleanBuilder::with_capacity(capacity)),
            DataType::Int8 => TypedBuilder::Int8(Int8Builder::with_capacity(capacity)),
            DataType::Int16 => TypedBuilder::Int16(Int16Builder::with_capacity(capacity)),
            DataType::Int32 => TypedBuilder::Int32(Int32Builder::with_capacity(capacity)),
            DataType::Int64 => TypedBuilder::Int64(Int64Builder::with_capacity(capacity)),
            DataType::Float32 => TypedBuilder::Float32(Float32Builder::with_capacity(capacity)),
            DataType::Float64 => TypedBuilder::Float64(Float64Builder::with_capacity(capacity)),
            DataType::Utf8 => TypedBuilder::Utf8(StringBuilder::with_capacity(capacity, capacity * 16)),
            DataType::Binary => TypedBuilder::Binary(BinaryBuilder::with_capacity(capacity, capacity * 16)),
            DataType::Date32 => TypedBuilder::Date32(Date32Builder::with_capacity(capacity)),
            _ => return None,
        })
    }

    fn append_null(&mut self) {
        match self {
            TypedBuilder::Boolean(b) => b.append_null(),
            TypedBuilder::Int8(b) => b.append_null(),
            TypedBuilder::Int16(b) => b.append_null(),
            TypedBuilder::Int32(b) => b.append_null(),
            TypedBuilder::Int64(b) => b.append_null(),
            TypedBuilder::Float32(b) => b.append_null(),
            TypedBuilder::Float64(b) => b.append_null(),
            TypedBuilder::Utf8(b) => b.append_null(),
            TypedBuilder::Binary(b) => b.append_null(),
            TypedBuilder::Date32(b) => b.append_null(),
        }
    }

    fn append(&mut self, value: &JdbcValue<'_>) -> Result<(), String> {
        match self {
            TypedBuilder::Boolean(b) => b.append_value(value.to_bool()?),
            TypedBuilder::Int8(b) => b.append_value(narrow::<i8>(value.to_i64()?, "Int8")?),
            TypedBuilder::Int16(b) => b.append_value(narrow::<i16>(value.to_i64()?, "Int16")?),
            TypedBuilder::Int32(b) => b.append_value(narrow::<i32>(value.to_i64()?, "Int32")?),
            TypedBuilder::Int64(b) => b.append_value(value.to_i64()?),
            TypedBuilder::Float32(b) => b.append_value(value.to_f64()? as f32),
            TypedBuilder::Float64(b) => b.append_value(value.to_f64()?),
            TypedBuilder::Utf8(b) => b.append_value(value.as_text()),
            TypedBuilder::Binary(b) => match value {
                JdbcValue::Bytes(bytes) => b.append_value(bytes),
                other => b.append_value(other.as_text().as_bytes()),
            },
            TypedBuilder::Date32(b) => b.append_value(value.to_date32()?),
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            TypedBuilder::Boolean(b) => Arc::new(b.finish()),
            TypedBuilder::Int8(b) => Arc::new(b.finish()),
            TypedBuilder::Int16(b) => Arc::new(b.finish()),
            TypedBuilder::Int32(b) => Arc::new(b.finish()),
            TypedBuilder::Int64(b) => Arc::new(b.finish()),
            TypedBuilder::Float32(b) => Arc::new(b.finish()),
            TypedBuilder::Float64(b) => Arc::new(b.finish()),
            TypedBuilder::Utf8(b) => Arc::new(b.finish()),
            TypedBuilder::Binary(b) => Arc::new(b.finish()),
            TypedBuilder::Date32(b) => Arc::new(b.finish()),
        }
    }
}

struct ColumnWriter {
    name: String,
    nullable: bool,
    builder: TypedBuilder,
}

/// Accumulates driver rows into a [`Chunk`] with a fixed slot-annotated schema.
pub struct ChunkWriter {
    schema: SchemaRef,
    columns: Vec<ColumnWriter>,
    rows: usize,
}

impl ChunkWriter {
    pub fn try_new(schema: SchemaRef, capacity: usize) -> ScanResult<Self> {
        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let builder = TypedBuilder::try_new(field.data_type(), capacity).ok_or_else(|| {
                ScanError::internal(format!(
                    "unsupported jdbc column type {:?} for column {}",
                    field.data_type(),
                    field.name()
                ))
            })?;
            columns.push(ColumnWriter {
                name: field.name().clone(),
                nullable: field.is_nullable(),
                builder,
            });
        }
        Ok(Self {
            schema,
            columns,
            rows: 0,
        })
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Append the value of column `idx` for the row under construction.
    pub fn append_value(&mut self, idx: usize, value: JdbcValue<'_>) -> ScanResult<()> {
        let column = self.columns.get_mut(idx).ok_or_else(|| {
            ScanError::internal(format!("jdbc column index {idx} out of range"))
        })?;
        if matches!(value, JdbcValue::Null) {
            if !column.nullable {
                return Err(ScanError::bridge(format!(
                    "NULL value for non-nullable column {}",
                    column.name
                )));
            }
            column.builder.append_null();
            return Ok(());
        }
        column
            .builder
            .append(&value)
            .map_err(|e| ScanError::bridge(format!("column {}: {e}", column.name)))
    }

    /// Mark the current row complete. Every column must have received one value.
    pub fn end_row(&mut self) {
        self.rows += 1;
    }

    /// Emit the accumulated rows and reset for the next batch.
    pub fn finish(&mut self) -> ScanResult<Chunk> {
        let rows = std::mem::take(&mut self.rows);
        let arrays: Vec<ArrayRef> = self
            .columns
            .iter_mut()
            .map(|c| c.builder.finish())
            .collect();
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        let batch = RecordBatch::try_new_with_options(Arc::clone(&self.schema), arrays, &options)
            .map_err(|e| ScanError::bridge(format!("build jdbc chunk failed: {e}")))?;
        Chunk::try_new(batch).map_err(ScanError::internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SlotId;
    use crate::common::status::ScanErrorKind;
    use crate::exec::chunk::field_with_slot_id;
    use arrow::array::{Array, BooleanArray, Date32Array, Int8Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    fn schema(fields: &[(&str, DataType, bool)]) -> SchemaRef {
        Arc::new(Schema::new(
            fields
                .iter()
                .enumerate()
                .map(|(i, (name, dt, nullable))| {
                    field_with_slot_id(Field::new(*name, dt.clone(), *nullable), SlotId::new(i as u32))
                })
                .collect::<Vec<_>>(),
        ))
    }

    fn text(s: &str) -> JdbcValue<'_> {
        JdbcValue::Bytes(Cow::Borrowed(s.as_bytes()))
    }

    #[test]
    fn writes_typed_columns_from_mixed_values() {
        let mut writer = ChunkWriter::try_new(
            schema(&[
                ("id", DataType::Int64, true),
                ("name", DataType::Utf8, true),
                ("flag", DataType::Boolean, true),
                ("day", DataType::Date32, true),
            ]),
            4,
        )
        .expect("writer");

        writer.append_value(0, JdbcValue::Int(1)).expect("id");
        writer.append_value(1, text("alice")).expect("name");
        writer.append_value(2, JdbcValue::Int(1)).expect("flag");
        writer.append_value(3, text("1970-01-02")).expect("day");
        writer.end_row();

        writer.append_value(0, text(" 42 ")).expect("id");
        writer.append_value(1, JdbcValue::Null).expect("name");
        writer.append_value(2, text("false")).expect("flag");
        writer.append_value(3, JdbcValue::Null).expect("day");
        writer.end_row();

        let chunk = writer.finish().expect("finish");
        assert_eq!(chunk.len(), 2);
        let ids = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64");
        assert_eq!(ids.values(), &[1, 42]);
        let names = chunk.columns()[1]
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(names.value(0), "alice");
        assert!(names.is_null(1));
        let flags = chunk.columns()[2]
            .as_any()
            .downcast_ref::<BooleanArray>()
            .expect("bool");
        assert!(flags.value(0));
        assert!(!flags.value(1));
        let days = chunk.columns()[3]
            .as_any()
            .downcast_ref::<Date32Array>()
            .expect("date32");
        assert_eq!(days.value(0), 1);

        // Builders reset after finish.
        assert_eq!(writer.num_rows(), 0);
        assert_eq!(writer.finish().expect("empty").len(), 0);
    }

    #[test]
    fn datetime_to_date32_and_text() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .expect("datetime");
        let mut writer = ChunkWriter::try_new(
            schema(&[("d", DataType::Date32, true), ("s", DataType::Utf8, true)]),
            1,
        )
        .expect("writer");
        writer.append_value(0, JdbcValue::DateTime(dt)).expect("date");
        writer.append_value(1, JdbcValue::DateTime(dt)).expect("text");
        writer.end_row();
        let chunk = writer.finish().expect("finish");
        let days = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Date32Array>()
            .expect("date32");
        assert_eq!(days.value(0), 19783);
        let s = chunk.columns()[1]
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(s.value(0), "2024-03-01 12:30:00");
    }

    #[test]
    fn overflow_is_bridge_error() {
        let mut writer =
            ChunkWriter::try_new(schema(&[("v", DataType::Int8, true)]), 1).expect("writer");
        let err = writer
            .append_value(0, JdbcValue::Int(300))
            .expect_err("overflow");
        assert_eq!(err.kind(), ScanErrorKind::BridgeError);
        assert!(err.message().contains("column v"), "{err}");

        writer.append_value(0, JdbcValue::Int(-3)).expect("fits");
        writer.end_row();
        let chunk = writer.finish().expect("finish");
        let v = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Int8Array>()
            .expect("int8");
        assert_eq!(v.value(0), -3);
    }

    #[test]
    fn null_into_non_nullable_column_is_rejected() {
        let mut writer =
            ChunkWriter::try_new(schema(&[("v", DataType::Int64, false)]), 1).expect("writer");
        let err = writer.append_value(0, JdbcValue::Null).expect_err("null");
        assert_eq!(err.kind(), ScanErrorKind::BridgeError);
    }

    #[test]
    fn unsupported_slot_type_is_internal_error() {
        let err = match ChunkWriter::try_new(
            schema(&[("v", DataType::Decimal128(10, 2), true)]),
            1,
        ) {
            Ok(_) => panic!("decimal slots are not supported"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), ScanErrorKind::Internal);
    }

    #[test]
    fn zero_column_chunk_keeps_row_count() {
        let mut writer = ChunkWriter::try_new(schema(&[]), 4).expect("writer");
        writer.end_row();
        writer.end_row();
        assert_eq!(writer.finish().expect("finish").len(), 2);
    }
}
