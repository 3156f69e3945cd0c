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
//! Tuple, slot and table descriptors shipped by the planner.
//!
//! The execution layer only reads these; they are built once per fragment and shared.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::common::ids::{SlotId, TupleId};
use crate::exec::chunk::field_with_slot_id;
use crate::runtime::jdbc_driver_manager::JdbcDriverIdentity;

#[derive(Clone, Debug, PartialEq)]
pub struct SlotDescriptor {
    pub id: SlotId,
    pub col_name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl SlotDescriptor {
    pub fn new(id: SlotId, col_name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id,
            col_name: col_name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn to_field(&self) -> Field {
        field_with_slot_id(
            Field::new(self.col_name.clone(), self.data_type.clone(), self.nullable),
            self.id,
        )
    }
}

/// Catalog metadata of an external JDBC table.
#[derive(Clone, PartialEq, Eq)]
pub struct JdbcTableDescriptor {
    pub jdbc_driver_name: String,
    pub jdbc_driver_url: String,
    pub jdbc_driver_checksum: String,
    pub jdbc_driver_class: String,
    pub jdbc_url: String,
    pub jdbc_table: String,
    pub jdbc_user: Option<String>,
    pub jdbc_passwd: Option<String>,
}

impl JdbcTableDescriptor {
    pub fn driver_identity(&self) -> JdbcDriverIdentity {
        JdbcDriverIdentity {
            name: self.jdbc_driver_name.clone(),
            url: self.jdbc_driver_url.clone(),
            checksum: self.jdbc_driver_checksum.clone(),
            class_name: self.jdbc_driver_class.clone(),
        }
    }
}

impl fmt::Debug for JdbcTableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcTableDescriptor")
            .field("jdbc_driver_name", &self.jdbc_driver_name)
            .field("jdbc_driver_url", &self.jdbc_driver_url)
            .field("jdbc_driver_checksum", &self.jdbc_driver_checksum)
            .field("jdbc_driver_class", &self.jdbc_driver_class)
            .field("jdbc_url", &self.jdbc_url)
            .field("jdbc_table", &self.jdbc_table)
            .field("jdbc_user", &self.jdbc_user)
            .field("jdbc_passwd", &self.jdbc_passwd.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableDescriptor {
    Jdbc(JdbcTableDescriptor),
}

#[derive(Clone, Debug)]
pub struct TupleDescriptor {
    pub id: TupleId,
    pub slots: Vec<SlotDescriptor>,
    pub table_desc: Option<Arc<TableDescriptor>>,
}

impl TupleDescriptor {
    pub fn new(id: TupleId, slots: Vec<SlotDescriptor>) -> Self {
        Self {
            id,
            slots,
            table_desc: None,
        }
    }

    pub fn with_table(mut self, table: TableDescriptor) -> Self {
        self.table_desc = Some(Arc::new(table));
        self
    }

    pub fn jdbc_table(&self) -> Option<&JdbcTableDescriptor> {
        match self.table_desc.as_deref() {
            Some(TableDescriptor::Jdbc(t)) => Some(t),
            None => None,
        }
    }

    /// Arrow schema of chunks produced for this tuple, one field per slot in order.
    pub fn output_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self.slots.iter().map(SlotDescriptor::to_field).collect();
        Arc::new(Schema::new(fields))
    }
}

#[derive(Clone, Debug, Default)]
pub struct DescriptorTbl {
    tuples: HashMap<TupleId, Arc<TupleDescriptor>>,
}

impl DescriptorTbl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tuple(&mut self, tuple: TupleDescriptor) {
        self.tuples.insert(tuple.id, Arc::new(tuple));
    }

    pub fn get_tuple_descriptor(&self, id: TupleId) -> Option<Arc<TupleDescriptor>> {
        self.tuples.get(&id).cloned()
    }
}
