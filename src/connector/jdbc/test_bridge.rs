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
//! Scripted bridge for unit tests of the scanner and the data source.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use arrow::array::{RecordBatch, RecordBatchOptions, new_null_array};
use arrow::datatypes::{DataType, SchemaRef};

use crate::common::ids::{SlotId, TupleId};
use crate::common::status::{ScanError, ScanResult};
use crate::connector::jdbc::scanner::{JdbcBatch, JdbcBridge, JdbcBridgeFactory, JdbcScanContext};
use crate::exec::chunk::Chunk;
use crate::runtime::descriptors::{JdbcTableDescriptor, SlotDescriptor, TableDescriptor, TupleDescriptor};

#[derive(Clone, Debug)]
pub(crate) enum Step {
    FailOpen(ScanError),
    Rows(usize),
    RowsEos(usize),
    Eos,
    Fail(ScanError),
}

#[derive(Default)]
pub(crate) struct BridgeCalls {
    pub opens: AtomicUsize,
    pub attaches: AtomicUsize,
    pub pulls: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_attach: AtomicBool,
    pub last_sql: Mutex<Option<String>>,
    pub attached_threads: Mutex<Vec<ThreadId>>,
}

pub(crate) struct ScriptedBridge {
    steps: VecDeque<Step>,
    calls: Arc<BridgeCalls>,
    schema: Option<SchemaRef>,
}

impl ScriptedBridge {
    pub(crate) fn new(steps: Vec<Step>, calls: Arc<BridgeCalls>) -> Self {
        Self {
            steps: steps.into(),
            calls,
            schema: None,
        }
    }

    fn chunk(&self, rows: usize) -> ScanResult<Chunk> {
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| ScanError::internal("scripted bridge not open"))?;
        let columns = schema
            .fields()
            .iter()
            .map(|f| new_null_array(f.data_type(), rows))
            .collect();
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        let batch = RecordBatch::try_new_with_options(schema, columns, &options)
            .map_err(|e| ScanError::internal(e.to_string()))?;
        Chunk::try_new(batch).map_err(ScanError::internal)
    }
}

impl JdbcBridge for ScriptedBridge {
    fn open(&mut self, ctx: &JdbcScanContext, tuple: &TupleDescriptor) -> ScanResult<()> {
        self.calls.opens.fetch_add(1, Ordering::SeqCst);
        *self.calls.last_sql.lock().expect("sql lock") = Some(ctx.sql.clone());
        if let Some(Step::FailOpen(_)) = self.steps.front() {
            if let Some(Step::FailOpen(e)) = self.steps.pop_front() {
                return Err(e);
            }
        }
        self.schema = Some(tuple.output_schema());
        Ok(())
    }

    fn attach_current_thread(&mut self) -> ScanResult<()> {
        if self.calls.fail_attach.load(Ordering::SeqCst) {
            return Err(ScanError::bridge("attach refused"));
        }
        self.calls.attaches.fetch_add(1, Ordering::SeqCst);
        self.calls
            .attached_threads
            .lock()
            .expect("threads lock")
            .push(thread::current().id());
        Ok(())
    }

    fn get_next(&mut self) -> ScanResult<JdbcBatch> {
        self.calls.pulls.fetch_add(1, Ordering::SeqCst);
        let (rows, eos) = match self.steps.pop_front() {
            Some(Step::Rows(n)) => (n, false),
            Some(Step::RowsEos(n)) => (n, true),
            Some(Step::Eos) | None => (0, true),
            Some(Step::Fail(e)) | Some(Step::FailOpen(e)) => return Err(e),
        };
        Ok(JdbcBatch {
            chunk: self.chunk(rows)?,
            eos,
        })
    }

    fn close(&mut self) {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct ScriptedBridgeFactory {
    pub steps: Vec<Step>,
    pub calls: Arc<BridgeCalls>,
}

impl ScriptedBridgeFactory {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            calls: Arc::new(BridgeCalls::default()),
        }
    }
}

impl JdbcBridgeFactory for ScriptedBridgeFactory {
    fn create(&self) -> Box<dyn JdbcBridge> {
        Box::new(ScriptedBridge::new(self.steps.clone(), Arc::clone(&self.calls)))
    }
}

pub(crate) fn test_context() -> JdbcScanContext {
    JdbcScanContext {
        driver_path: PathBuf::from("/tmp/driver.jar"),
        driver_class_name: "org.sqlite.JDBC".to_string(),
        jdbc_url: "jdbc:sqlite::memory:".to_string(),
        user: Some("reader".to_string()),
        passwd: Some("pa55".to_string()),
        sql: "SELECT id FROM t".to_string(),
        batch_size: 4,
    }
}

pub(crate) fn test_table(driver_url: &str, checksum: &str) -> JdbcTableDescriptor {
    JdbcTableDescriptor {
        jdbc_driver_name: "sqlite".to_string(),
        jdbc_driver_url: driver_url.to_string(),
        jdbc_driver_checksum: checksum.to_string(),
        jdbc_driver_class: "org.sqlite.JDBC".to_string(),
        jdbc_url: "jdbc:sqlite::memory:".to_string(),
        jdbc_table: "t".to_string(),
        jdbc_user: None,
        jdbc_passwd: None,
    }
}

pub(crate) fn test_tuple() -> TupleDescriptor {
    TupleDescriptor::new(
        TupleId(0),
        vec![SlotDescriptor::new(SlotId::new(1), "id", DataType::Int64)],
    )
    .with_table(TableDescriptor::Jdbc(test_table("/tmp/driver.jar", "0")))
}
