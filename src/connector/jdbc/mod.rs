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
//! JDBC scan: provider and data source.
//!
//! Responsibilities:
//! - Resolves the driver artifact, synthesizes the remote SELECT and opens a `JdbcScanner` per
//!   data source.
//! - Pulls non-empty chunks, skipping empty batches the driver may hand back mid-stream.
//! - Tracks rows and bytes read for the executor's accounting.
//!
//! Key exported interfaces:
//! - Types: `JdbcScanNode`, `JdbcDataSourceProvider`, `JdbcDataSource`.

pub mod column_writer;
pub mod native_bridge;
pub mod scanner;
pub mod sql;
#[cfg(test)]
pub(crate) mod test_bridge;

use std::sync::Arc;

use crate::common::config;
use crate::common::ids::TupleId;
use crate::common::status::{ScanError, ScanResult};
use crate::connector::{DataSource, DataSourcePtr, DataSourceProvider, ScanRange};
use crate::exec::chunk::Chunk;
use crate::novarocks_logging::{debug, error, info, warn};
use crate::runtime::jdbc_driver_manager::JdbcDriverManager;
use crate::runtime::runtime_state::RuntimeState;

pub use scanner::{JdbcBatch, JdbcBridge, JdbcBridgeFactory, JdbcScanContext, JdbcScanner};
pub use sql::{SqlFragment, build_jdbc_sql};

const EMPTY_BATCH_WARN_INTERVAL: u64 = 1024;

/// Planner-side description of a JDBC scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JdbcScanNode {
    pub tuple_id: TupleId,
    /// Remote column expressions, one per output slot and in slot order.
    pub columns: Vec<SqlFragment>,
    /// Pushed-down predicates, implicitly ANDed.
    pub filters: Vec<SqlFragment>,
    pub limit: Option<u64>,
}

pub struct JdbcDataSourceProvider {
    node: Arc<JdbcScanNode>,
    driver_manager: Arc<JdbcDriverManager>,
    bridge_factory: Arc<dyn JdbcBridgeFactory>,
    max_consecutive_empty_batches: u64,
}

impl JdbcDataSourceProvider {
    pub fn new(
        node: JdbcScanNode,
        driver_manager: Arc<JdbcDriverManager>,
        bridge_factory: Arc<dyn JdbcBridgeFactory>,
    ) -> Self {
        Self {
            node: Arc::new(node),
            driver_manager,
            bridge_factory,
            max_consecutive_empty_batches: config::jdbc_max_consecutive_empty_batches(),
        }
    }

    /// 0 means no bound.
    pub fn with_max_consecutive_empty_batches(mut self, max: u64) -> Self {
        self.max_consecutive_empty_batches = max;
        self
    }

    pub fn scan_node(&self) -> &JdbcScanNode {
        &self.node
    }
}

impl DataSourceProvider for JdbcDataSourceProvider {
    fn create_data_source(&self, scan_range: &ScanRange) -> DataSourcePtr {
        Box::new(JdbcDataSource {
            node: Arc::clone(&self.node),
            driver_manager: Arc::clone(&self.driver_manager),
            bridge_factory: Arc::clone(&self.bridge_factory),
            scan_range: *scan_range,
            max_consecutive_empty_batches: self.max_consecutive_empty_batches,
            driver_name: String::new(),
            scan_ctx: None,
            scanner: None,
            read_limit: None,
            rows_read: 0,
            bytes_read: 0,
            eos: false,
            opened: false,
            closed: false,
        })
    }
}

pub struct JdbcDataSource {
    node: Arc<JdbcScanNode>,
    driver_manager: Arc<JdbcDriverManager>,
    bridge_factory: Arc<dyn JdbcBridgeFactory>,
    scan_range: ScanRange,
    max_consecutive_empty_batches: u64,
    driver_name: String,
    scan_ctx: Option<JdbcScanContext>,
    scanner: Option<JdbcScanner>,
    read_limit: Option<u64>,
    rows_read: u64,
    bytes_read: u64,
    eos: bool,
    // A data source is opened at most once, even after close or a failed open.
    opened: bool,
    closed: bool,
}

impl JdbcDataSource {
    /// Context built at open time; `None` before a successful open.
    pub fn scan_context(&self) -> Option<&JdbcScanContext> {
        self.scan_ctx.as_ref()
    }

    fn error_context(&self) -> String {
        format!("JDBC driver[{}]", self.driver_name)
    }

    fn open_scanner(&mut self, state: &RuntimeState) -> ScanResult<()> {
        let tuple = state
            .desc_tbl()
            .get_tuple_descriptor(self.node.tuple_id)
            .ok_or_else(|| {
                ScanError::internal(format!(
                    "tuple descriptor {} not found",
                    self.node.tuple_id
                ))
            })?;
        let table = tuple.jdbc_table().ok_or_else(|| {
            ScanError::internal(format!("tuple {} has no jdbc table", tuple.id))
        })?;
        if self.node.columns.len() != tuple.slots.len() {
            return Err(ScanError::internal(format!(
                "jdbc scan projects {} columns for {} slots",
                self.node.columns.len(),
                tuple.slots.len()
            )));
        }
        self.driver_name = table.jdbc_driver_name.clone();

        let artifact = self
            .driver_manager
            .get_driver_location(&table.driver_identity())
            .map_err(|e| e.with_context(self.error_context()))?;

        let sql = build_jdbc_sql(
            &SqlFragment::trusted(table.jdbc_table.clone()),
            &self.node.columns,
            &self.node.filters,
            self.read_limit.or(self.node.limit),
        );
        let ctx = JdbcScanContext {
            driver_path: artifact.location().to_path_buf(),
            driver_class_name: table.jdbc_driver_class.clone(),
            jdbc_url: table.jdbc_url.clone(),
            user: table.jdbc_user.clone(),
            passwd: table.jdbc_passwd.clone(),
            sql,
            batch_size: state.chunk_size(),
        };

        let mut scanner = JdbcScanner::new(self.bridge_factory.create());
        scanner
            .open(&ctx, &tuple)
            .map_err(|e| e.with_context(self.error_context()))?;
        info!(
            driver = %self.driver_name,
            scan_range = self.scan_range.index,
            sql = %ctx.sql,
            "jdbc data source opened"
        );
        self.scan_ctx = Some(ctx);
        self.scanner = Some(scanner);
        Ok(())
    }

    fn pull(&mut self) -> ScanResult<Option<Chunk>> {
        let max_empty = self.max_consecutive_empty_batches;
        let scanner = self
            .scanner
            .as_mut()
            .ok_or_else(|| ScanError::internal("jdbc data source read before open"))?;
        let mut empty_batches = 0u64;
        loop {
            scanner.reset_jni_env()?;
            let batch = scanner.get_next()?;
            if batch.eos {
                self.eos = true;
            }
            if !batch.chunk.is_empty() {
                self.rows_read += batch.chunk.len() as u64;
                self.bytes_read += batch.chunk.estimated_bytes() as u64;
                return Ok(Some(batch.chunk));
            }
            if batch.eos {
                return Ok(None);
            }
            empty_batches += 1;
            if max_empty > 0 && empty_batches >= max_empty {
                return Err(ScanError::bridge(format!(
                    "driver returned {empty_batches} consecutive empty batches"
                )));
            }
            if empty_batches % EMPTY_BATCH_WARN_INTERVAL == 0 {
                warn!(
                    driver = %self.driver_name,
                    empty_batches,
                    "jdbc driver keeps returning empty batches"
                );
            }
        }
    }
}

impl DataSource for JdbcDataSource {
    fn name(&self) -> String {
        "JDBCDataSource".to_string()
    }

    fn open(&mut self, state: &RuntimeState) -> ScanResult<()> {
        if self.closed {
            return Err(ScanError::internal("jdbc data source is already closed"));
        }
        if self.opened {
            return Err(ScanError::internal("jdbc data source opened twice"));
        }
        self.opened = true;
        self.open_scanner(state).inspect_err(|e| {
            error!(driver = %self.driver_name, error = %e, "open jdbc data source failed");
        })
    }

    fn get_next(&mut self, _state: &RuntimeState) -> ScanResult<Option<Chunk>> {
        if self.eos {
            return Ok(None);
        }
        self.pull().map_err(|e| {
            let e = e.with_context(self.error_context());
            error!(error = %e, "read jdbc data source failed");
            e
        })
    }

    fn close(&mut self, _state: &RuntimeState) {
        self.closed = true;
        let Some(mut scanner) = self.scanner.take() else {
            return;
        };
        if let Err(e) = scanner.reset_jni_env() {
            warn!(driver = %self.driver_name, error = %e, "rebind before jdbc close failed");
        }
        scanner.close();
        debug!(
            driver = %self.driver_name,
            rows_read = self.rows_read,
            bytes_read = self.bytes_read,
            "jdbc data source closed"
        );
    }

    fn raw_rows_read(&self) -> u64 {
        self.rows_read
    }

    fn num_rows_read(&self) -> u64 {
        self.rows_read
    }

    fn num_bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn set_read_limit(&mut self, limit: Option<u64>) {
        self.read_limit = limit;
    }
}
