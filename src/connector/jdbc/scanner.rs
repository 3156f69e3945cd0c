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
//! Pull-based scanner over a foreign JDBC runtime.
//!
//! Responsibilities:
//! - Drives the `Uninitialized -> Connected -> Streaming -> Closed` lifecycle of one remote query.
//! - Requires the calling thread to be attached (`reset_jni_env`) before every pull, since the
//!   executor may resume a scan on a different worker thread.
//!
//! Key exported interfaces:
//! - Types: `JdbcScanner`, `JdbcScanContext`, `JdbcBatch`.
//! - Traits: `JdbcBridge` (the runtime boundary), `JdbcBridgeFactory`.

use std::fmt;
use std::path::PathBuf;
use std::thread::{self, ThreadId};

use arrow::datatypes::SchemaRef;

use crate::common::status::{ScanError, ScanResult};
use crate::exec::chunk::Chunk;
use crate::runtime::descriptors::TupleDescriptor;

/// Everything the foreign runtime needs to run one scan. Built once per data source.
#[derive(Clone, PartialEq, Eq)]
pub struct JdbcScanContext {
    pub driver_path: PathBuf,
    pub driver_class_name: String,
    pub jdbc_url: String,
    pub user: Option<String>,
    pub passwd: Option<String>,
    pub sql: String,
    pub batch_size: usize,
}

impl fmt::Debug for JdbcScanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcScanContext")
            .field("driver_path", &self.driver_path)
            .field("driver_class_name", &self.driver_class_name)
            .field("jdbc_url", &self.jdbc_url)
            .field("user", &self.user)
            .field("passwd", &self.passwd.as_ref().map(|_| "***"))
            .field("sql", &self.sql)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// One batch pulled from the remote cursor. `chunk` may be empty even when `eos` is false.
#[derive(Clone, Debug)]
pub struct JdbcBatch {
    pub chunk: Chunk,
    pub eos: bool,
}

/// Boundary to the runtime that hosts the JDBC driver.
pub trait JdbcBridge: Send {
    /// Load the driver class, connect and execute `ctx.sql`.
    ///
    /// Fails with `ConnectError` when the class cannot be loaded or the connection is refused,
    /// and with `QueryError` when the statement is rejected.
    fn open(&mut self, ctx: &JdbcScanContext, tuple: &TupleDescriptor) -> ScanResult<()>;

    /// Make the foreign runtime usable from the calling thread.
    fn attach_current_thread(&mut self) -> ScanResult<()>;

    fn get_next(&mut self) -> ScanResult<JdbcBatch>;

    /// Release the cursor and connection, including anything a failed `open` acquired.
    /// Called at most once per bridge, after `open` returned, whether it succeeded or not.
    fn close(&mut self);
}

pub trait JdbcBridgeFactory: Send + Sync {
    fn create(&self) -> Box<dyn JdbcBridge>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerState {
    Uninitialized,
    Connected,
    Streaming,
    Closed,
}

pub struct JdbcScanner {
    bridge: Box<dyn JdbcBridge>,
    state: ScannerState,
    attached_thread: Option<ThreadId>,
    output_schema: Option<SchemaRef>,
    eos: bool,
}

impl JdbcScanner {
    pub fn new(bridge: Box<dyn JdbcBridge>) -> Self {
        Self {
            bridge,
            state: ScannerState::Uninitialized,
            attached_thread: None,
            output_schema: None,
            eos: false,
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn open(&mut self, ctx: &JdbcScanContext, tuple: &TupleDescriptor) -> ScanResult<()> {
        match self.state {
            ScannerState::Uninitialized => {}
            ScannerState::Closed => return Err(ScanError::internal("jdbc scanner is already closed")),
            ScannerState::Connected | ScannerState::Streaming => {
                return Err(ScanError::internal("jdbc scanner is already open"));
            }
        }
        if let Err(e) = self.bridge.open(ctx, tuple) {
            // Partially acquired resources are released here; a later close() is a no-op.
            self.bridge.close();
            self.state = ScannerState::Closed;
            return Err(e);
        }
        self.output_schema = Some(tuple.output_schema());
        self.state = ScannerState::Connected;
        Ok(())
    }

    /// Attach the calling thread to the foreign runtime. Must precede every `get_next`.
    pub fn reset_jni_env(&mut self) -> ScanResult<()> {
        self.ensure_open("rebind")?;
        self.bridge.attach_current_thread()?;
        self.attached_thread = Some(thread::current().id());
        Ok(())
    }

    pub fn get_next(&mut self) -> ScanResult<JdbcBatch> {
        self.ensure_open("pull")?;
        if self.eos {
            return Ok(JdbcBatch {
                chunk: self.empty_chunk()?,
                eos: true,
            });
        }
        let current = thread::current().id();
        match self.attached_thread.take() {
            Some(attached) if attached == current => {}
            Some(_) => {
                return Err(ScanError::bridge(
                    "jdbc scanner pulled from a thread other than the one last attached",
                ));
            }
            None => {
                return Err(ScanError::bridge(
                    "jdbc scanner pulled without attaching the current thread",
                ));
            }
        }
        let batch = self.bridge.get_next()?;
        self.state = ScannerState::Streaming;
        self.eos = batch.eos;
        Ok(batch)
    }

    /// Idempotent; a no-op before a successful open.
    pub fn close(&mut self) {
        match self.state {
            ScannerState::Connected | ScannerState::Streaming => {
                self.bridge.close();
                self.state = ScannerState::Closed;
                self.attached_thread = None;
            }
            ScannerState::Uninitialized | ScannerState::Closed => {}
        }
    }

    fn ensure_open(&self, op: &str) -> ScanResult<()> {
        match self.state {
            ScannerState::Connected | ScannerState::Streaming => Ok(()),
            ScannerState::Uninitialized => {
                Err(ScanError::internal(format!("jdbc scanner {op} before open")))
            }
            ScannerState::Closed => Err(ScanError::internal(format!("jdbc scanner {op} after close"))),
        }
    }

    fn empty_chunk(&self) -> ScanResult<Chunk> {
        let schema = self
            .output_schema
            .clone()
            .ok_or_else(|| ScanError::internal("jdbc scanner has no output schema"))?;
        Chunk::try_new_empty(schema).map_err(ScanError::internal)
    }
}

impl Drop for JdbcScanner {
    fn drop(&mut self) {
        self.close();
    }
}
