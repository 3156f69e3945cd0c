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
//! In-process JDBC bridge backed by native Rust drivers.
//!
//! The driver runs on a dedicated `jdbc-driver` thread that owns the connection and the
//! forward-only cursor, the way a JVM-hosted driver owns them on the Java side. Batches cross
//! back over a bounded channel, so the remote cursor advances at most one batch ahead of the
//! consumer.
//!
//! Supported driver classes:
//! - `org.sqlite.JDBC` with `jdbc:sqlite:<path>` (rusqlite)
//! - `com.mysql.cj.jdbc.Driver`, `com.mysql.jdbc.Driver`, `org.mariadb.jdbc.Driver` with
//!   `jdbc:mysql://...` or `jdbc:mariadb://...` (mysql)

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use arrow::datatypes::SchemaRef;
use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use url::Url;

use crate::common::status::{ScanError, ScanResult};
use crate::connector::jdbc::column_writer::{ChunkWriter, JdbcValue};
use crate::connector::jdbc::scanner::{JdbcBatch, JdbcBridge, JdbcBridgeFactory, JdbcScanContext};
use crate::novarocks_logging::{debug, warn};
use crate::runtime::descriptors::TupleDescriptor;

const DRIVER_THREAD_NAME: &str = "jdbc-driver";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DriverBackend {
    Sqlite,
    MySql,
}

impl DriverBackend {
    fn for_class(class_name: &str) -> Option<Self> {
        match class_name.trim() {
            "org.sqlite.JDBC" => Some(DriverBackend::Sqlite),
            "com.mysql.cj.jdbc.Driver" | "com.mysql.jdbc.Driver" | "org.mariadb.jdbc.Driver" => {
                Some(DriverBackend::MySql)
            }
            _ => None,
        }
    }

    fn accepts_url(self, jdbc_url: &str) -> bool {
        match self {
            DriverBackend::Sqlite => jdbc_url.starts_with("jdbc:sqlite:"),
            DriverBackend::MySql => {
                jdbc_url.starts_with("jdbc:mysql:") || jdbc_url.starts_with("jdbc:mariadb:")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NativeJdbcBridgeFactory;

impl JdbcBridgeFactory for NativeJdbcBridgeFactory {
    fn create(&self) -> Box<dyn JdbcBridge> {
        Box::new(NativeJdbcBridge::default())
    }
}

struct DriverWorker {
    batches: Receiver<ScanResult<JdbcBatch>>,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct NativeJdbcBridge {
    worker: Option<DriverWorker>,
}

impl JdbcBridge for NativeJdbcBridge {
    fn open(&mut self, ctx: &JdbcScanContext, tuple: &TupleDescriptor) -> ScanResult<()> {
        if self.worker.is_some() {
            return Err(ScanError::internal("jdbc bridge is already open"));
        }
        if !ctx.driver_path.is_file() {
            return Err(ScanError::connect(format!(
                "driver artifact {} does not exist",
                ctx.driver_path.display()
            )));
        }
        let backend = DriverBackend::for_class(&ctx.driver_class_name).ok_or_else(|| {
            ScanError::connect(format!(
                "cannot load driver class {}",
                ctx.driver_class_name
            ))
        })?;
        if !backend.accepts_url(&ctx.jdbc_url) {
            return Err(ScanError::connect(format!(
                "driver {} does not accept url {}",
                ctx.driver_class_name, ctx.jdbc_url
            )));
        }

        let (status_tx, status_rx) = mpsc::sync_channel::<ScanResult<()>>(1);
        let (batch_tx, batch_rx) = mpsc::sync_channel::<ScanResult<JdbcBatch>>(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let task = DriverTask {
            ctx: ctx.clone(),
            schema: tuple.output_schema(),
            status: status_tx,
            batches: batch_tx,
            cancel: Arc::clone(&cancel),
        };
        let handle = thread::Builder::new()
            .name(DRIVER_THREAD_NAME.to_string())
            .spawn(move || match backend {
                DriverBackend::Sqlite => task.run_sqlite(),
                DriverBackend::MySql => task.run_mysql(),
            })
            .map_err(|e| ScanError::bridge(format!("spawn jdbc driver thread failed: {e}")))?;

        let status = status_rx.recv().unwrap_or_else(|_| {
            Err(ScanError::bridge("jdbc driver thread exited before reporting open status"))
        });
        let worker = DriverWorker {
            batches: batch_rx,
            cancel,
            handle,
        };
        match status {
            Ok(()) => {
                debug!(class = %ctx.driver_class_name, "jdbc driver thread connected");
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                shutdown(worker);
                Err(e)
            }
        }
    }

    fn attach_current_thread(&mut self) -> ScanResult<()> {
        match self.worker {
            Some(_) => Ok(()),
            None => Err(ScanError::bridge("jdbc bridge is not connected")),
        }
    }

    fn get_next(&mut self) -> ScanResult<JdbcBatch> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| ScanError::bridge("jdbc bridge is not connected"))?;
        worker
            .batches
            .recv()
            .map_err(|_| ScanError::bridge("jdbc driver thread terminated unexpectedly"))?
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            shutdown(worker);
        }
    }
}

impl Drop for NativeJdbcBridge {
    fn drop(&mut self) {
        self.close();
    }
}

fn shutdown(worker: DriverWorker) {
    let DriverWorker {
        batches,
        cancel,
        handle,
    } = worker;
    cancel.store(true, Ordering::Release);
    // Unblocks a driver thread waiting to hand over a batch.
    drop(batches);
    if handle.join().is_err() {
        warn!("jdbc driver thread panicked");
    }
}

struct DriverTask {
    ctx: JdbcScanContext,
    schema: SchemaRef,
    status: SyncSender<ScanResult<()>>,
    batches: SyncSender<ScanResult<JdbcBatch>>,
    cancel: Arc<AtomicBool>,
}

impl DriverTask {
    fn fail_open(&self, err: ScanError) {
        let _ = self.status.send(Err(err));
    }

    fn check_column_count(&self, actual: usize) -> ScanResult<()> {
        let expected = self.schema.fields().len();
        if actual != expected {
            return Err(ScanError::query(format!(
                "query returns {actual} columns but the scan expects {expected}: {}",
                self.ctx.sql
            )));
        }
        Ok(())
    }

    fn run_sqlite(self) {
        use rusqlite::OpenFlags;

        let Some(path) = self.ctx.jdbc_url.strip_prefix("jdbc:sqlite:") else {
            return self.fail_open(ScanError::connect("invalid sqlite jdbc url"));
        };
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = match rusqlite::Connection::open_with_flags(path, flags) {
            Ok(conn) => conn,
            Err(e) => return self.fail_open(ScanError::connect(format!("open {path}: {e}"))),
        };
        let mut stmt = match conn.prepare(&self.ctx.sql) {
            Ok(stmt) => stmt,
            Err(e) => return self.fail_open(ScanError::query(e.to_string())),
        };
        let col_count = stmt.column_count();
        if let Err(e) = self.check_column_count(col_count) {
            return self.fail_open(e);
        }
        let mut rows = match stmt.query([]) {
            Ok(rows) => rows,
            Err(e) => return self.fail_open(ScanError::query(e.to_string())),
        };
        if self.status.send(Ok(())).is_err() {
            return;
        }

        self.stream_batches(|writer| {
            let Some(row) = rows
                .next()
                .map_err(|e| ScanError::bridge(format!("fetch sqlite row: {e}")))?
            else {
                return Ok(false);
            };
            for i in 0..col_count {
                let value = row
                    .get_ref(i)
                    .map_err(|e| ScanError::bridge(format!("read sqlite column {i}: {e}")))?;
                writer.append_value(i, sqlite_value(value))?;
            }
            Ok(true)
        });
    }

    fn run_mysql(self) {
        use mysql::prelude::Queryable;

        let opts = match mysql_opts(&self.ctx) {
            Ok(opts) => opts,
            Err(e) => return self.fail_open(e),
        };
        let mut conn = match mysql::Conn::new(opts) {
            Ok(conn) => conn,
            Err(e) => return self.fail_open(ScanError::connect(e.to_string())),
        };
        let mut result = match conn.query_iter(self.ctx.sql.as_str()) {
            Ok(result) => result,
            Err(e) => return self.fail_open(ScanError::query(e.to_string())),
        };
        let col_count = result.columns().as_ref().len();
        if let Err(e) = self.check_column_count(col_count) {
            return self.fail_open(e);
        }
        if self.status.send(Ok(())).is_err() {
            return;
        }

        self.stream_batches(|writer| {
            let row = match result.next() {
                Some(row) => row.map_err(|e| ScanError::bridge(format!("fetch mysql row: {e}")))?,
                None => return Ok(false),
            };
            for i in 0..col_count {
                let value = row.as_ref(i).map_or(JdbcValue::Null, mysql_value);
                writer.append_value(i, value)?;
            }
            Ok(true)
        });
    }

    /// Fill batches of `batch_size` rows via `next_row` (which returns false at end of cursor) and
    /// hand them to the consumer. The last batch carries `eos`.
    fn stream_batches<F>(&self, mut next_row: F)
    where
        F: FnMut(&mut ChunkWriter) -> ScanResult<bool>,
    {
        let batch_size = self.ctx.batch_size.max(1);
        let mut writer = match ChunkWriter::try_new(self.schema.clone(), batch_size) {
            Ok(writer) => writer,
            Err(e) => {
                let _ = self.batches.send(Err(e));
                return;
            }
        };
        loop {
            if self.cancel.load(Ordering::Acquire) {
                return;
            }
            let mut eos = false;
            while writer.num_rows() < batch_size {
                match next_row(&mut writer) {
                    Ok(true) => writer.end_row(),
                    Ok(false) => {
                        eos = true;
                        break;
                    }
                    Err(e) => {
                        let _ = self.batches.send(Err(e));
                        return;
                    }
                }
            }
            let batch = writer.finish().map(|chunk| JdbcBatch { chunk, eos });
            let failed = batch.is_err();
            if self.batches.send(batch).is_err() || failed || eos {
                return;
            }
        }
    }
}

fn sqlite_value(value: ValueRef<'_>) -> JdbcValue<'_> {
    match value {
        ValueRef::Null => JdbcValue::Null,
        ValueRef::Integer(v) => JdbcValue::Int(v),
        ValueRef::Real(v) => JdbcValue::Double(v),
        ValueRef::Text(b) | ValueRef::Blob(b) => JdbcValue::Bytes(Cow::Borrowed(b)),
    }
}

fn mysql_value(value: &mysql::Value) -> JdbcValue<'_> {
    match value {
        mysql::Value::NULL => JdbcValue::Null,
        mysql::Value::Int(v) => JdbcValue::Int(*v),
        mysql::Value::UInt(v) => JdbcValue::UInt(*v),
        mysql::Value::Float(v) => JdbcValue::Double(f64::from(*v)),
        mysql::Value::Double(v) => JdbcValue::Double(*v),
        mysql::Value::Bytes(b) => JdbcValue::Bytes(Cow::Borrowed(b.as_slice())),
        mysql::Value::Date(y, m, d, hh, mm, ss, micros) => {
            // Zero dates ('0000-00-00') have no calendar value.
            NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*m), u32::from(*d))
                .and_then(|date| {
                    date.and_hms_micro_opt(u32::from(*hh), u32::from(*mm), u32::from(*ss), *micros)
                })
                .map_or(JdbcValue::Null, JdbcValue::DateTime)
        }
        mysql::Value::Time(is_neg, days, hours, minutes, seconds, _micros) => {
            let sign = if *is_neg { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            JdbcValue::Bytes(Cow::Owned(
                format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}").into_bytes(),
            ))
        }
    }
}

fn mysql_opts(ctx: &JdbcScanContext) -> ScanResult<mysql::Opts> {
    let rest = ctx
        .jdbc_url
        .strip_prefix("jdbc:")
        .unwrap_or(ctx.jdbc_url.as_str());
    let normalized = match rest.strip_prefix("mariadb:") {
        Some(tail) => format!("mysql:{tail}"),
        None => rest.to_string(),
    };
    let mut url = Url::parse(&normalized)
        .map_err(|e| ScanError::connect(format!("invalid mysql url: {e}")))?;
    if let Some(user) = ctx.user.as_deref() {
        url.set_username(user)
            .map_err(|_| ScanError::connect("invalid mysql username"))?;
    }
    if let Some(passwd) = ctx.passwd.as_deref() {
        url.set_password(Some(passwd))
            .map_err(|_| ScanError::connect("invalid mysql password"))?;
    }
    mysql::Opts::from_url(url.as_str()).map_err(|e| ScanError::connect(e.to_string()))
}
