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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use md5::{Digest, Md5};
use tempfile::TempDir;

use novarocks_jdbc::novarocks_config;
use novarocks_jdbc::novarocks_logging;

/// Test configuration for integration tests.
pub struct TestConfig {
    /// Temporary directory for test artifacts
    pub temp_dir: TempDir,
    /// Test config path
    pub config_path: PathBuf,
}

impl TestConfig {
    /// Create a new test configuration with default settings.
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("test_novarocks.toml");
        let driver_dir = temp_dir.path().join("jdbc_drivers");

        let config_content = format!(
            r#"
log_level = "debug"

[runtime]
download_worker_threads = 1

[jdbc]
driver_dir = "{}"
driver_download_timeout_ms = 5000
driver_download_max_retries = 0
chunk_size = 2
"#,
            driver_dir.display()
        );

        std::fs::write(&config_path, config_content)?;

        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    /// Initialize logging for tests.
    pub fn init_logging(&self) {
        novarocks_logging::init_with_level("debug");
    }

    /// Parse the test configuration without installing it process-wide.
    pub fn parse_config(&self) -> anyhow::Result<novarocks_config::NovaRocksConfig> {
        novarocks_config::NovaRocksConfig::load_from_file(&self.config_path)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new().expect("Failed to create test config")
    }
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// A stand-in driver artifact on local disk.
pub struct DriverJar {
    pub dir: TempDir,
    pub path: PathBuf,
    pub checksum: String,
}

impl DriverJar {
    pub fn new(content: &[u8]) -> Self {
        let dir = tempfile::tempdir().expect("driver dir");
        let path = dir.path().join("driver.jar");
        std::fs::write(&path, content).expect("write driver jar");
        Self {
            dir,
            path,
            checksum: md5_hex(content),
        }
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// SQLite database with an `orders` table:
///
/// | id | name  | amount | paid | day        |
/// |----|-------|--------|------|------------|
/// | 1  | alice | 5.5    | 1    | 2024-01-01 |
/// | 2  | bob   | 12.0   | 0    | 2024-01-02 |
/// | 3  | NULL  | 20.25  | 1    | 2024-01-03 |
/// | 4  | dave  | 7.0    | 0    | NULL       |
/// | 5  | erin  | 99.0   | 1    | 2024-02-29 |
pub struct SqliteOrders {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl SqliteOrders {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("sqlite dir");
        let path = dir.path().join("orders.db");
        let conn = rusqlite::Connection::open(&path).expect("open sqlite");
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER, name TEXT, amount REAL, paid INTEGER, day TEXT);
             INSERT INTO orders VALUES
               (1, 'alice', 5.5, 1, '2024-01-01'),
               (2, 'bob', 12.0, 0, '2024-01-02'),
               (3, NULL, 20.25, 1, '2024-01-03'),
               (4, 'dave', 7.0, 0, NULL),
               (5, 'erin', 99.0, 1, '2024-02-29');",
        )
        .expect("seed sqlite");
        Self { dir, path }
    }

    pub fn jdbc_url(&self) -> String {
        format!("jdbc:sqlite:{}", self.path.display())
    }
}

/// Serve `body` over HTTP on a local port for up to `max_requests` requests.
/// Returns the URL and a counter of requests served.
pub fn serve_http(body: Vec<u8>, max_requests: usize) -> (String, Arc<AtomicUsize>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind http listener");
    let addr = listener.local_addr().expect("local addr");
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);
    let handle = std::thread::spawn(move || {
        for stream in listener.incoming().take(max_requests) {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut line = String::new();
            // Drain request headers.
            while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                if line == "\r\n" || line == "\n" {
                    break;
                }
                line.clear();
            }
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/java-archive\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    (format!("http://{addr}/drivers/driver.jar"), served, handle)
}

/// Run `f` and fail the test if it does not finish within `timeout`.
pub fn run_with_timeout<F, T>(timeout: Duration, f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    use std::sync::mpsc;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });

    match rx.recv_timeout(timeout) {
        Ok(v) => v,
        Err(_) => panic!("test timed out after {:?}", timeout),
    }
}

/// Assert that a result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(_) => panic!("Expected Err, got Ok"),
            Err(e) => e,
        }
    };
}
