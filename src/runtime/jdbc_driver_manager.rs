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
//! Process-wide cache of JDBC driver artifacts.
//!
//! Responsibilities:
//! - Resolves a driver identity (name, url, checksum) to a verified local file.
//! - Downloads each distinct identity at most once; concurrent callers for the same identity
//!   wait for the in-flight attempt and share its outcome.
//! - Never publishes a file whose MD5 does not match the expected checksum.
//!
//! Cache layout: `<driver_dir>/<name>_<checksum>.jar`, written through a `*.tmp` file in the
//! same directory and renamed into place after verification.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use md5::{Digest, Md5};
use url::Url;

use crate::common::config;
use crate::common::status::{ScanError, ScanErrorKind, ScanResult};
use crate::novarocks_logging::{debug, info, warn};
use crate::runtime::global_async_runtime::block_on_download;

const TMP_SUFFIX: &str = ".tmp";
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Driver identity as stored in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JdbcDriverIdentity {
    pub name: String,
    pub url: String,
    pub checksum: String,
    pub class_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct DriverKey {
    name: String,
    url: String,
    checksum: String,
}

impl DriverKey {
    fn from_identity(identity: &JdbcDriverIdentity) -> Self {
        Self {
            name: identity.name.trim().to_string(),
            url: identity.url.trim().to_string(),
            checksum: identity.checksum.trim().to_ascii_lowercase(),
        }
    }

    fn file_name(&self) -> String {
        format!(
            "{}_{}.jar",
            sanitize_file_component(&self.name),
            sanitize_file_component(&self.checksum)
        )
    }
}

/// A verified driver file. Immutable once published.
#[derive(Debug, PartialEq, Eq)]
pub struct JdbcDriverArtifact {
    name: String,
    url: String,
    checksum: String,
    location: PathBuf,
}

impl JdbcDriverArtifact {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

#[derive(Default)]
struct DriverFlight {
    outcome: OnceLock<ScanResult<Arc<JdbcDriverArtifact>>>,
}

pub struct JdbcDriverManager {
    driver_dir: PathBuf,
    download_timeout: Duration,
    max_retries: u32,
    flights: Mutex<HashMap<DriverKey, Arc<DriverFlight>>>,
    download_attempts: AtomicU64,
}

static DRIVER_MANAGER: OnceLock<Arc<JdbcDriverManager>> = OnceLock::new();

impl JdbcDriverManager {
    pub fn new(driver_dir: impl Into<PathBuf>) -> Self {
        Self {
            driver_dir: driver_dir.into(),
            download_timeout: config::jdbc_driver_download_timeout(),
            max_retries: config::jdbc_driver_download_max_retries(),
            flights: Mutex::new(HashMap::new()),
            download_attempts: AtomicU64::new(0),
        }
    }

    /// The process-wide manager rooted at the configured driver directory.
    pub fn instance() -> Arc<JdbcDriverManager> {
        let manager = DRIVER_MANAGER.get_or_init(|| {
            let manager = JdbcDriverManager::new(config::jdbc_driver_dir());
            if let Err(e) = manager.init() {
                warn!(
                    driver_dir = %manager.driver_dir.display(),
                    error = %e,
                    "init jdbc driver directory failed, will retry on first download"
                );
            }
            Arc::new(manager)
        });
        Arc::clone(manager)
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn driver_dir(&self) -> &Path {
        &self.driver_dir
    }

    /// Create the driver directory and drop leftovers of interrupted downloads.
    pub fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.driver_dir)?;
        for entry in fs::read_dir(&self.driver_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_tmp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TMP_SUFFIX));
            if is_tmp && entry.file_type()?.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale jdbc driver temp file"),
                    Err(e) => warn!(path = %path.display(), error = %e, "remove stale jdbc driver temp file failed"),
                }
            }
        }
        Ok(())
    }

    /// Resolve `identity` to a verified local driver file, downloading it if needed.
    pub fn get_driver_location(
        &self,
        identity: &JdbcDriverIdentity,
    ) -> ScanResult<Arc<JdbcDriverArtifact>> {
        if identity.name.trim().is_empty() {
            return Err(ScanError::internal("jdbc driver name is empty"));
        }
        if identity.checksum.trim().is_empty() {
            return Err(ScanError::internal(format!(
                "jdbc driver {} has an empty checksum",
                identity.name
            )));
        }

        let key = DriverKey::from_identity(identity);
        let flight = {
            let mut flights = self.flights.lock().expect("jdbc driver registry lock");
            Arc::clone(flights.entry(key.clone()).or_default())
        };

        let outcome = flight.outcome.get_or_init(|| self.load_driver(&key));
        if outcome.is_err() {
            self.evict_failed(&key, &flight);
        }
        outcome.clone()
    }

    /// Number of fetch attempts (downloads or copies) issued so far.
    pub fn download_attempts(&self) -> u64 {
        self.download_attempts.load(Ordering::Acquire)
    }

    /// Number of identities currently resolved to a verified file.
    pub fn cached_drivers(&self) -> usize {
        let flights = self.flights.lock().expect("jdbc driver registry lock");
        flights
            .values()
            .filter(|f| matches!(f.outcome.get(), Some(Ok(_))))
            .count()
    }

    fn evict_failed(&self, key: &DriverKey, flight: &Arc<DriverFlight>) {
        let mut flights = self.flights.lock().expect("jdbc driver registry lock");
        if flights
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            flights.remove(key);
        }
    }

    fn load_driver(&self, key: &DriverKey) -> ScanResult<Arc<JdbcDriverArtifact>> {
        let location = self.driver_dir.join(key.file_name());
        if location.is_file() {
            match file_checksum(&location) {
                Ok(actual) if actual == key.checksum => {
                    info!(
                        driver = %key.name,
                        location = %location.display(),
                        "reuse verified jdbc driver on disk"
                    );
                    return Ok(Arc::new(self.artifact(key, location)));
                }
                Ok(actual) => {
                    warn!(
                        driver = %key.name,
                        location = %location.display(),
                        expected = %key.checksum,
                        actual = %actual,
                        "jdbc driver on disk is corrupt, downloading again"
                    );
                    let _ = fs::remove_file(&location);
                }
                Err(e) => {
                    warn!(driver = %key.name, error = %e, "read cached jdbc driver failed, downloading again");
                }
            }
        }

        let mut attempt = 0u32;
        loop {
            match self.download_driver(key, &location) {
                Ok(()) => {
                    info!(
                        driver = %key.name,
                        url = %key.url,
                        location = %location.display(),
                        "jdbc driver downloaded"
                    );
                    return Ok(Arc::new(self.artifact(key, location)));
                }
                Err(e) if e.kind() == ScanErrorKind::DownloadError && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        driver = %key.name,
                        attempt,
                        error = %e,
                        "download jdbc driver failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn artifact(&self, key: &DriverKey, location: PathBuf) -> JdbcDriverArtifact {
        JdbcDriverArtifact {
            name: key.name.clone(),
            url: key.url.clone(),
            checksum: key.checksum.clone(),
            location,
        }
    }

    fn download_driver(&self, key: &DriverKey, location: &Path) -> ScanResult<()> {
        self.download_attempts.fetch_add(1, Ordering::AcqRel);
        fs::create_dir_all(&self.driver_dir).map_err(|e| {
            ScanError::download(format!(
                "create jdbc driver dir {} failed: {e}",
                self.driver_dir.display()
            ))
        })?;
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", key.file_name()))
            .suffix(TMP_SUFFIX)
            .tempfile_in(&self.driver_dir)
            .map_err(|e| ScanError::download(format!("create temp file for jdbc driver: {e}")))?;

        let mut writer = DigestWriter::new(tmp);
        fetch_into(&key.url, self.download_timeout, &mut writer).map_err(|e| {
            ScanError::download(format!("download jdbc driver from {} failed: {e}", key.url))
        })?;
        let (tmp, actual) = writer.finish();

        if actual != key.checksum {
            // Dropping the temp file deletes it; nothing is published.
            return Err(ScanError::integrity(format!(
                "jdbc driver {} checksum mismatch: expected {}, actual {}",
                key.name, key.checksum, actual
            )));
        }

        tmp.as_file()
            .sync_all()
            .map_err(|e| ScanError::download(format!("sync jdbc driver temp file: {e}")))?;
        tmp.persist(location).map_err(|e| {
            ScanError::download(format!(
                "publish jdbc driver to {} failed: {}",
                location.display(),
                e.error
            ))
        })?;
        Ok(())
    }
}

/// MD5 of a file's content as lowercase hex.
pub fn file_checksum(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn sanitize_file_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

struct DigestWriter<W> {
    inner: W,
    hasher: Md5,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
        }
    }

    fn finish(self) -> (W, String) {
        (self.inner, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum DriverSource {
    Http(String),
    Local(PathBuf),
}

fn parse_driver_source(url: &str) -> Result<DriverSource, String> {
    match Url::parse(url) {
        Ok(parsed) => match parsed.scheme() {
            "http" | "https" => Ok(DriverSource::Http(url.to_string())),
            "file" => parsed
                .to_file_path()
                .map(DriverSource::Local)
                .map_err(|_| format!("invalid file url: {url}")),
            other => Err(format!("unsupported jdbc driver url scheme: {other}")),
        },
        // Plain filesystem paths have no scheme.
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(DriverSource::Local(PathBuf::from(url))),
        Err(e) => Err(format!("invalid jdbc driver url {url}: {e}")),
    }
}

fn fetch_into<W: Write>(url: &str, timeout: Duration, out: &mut W) -> Result<u64, String> {
    match parse_driver_source(url)? {
        DriverSource::Local(path) => {
            let mut file =
                File::open(&path).map_err(|e| format!("open {}: {e}", path.display()))?;
            io::copy(&mut file, out).map_err(|e| format!("copy {}: {e}", path.display()))
        }
        DriverSource::Http(url) => block_on_download(fetch_http(url, timeout, out))?,
    }
}

async fn fetch_http<W: Write>(url: String, timeout: Duration, out: &mut W) -> Result<u64, String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("build http client: {e}"))?;
    let mut response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("request: {e}"))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("http status {status}"));
    }
    let mut total = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| format!("read body: {e}"))?
    {
        out.write_all(&chunk).map_err(|e| format!("write: {e}"))?;
        total += chunk.len() as u64;
    }
    Ok(total)
}
