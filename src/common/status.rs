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
//! Error status shared by the driver manager, the scan bridge and data sources.
//!
//! End of stream is not an error: data sources report it as `Ok(None)`.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ScanErrorKind {
    /// Fetching a driver artifact failed (network or filesystem).
    DownloadError,
    /// A downloaded driver artifact does not match its expected checksum.
    IntegrityError,
    /// The foreign runtime could not load the driver class or connect.
    ConnectError,
    /// The foreign runtime rejected the query text.
    QueryError,
    /// Crossing the foreign runtime boundary failed.
    BridgeError,
    /// Invalid descriptors or misuse of the scan lifecycle.
    Internal,
}

impl ScanErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanErrorKind::DownloadError => "DownloadError",
            ScanErrorKind::IntegrityError => "IntegrityError",
            ScanErrorKind::ConnectError => "ConnectError",
            ScanErrorKind::QueryError => "QueryError",
            ScanErrorKind::BridgeError => "BridgeError",
            ScanErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScanError {
    kind: ScanErrorKind,
    message: String,
}

pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    pub fn new(kind: ScanErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::DownloadError, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::IntegrityError, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::ConnectError, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::QueryError, message)
    }

    pub fn bridge(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::BridgeError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ScanErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix the message with `context`, keeping the error kind.
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{context}: {}", self.message),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ScanError {}

impl From<ScanError> for String {
    fn from(err: ScanError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_context_keeps_kind() {
        let err = ScanError::integrity("md5 mismatch").with_context("JDBC driver[pg]");
        assert_eq!(err.kind(), ScanErrorKind::IntegrityError);
        assert_eq!(err.message(), "JDBC driver[pg]: md5 mismatch");
        assert_eq!(
            err.to_string(),
            "IntegrityError: JDBC driver[pg]: md5 mismatch"
        );
    }

    #[test]
    fn converts_into_string_status() {
        let msg: String = ScanError::bridge("detached").into();
        assert_eq!(msg, "BridgeError: detached");
    }
}
