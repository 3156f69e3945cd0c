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
use std::path::PathBuf;
use std::time::Duration;

use crate::novarocks_config::{JdbcConfig, config as novarocks_app_config};

pub(crate) fn download_worker_threads() -> usize {
    novarocks_app_config()
        .ok()
        .map(|c| c.runtime.download_worker_threads)
        .unwrap_or(2)
}

pub(crate) fn jdbc_driver_dir() -> PathBuf {
    novarocks_app_config()
        .ok()
        .map(|c| c.jdbc.resolved_driver_dir())
        .unwrap_or_else(|| JdbcConfig::default().resolved_driver_dir())
}

pub(crate) fn jdbc_driver_download_timeout() -> Duration {
    let ms = novarocks_app_config()
        .ok()
        .map(|c| c.jdbc.driver_download_timeout_ms)
        .unwrap_or(300_000);
    Duration::from_millis(ms.max(1))
}

pub(crate) fn jdbc_driver_download_max_retries() -> u32 {
    novarocks_app_config()
        .ok()
        .map(|c| c.jdbc.driver_download_max_retries)
        .unwrap_or(1)
}

pub(crate) fn jdbc_chunk_size() -> usize {
    novarocks_app_config()
        .ok()
        .map(|c| c.jdbc.chunk_size)
        .unwrap_or(4096)
        .max(1)
}

pub(crate) fn jdbc_max_consecutive_empty_batches() -> u64 {
    novarocks_app_config()
        .ok()
        .map(|c| c.jdbc.max_consecutive_empty_batches)
        .unwrap_or(0)
}
