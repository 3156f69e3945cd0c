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
//! Tokio runtime behind driver downloads. The scan path is synchronous, so HTTP fetches are
//! driven to completion with `block_on_download`.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::common::config::download_worker_threads;
use crate::novarocks_logging::info;

static DOWNLOAD_RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();

fn download_runtime() -> Result<&'static Runtime, String> {
    DOWNLOAD_RUNTIME
        .get_or_init(|| {
            let worker_threads = download_worker_threads().max(1);
            let runtime = Builder::new_multi_thread()
                .enable_all()
                .worker_threads(worker_threads)
                .thread_name("jdbc-driver-download")
                .build()
                .map_err(|e| format!("init driver download runtime failed: {e}"))?;
            info!(worker_threads, "driver download runtime initialized");
            Ok(runtime)
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Run `future` on the download runtime from a synchronous thread.
pub(crate) fn block_on_download<F: Future>(future: F) -> Result<F::Output, String> {
    if Handle::try_current().is_ok() {
        return Err("driver download cannot block inside an async runtime".to_string());
    }
    Ok(download_runtime()?.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_is_shared_across_threads() {
        let expected = download_runtime().expect("runtime") as *const Runtime as usize;
        let seen: Vec<usize> = (0..4)
            .map(|_| {
                std::thread::spawn(|| download_runtime().expect("runtime") as *const Runtime as usize)
            })
            .map(|h| h.join().expect("join"))
            .collect();
        assert!(seen.iter().all(|p| *p == expected));
    }

    #[test]
    fn blocks_on_future_from_sync_thread() {
        let value = block_on_download(async { 7_i32 }).expect("block on");
        assert_eq!(value, 7);
    }

    #[test]
    fn rejects_nested_block_on() {
        let runtime = download_runtime().expect("runtime");
        let err = runtime
            .block_on(async { block_on_download(async { 1_u8 }).expect_err("nested") });
        assert!(err.contains("inside an async runtime"), "{err}");
    }
}
