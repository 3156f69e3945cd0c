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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<NovaRocksConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static NovaRocksConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = NovaRocksConfig::load_from_file(path.as_ref())?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn init_from_env_or_default() -> Result<&'static NovaRocksConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = NovaRocksConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn config() -> Result<&'static NovaRocksConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("NOVAROCKS_CONFIG")
        && !p.trim().is_empty()
    {
        return Ok(PathBuf::from(p));
    }

    let local = PathBuf::from("novarocks.toml");
    if local.exists() {
        return Ok(local);
    }

    Err(anyhow!(
        "missing config file: set $NOVAROCKS_CONFIG or create ./novarocks.toml"
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct NovaRocksConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "novarocks_jdbc=debug,hyper=off,reqwest=off"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub jdbc: JdbcConfig,
}

impl NovaRocksConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: NovaRocksConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }

    /// The filter handed to the logging subscriber.
    pub fn effective_log_filter(&self) -> &str {
        self.log_filter
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.log_level)
    }
}

impl Default for NovaRocksConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            runtime: RuntimeConfig::default(),
            jdbc: JdbcConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads of the tokio runtime that drives driver downloads.
    #[serde(default = "default_download_worker_threads")]
    pub download_worker_threads: usize,
}

fn default_download_worker_threads() -> usize {
    2
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            download_worker_threads: default_download_worker_threads(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct JdbcConfig {
    /// Directory holding downloaded driver artifacts.
    /// Defaults to `$NOVAROCKS_HOME/lib/jdbc_drivers`.
    #[serde(default)]
    pub driver_dir: Option<String>,
    #[serde(default = "default_driver_download_timeout_ms")]
    pub driver_download_timeout_ms: u64,
    #[serde(default = "default_driver_download_max_retries")]
    pub driver_download_max_retries: u32,
    #[serde(default = "default_jdbc_chunk_size")]
    pub chunk_size: usize,
    /// 0 keeps pulling empty batches until the driver reports end of stream.
    #[serde(default)]
    pub max_consecutive_empty_batches: u64,
}

fn default_driver_download_timeout_ms() -> u64 {
    300_000
}

fn default_driver_download_max_retries() -> u32 {
    1
}

fn default_jdbc_chunk_size() -> usize {
    4096 // Aligned with StarRocks default `chunk_size`
}

impl Default for JdbcConfig {
    fn default() -> Self {
        Self {
            driver_dir: None,
            driver_download_timeout_ms: default_driver_download_timeout_ms(),
            driver_download_max_retries: default_driver_download_max_retries(),
            chunk_size: default_jdbc_chunk_size(),
            max_consecutive_empty_batches: 0,
        }
    }
}

impl JdbcConfig {
    pub fn resolved_driver_dir(&self) -> PathBuf {
        if let Some(dir) = self.driver_dir.as_deref()
            && !dir.trim().is_empty()
        {
            return PathBuf::from(dir.trim());
        }
        let home = std::env::var("NOVAROCKS_HOME")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| ".".to_string());
        PathBuf::from(home).join("lib").join("jdbc_drivers")
    }
}

#[cfg(test)]
mod tests {
    use super::NovaRocksConfig;

    #[test]
    fn test_jdbc_defaults() {
        let cfg: NovaRocksConfig = toml::from_str(
            r#"
[jdbc]
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.jdbc.chunk_size, 4096);
        assert_eq!(cfg.jdbc.driver_download_max_retries, 1);
        assert_eq!(cfg.jdbc.driver_download_timeout_ms, 300_000);
        assert_eq!(cfg.jdbc.max_consecutive_empty_batches, 0);
        assert!(cfg.jdbc.driver_dir.is_none());
        assert_eq!(cfg.runtime.download_worker_threads, 2);
    }

    #[test]
    fn test_jdbc_can_be_overridden() {
        let cfg: NovaRocksConfig = toml::from_str(
            r#"
log_level = "debug"

[runtime]
download_worker_threads = 4

[jdbc]
driver_dir = "/opt/drivers"
chunk_size = 1024
max_consecutive_empty_batches = 100
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.runtime.download_worker_threads, 4);
        assert_eq!(cfg.jdbc.chunk_size, 1024);
        assert_eq!(cfg.jdbc.max_consecutive_empty_batches, 100);
        assert_eq!(
            cfg.jdbc.resolved_driver_dir(),
            std::path::PathBuf::from("/opt/drivers")
        );
    }

    #[test]
    fn test_log_filter_takes_precedence() {
        let cfg: NovaRocksConfig = toml::from_str(
            r#"
log_level = "warn"
log_filter = "novarocks_jdbc=debug"
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.effective_log_filter(), "novarocks_jdbc=debug");

        let cfg = NovaRocksConfig::default();
        assert_eq!(cfg.effective_log_filter(), "info");
    }
}
