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
//! Connector framework: connectors create one data source provider per scan node, providers
//! create one data source per scan range.

pub mod jdbc;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::common::status::{ScanError, ScanResult};
use crate::exec::chunk::Chunk;
use crate::novarocks_logging::warn;
use crate::runtime::jdbc_driver_manager::JdbcDriverManager;
use crate::runtime::runtime_state::RuntimeState;

pub use jdbc::native_bridge::NativeJdbcBridgeFactory;
pub use jdbc::scanner::JdbcBridgeFactory;
pub use jdbc::{JdbcDataSource, JdbcDataSourceProvider, JdbcScanNode};

/// Pull-based reader for one scan range.
///
/// Calls on one data source are sequential, though successive calls may come from different
/// threads. `get_next` returns `Ok(None)` at end of stream.
pub trait DataSource: Send {
    fn name(&self) -> String;
    fn open(&mut self, state: &RuntimeState) -> ScanResult<()>;
    fn get_next(&mut self, state: &RuntimeState) -> ScanResult<Option<Chunk>>;
    /// Safe to call repeatedly and without a prior `open`.
    fn close(&mut self, state: &RuntimeState);

    fn raw_rows_read(&self) -> u64;
    fn num_rows_read(&self) -> u64;
    fn num_bytes_read(&self) -> u64;
    fn set_read_limit(&mut self, limit: Option<u64>);
}

pub type DataSourcePtr = Box<dyn DataSource>;

/// Unit of work assigned to one data source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanRange {
    pub index: usize,
}

impl ScanRange {
    /// The one logical range of sources that cannot be split.
    pub fn single() -> Self {
        Self { index: 0 }
    }
}

pub trait DataSourceProvider: Send + Sync {
    fn create_data_source(&self, scan_range: &ScanRange) -> DataSourcePtr;
}

#[derive(Clone, Debug)]
pub enum ScanPlanNode {
    Jdbc(JdbcScanNode),
}

pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;
    fn create_data_source_provider(
        &self,
        node: &ScanPlanNode,
    ) -> ScanResult<Arc<dyn DataSourceProvider>>;
}

pub struct JdbcConnector {
    name: &'static str,
    driver_manager: Arc<JdbcDriverManager>,
    bridge_factory: Arc<dyn JdbcBridgeFactory>,
}

impl JdbcConnector {
    pub fn with_services(
        name: &'static str,
        driver_manager: Arc<JdbcDriverManager>,
        bridge_factory: Arc<dyn JdbcBridgeFactory>,
    ) -> Self {
        Self {
            name,
            driver_manager,
            bridge_factory,
        }
    }
}

impl Connector for JdbcConnector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn create_data_source_provider(
        &self,
        node: &ScanPlanNode,
    ) -> ScanResult<Arc<dyn DataSourceProvider>> {
        match node {
            ScanPlanNode::Jdbc(node) => Ok(Arc::new(JdbcDataSourceProvider::new(
                node.clone(),
                Arc::clone(&self.driver_manager),
                Arc::clone(&self.bridge_factory),
            ))),
        }
    }
}

#[derive(Clone)]
pub struct ConnectorManager {
    connectors: HashMap<&'static str, Arc<dyn Connector>>,
}

impl ConnectorManager {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// The built-in `jdbc` and `mysql` connectors over the given services.
    pub fn with_jdbc_services(
        driver_manager: Arc<JdbcDriverManager>,
        bridge_factory: Arc<dyn JdbcBridgeFactory>,
    ) -> Self {
        let mut manager = ConnectorManager::new();
        for name in ["jdbc", "mysql"] {
            manager.register_connector(Arc::new(JdbcConnector::with_services(
                name,
                Arc::clone(&driver_manager),
                Arc::clone(&bridge_factory),
            )));
        }
        manager
    }

    /// The process-wide registry with the built-in connectors.
    pub fn instance() -> &'static ConnectorManager {
        static MANAGER: OnceLock<ConnectorManager> = OnceLock::new();
        MANAGER.get_or_init(ConnectorManager::default)
    }

    pub fn register_connector(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.name(), connector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(name).cloned()
    }

    pub fn create_data_source_provider(
        &self,
        connector_name: &str,
        node: &ScanPlanNode,
    ) -> ScanResult<Arc<dyn DataSourceProvider>> {
        let Some(connector) = self.connectors.get(connector_name) else {
            return Err(ScanError::internal(format!(
                "unknown connector: {connector_name}"
            )));
        };
        connector.create_data_source_provider(node)
    }
}

impl Default for ConnectorManager {
    fn default() -> Self {
        Self::with_jdbc_services(JdbcDriverManager::instance(), Arc::new(NativeJdbcBridgeFactory))
    }
}

impl std::fmt::Debug for ConnectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.connectors.keys().copied().collect();
        names.sort();
        f.debug_struct("ConnectorManager")
            .field("connectors", &names)
            .finish()
    }
}

/// Iterator over the chunks of an opened data source. The source is closed at end of stream,
/// after the first error, or when the iterator is dropped.
pub struct DataSourceIter {
    source: DataSourcePtr,
    state: RuntimeState,
    finished: bool,
}

impl DataSourceIter {
    pub fn open(mut source: DataSourcePtr, state: RuntimeState) -> ScanResult<Self> {
        if let Err(e) = source.open(&state) {
            source.close(&state);
            return Err(e);
        }
        Ok(Self {
            source,
            state,
            finished: false,
        })
    }

    pub fn data_source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.source.close(&self.state);
        }
    }
}

impl Iterator for DataSourceIter {
    type Item = ScanResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.source.get_next(&self.state) {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                warn!(source = %self.source.name(), error = %e, "data source failed, closing");
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl Drop for DataSourceIter {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::status::ScanErrorKind;
    use crate::connector::jdbc::test_bridge::Step;
    use crate::connector::jdbc::tests::Fixture;
    use std::sync::atomic::Ordering;

    #[test]
    fn builtin_connectors_register_jdbc_names() {
        let cache = tempfile::tempdir().expect("cache dir");
        let manager = ConnectorManager::with_jdbc_services(
            Arc::new(JdbcDriverManager::new(cache.path())),
            Arc::new(NativeJdbcBridgeFactory),
        );
        assert!(manager.get("jdbc").is_some());
        assert!(manager.get("mysql").is_some());
        assert!(manager.get("hive").is_none());
        assert_eq!(
            format!("{manager:?}"),
            "ConnectorManager { connectors: [\"jdbc\", \"mysql\"] }"
        );
    }

    #[test]
    fn unknown_connector_is_internal_error() {
        let fixture = Fixture::new(vec![]);
        let err = match ConnectorManager::new()
            .create_data_source_provider("jdbc", &ScanPlanNode::Jdbc(fixture.node.clone()))
        {
            Ok(_) => panic!("empty manager has no connectors"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), ScanErrorKind::Internal);
    }

    #[test]
    fn iter_closes_at_end_of_stream() {
        let fixture = Fixture::new(vec![Step::Rows(2), Step::Rows(0), Step::RowsEos(1)]);
        let source = fixture.provider().create_data_source(&ScanRange::single());
        let iter = DataSourceIter::open(source, fixture.state.clone()).expect("open");
        let sizes: Vec<usize> = iter.map(|c| c.expect("chunk").len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(fixture.calls.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn iter_closes_after_error_and_on_drop() {
        let fixture = Fixture::new(vec![Step::Rows(1), Step::Fail(ScanError::bridge("boom"))]);
        let source = fixture.provider().create_data_source(&ScanRange::single());
        let mut iter = DataSourceIter::open(source, fixture.state.clone()).expect("open");
        assert_eq!(iter.next().expect("first").expect("chunk").len(), 1);
        assert_eq!(
            iter.next().expect("second").expect_err("error").kind(),
            ScanErrorKind::BridgeError
        );
        assert!(iter.next().is_none());
        drop(iter);
        assert_eq!(fixture.calls.closes.load(Ordering::SeqCst), 1);

        let fixture = Fixture::new(vec![Step::Rows(1), Step::Rows(1)]);
        let source = fixture.provider().create_data_source(&ScanRange::single());
        let mut iter = DataSourceIter::open(source, fixture.state.clone()).expect("open");
        iter.next().expect("first").expect("chunk");
        assert_eq!(iter.data_source().num_rows_read(), 1);
        drop(iter);
        assert_eq!(fixture.calls.closes.load(Ordering::SeqCst), 1);
    }
}
