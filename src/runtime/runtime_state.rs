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
use std::sync::Arc;

use crate::common::config;
use crate::runtime::descriptors::DescriptorTbl;

/// Per-fragment-instance execution context handed to data sources, similar to StarRocks BE
/// RuntimeState.
///
/// Data sources read the descriptor table and the chunk size from it; it is shared by every
/// scan of the fragment instance.
#[derive(Clone, Debug)]
pub struct RuntimeState {
    desc_tbl: Arc<DescriptorTbl>,
    chunk_size: usize,
}

impl RuntimeState {
    pub fn new(desc_tbl: DescriptorTbl) -> Self {
        Self {
            desc_tbl: Arc::new(desc_tbl),
            chunk_size: config::jdbc_chunk_size(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn desc_tbl(&self) -> &DescriptorTbl {
        &self.desc_tbl
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(DescriptorTbl::default())
    }
}
