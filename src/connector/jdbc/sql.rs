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
//! SELECT statement synthesis for JDBC scans.
//!
//! Projected columns, pushed-down predicates and the table name arrive from the planner as SQL
//! text in the remote database's dialect. They are concatenated verbatim, never escaped.

use std::fmt;

/// A piece of SQL text the planner vouches for. It is embedded into the generated statement
/// as-is.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SqlFragment(String);

impl SqlFragment {
    pub fn trusted(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds `SELECT c1, c2 FROM t[ WHERE (f1) AND (f2)][ LIMIT n]`.
///
/// An empty projection yields `SELECT FROM t`; callers that need a row count without columns
/// get whatever the remote dialect makes of it.
pub fn build_jdbc_sql(
    table: &SqlFragment,
    columns: &[SqlFragment],
    filters: &[SqlFragment],
    limit: Option<u64>,
) -> String {
    let mut sql = String::from("SELECT");
    for (i, column) in columns.iter().enumerate() {
        sql.push_str(if i == 0 { " " } else { ", " });
        sql.push_str(column.as_str());
    }
    sql.push_str(" FROM ");
    sql.push_str(table.as_str());
    for (i, filter) in filters.iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE (" } else { " AND (" });
        sql.push_str(filter.as_str());
        sql.push(')');
    }
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ");
        sql.push_str(&limit.to_string());
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frags(items: &[&str]) -> Vec<SqlFragment> {
        items.iter().map(|s| SqlFragment::trusted(*s)).collect()
    }

    #[test]
    fn full_statement() {
        let sql = build_jdbc_sql(
            &SqlFragment::trusted("t"),
            &frags(&["a", "b"]),
            &frags(&["a>1", "b<5"]),
            Some(10),
        );
        assert_eq!(sql, "SELECT a, b FROM t WHERE (a>1) AND (b<5) LIMIT 10");
    }

    #[test]
    fn no_filters_no_limit() {
        let sql = build_jdbc_sql(&SqlFragment::trusted("t"), &frags(&["a"]), &[], None);
        assert_eq!(sql, "SELECT a FROM t");
    }

    #[test]
    fn single_filter_is_parenthesized() {
        let sql = build_jdbc_sql(
            &SqlFragment::trusted("db.orders"),
            &frags(&["`id`", "`amount`"]),
            &frags(&["`amount` > 1 OR `id` = 2"]),
            None,
        );
        assert_eq!(
            sql,
            "SELECT `id`, `amount` FROM db.orders WHERE (`amount` > 1 OR `id` = 2)"
        );
    }

    #[test]
    fn empty_projection_is_degenerate_but_accepted() {
        let sql = build_jdbc_sql(&SqlFragment::trusted("t"), &[], &[], Some(0));
        assert_eq!(sql, "SELECT FROM t LIMIT 0");
    }

    #[test]
    fn fragments_are_not_escaped() {
        let sql = build_jdbc_sql(
            &SqlFragment::trusted("t"),
            &frags(&["name"]),
            &frags(&["name = 'o''brien'"]),
            None,
        );
        assert_eq!(sql, "SELECT name FROM t WHERE (name = 'o''brien')");
    }
}
