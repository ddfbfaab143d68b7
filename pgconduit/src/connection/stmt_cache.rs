//! Prepared-statement cache keyed by SQL text, so repeated `execute`/`fetch`
//! calls with the same query skip re-parsing on the server (spec.md §4.3:
//! "a prepared statement's name is derived from the SQL text... reused
//! across calls on the same connection").

use std::collections::HashMap;

use crate::message::backend::{FieldDescription, ParameterDescription};

#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub name: String,
    pub param_oids: Vec<u32>,
    pub fields: Vec<FieldDescription>,
}

#[derive(Default)]
pub struct StatementCache {
    entries: HashMap<String, PreparedStatement>,
    next_id: u64,
}

impl StatementCache {
    pub fn new() -> Self {
        StatementCache::default()
    }

    pub fn get(&self, sql: &str) -> Option<&PreparedStatement> {
        self.entries.get(sql)
    }

    pub fn next_statement_name(&mut self) -> String {
        self.next_id += 1;
        format!("pgconduit_stmt_{}", self.next_id)
    }

    pub fn insert(
        &mut self,
        sql: String,
        name: String,
        param_oids: Vec<u32>,
        description: Option<ParameterDescription>,
        fields: Vec<FieldDescription>,
    ) {
        let param_oids = description.map(|d| d.oids).unwrap_or(param_oids);
        self.entries.insert(sql, PreparedStatement { name, param_oids, fields });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
