// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ratelimit::KeyValueStore;
use crate::redact::redact_fields;
use crate::store::{Collection, Document, Operation, Query, QueryResult, Store, StoreError, merge_into};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Housebudget", "housebudget"));

pub const DB_ENV: &str = "HOUSEBUDGET_DB";

pub fn db_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p.trim()));
        }
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("housebudget.sqlite"))
}

pub fn open_or_init() -> Result<SqliteStore> {
    let path = db_path()?;
    SqliteStore::open(&path)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- every entity collection shares one table; bodies are JSON objects
    CREATE TABLE IF NOT EXISTS documents(
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        body TEXT NOT NULL,
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY(collection, id)
    );
    CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
    "#,
    )?;
    Ok(())
}

/// Document store on a local SQLite file. Each `transact` batch runs inside
/// one SQLite transaction.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn =
            Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
        init_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn load(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection=?1 AND id=?2",
                params![collection.name(), id],
                |r| r.get(0),
            )
            .optional()?;
        match body {
            Some(s) => Ok(Some(parse_body(&s, id)?)),
            None => Ok(None),
        }
    }

    fn apply(&self, op: &Operation) -> Result<(), StoreError> {
        match op {
            Operation::Update { collection, id, fields } => {
                let mut doc = self.load(*collection, id)?.unwrap_or_default();
                doc.insert("id".into(), Value::String(id.clone()));
                merge_into(&mut doc, fields);
                let body = serde_json::to_string(&doc)?;
                self.conn.execute(
                    "INSERT INTO documents(collection, id, body) VALUES (?1, ?2, ?3)
                     ON CONFLICT(collection, id) DO UPDATE SET body=excluded.body, updated_at=datetime('now')",
                    params![collection.name(), id, body],
                )?;
            }
            Operation::Delete { collection, id } => {
                self.conn.execute(
                    "DELETE FROM documents WHERE collection=?1 AND id=?2",
                    params![collection.name(), id],
                )?;
            }
        }
        Ok(())
    }
}

fn parse_body(s: &str, id: &str) -> Result<Document, StoreError> {
    match serde_json::from_str::<Value>(s)? {
        Value::Object(mut map) => {
            map.insert("id".into(), Value::String(id.to_string()));
            Ok(map)
        }
        _ => Err(StoreError::Unavailable(format!(
            "document body is not an object ({})",
            crate::redact::redact(id)
        ))),
    }
}

fn describe(ops: &[Operation]) -> String {
    ops.iter()
        .map(|op| match op {
            Operation::Update { collection, fields, .. } => {
                let mut v = Value::Object(fields.clone());
                redact_fields(&mut v);
                format!("update {} {}", collection, v)
            }
            Operation::Delete { collection, .. } => format!("delete {}", collection),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl Store for SqliteStore {
    fn query_once(&self, queries: &[Query]) -> Result<QueryResult, StoreError> {
        let mut res = QueryResult::default();
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, body FROM documents WHERE collection=?1 ORDER BY rowid")?;
        for q in queries {
            res.ensure(q.collection);
            let mut rows = stmt.query(params![q.collection.name()])?;
            while let Some(r) = rows.next()? {
                let id: String = r.get(0)?;
                let body: String = r.get(1)?;
                let doc = parse_body(&body, &id)?;
                if q.matches(&doc) {
                    res.push(q.collection, doc);
                }
            }
        }
        Ok(res)
    }

    fn transact(&self, ops: Vec<Operation>) -> Result<(), StoreError> {
        tracing::debug!(ops = ops.len(), detail = %describe(&ops), "applying batch");
        let tx = self.conn.unchecked_transaction()?;
        for op in &ops {
            self.apply(op)?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let v: Option<String> = self
            .conn
            .query_row("SELECT value FROM settings WHERE key=?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(v)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO settings(key, value) VALUES(?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM settings WHERE key=?1", params![key])?;
        Ok(())
    }
}
