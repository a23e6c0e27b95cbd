//! SQLite persistence for nodes.
//!
//! One append-only table keyed by node id. Rows hold the node's wire JSON;
//! nothing is decoded into columns beyond what lookups need.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use taskweave_types::{Node, NodeId, TaskId};

use crate::error::KernelResult;
use crate::storage::NodeLog;

const SCHEMA: &str = r#"
-- Nodes (append-only, immutable)
CREATE TABLE IF NOT EXISTS nodes (
    seq INTEGER PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    task_id TEXT NOT NULL,
    body TEXT NOT NULL,
    stored_at INTEGER DEFAULT (unixepoch())
);
CREATE INDEX IF NOT EXISTS idx_nodes_task ON nodes(task_id, seq);
"#;

/// Node log backed by a SQLite database.
pub struct SqliteLog {
    conn: Mutex<Connection>,
}

impl SqliteLog {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert one node unless its id is already stored.
    pub fn insert(&self, node: &Node) -> KernelResult<bool> {
        let body = serde_json::to_string(node)?;
        let changed = self.conn.lock().execute(
            "INSERT OR IGNORE INTO nodes (id, task_id, body) VALUES (?1, ?2, ?3)",
            params![node.id.as_str(), node.task_id.as_str(), body],
        )?;
        Ok(changed == 1)
    }

    /// Insert a batch in one transaction; returns how many were new.
    pub fn insert_many(&self, nodes: &[Node]) -> KernelResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO nodes (id, task_id, body) VALUES (?1, ?2, ?3)")?;
            for node in nodes {
                let body = serde_json::to_string(node)?;
                added += stmt.execute(params![node.id.as_str(), node.task_id.as_str(), body])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    /// Raw rows in append order. Rows are returned undecoded so a single
    /// corrupt body cannot hide the rest.
    pub fn bodies(&self) -> SqliteResult<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, body FROM nodes ORDER BY seq")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    /// Nodes of one task, in append order. Undecodable rows are skipped.
    pub fn task_nodes(&self, task: &TaskId) -> SqliteResult<Vec<Node>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, body FROM nodes WHERE task_id = ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![task.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut nodes = Vec::new();
        for row in rows {
            let (id, body) = row?;
            if let Some(node) = decode(&id, &body) {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    pub fn get(&self, id: &NodeId) -> SqliteResult<Option<Node>> {
        let body: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT body FROM nodes WHERE id = ?1", params![id.as_str()], |row| row.get(0))
            .optional()?;
        Ok(body.and_then(|b| decode(id.as_str(), &b)))
    }

    pub fn count(&self) -> SqliteResult<i64> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
    }

    /// Delete nodes by id in one transaction.
    pub fn delete_many(&self, ids: &BTreeSet<NodeId>) -> SqliteResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM nodes WHERE id = ?1")?;
            for id in ids {
                removed += stmt.execute(params![id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }
}

fn decode(id: &str, body: &str) -> Option<Node> {
    match serde_json::from_str(body) {
        Ok(node) => Some(node),
        Err(e) => {
            tracing::warn!(row = id, error = %e, "discarding undecodable stored node");
            None
        }
    }
}

#[async_trait]
impl NodeLog for SqliteLog {
    async fn append(&self, node: &Node) -> KernelResult<bool> {
        self.insert(node)
    }

    async fn read_all(&self) -> KernelResult<Vec<Node>> {
        Ok(self
            .bodies()?
            .into_iter()
            .filter_map(|(id, body)| decode(&id, &body))
            .collect())
    }

    async fn remove(&self, ids: &BTreeSet<NodeId>) -> KernelResult<usize> {
        Ok(self.delete_many(ids)?)
    }

    async fn append_all(&self, nodes: &[Node]) -> KernelResult<usize> {
        self.insert_many(nodes)
    }
}
