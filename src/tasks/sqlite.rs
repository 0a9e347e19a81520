//! SQLite-backed task store shared across processes
//!
//! Every process opening the same database file sees the same tasks. The
//! full task is stored as JSON next to the columns used for filtering and
//! ordering. Read-modify-write updates run inside `BEGIN IMMEDIATE`
//! transactions, so concurrent processes serialize on the database write
//! lock and a transition can never be applied on top of a stale status.

use crate::tasks::store::TaskStore;
use crate::tasks::{Task, TaskError, TaskFilter, TaskPage, TaskResult, TaskStatus};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const TASK_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    started_at_ms INTEGER,
    group_ids TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
"#;

/// Task store in a SQLite database file
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Opens (creating if needed) the task table in the database at `path`
    pub fn open(path: &Path) -> TaskResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        Self::with_connection(conn)
    }

    /// Creates a store in a private in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> TaskResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> TaskResult<Self> {
        conn.execute_batch(TASK_SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> TaskResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| TaskError::LockPoisoned)
    }
}

fn write_task(conn: &Connection, task: &Task) -> TaskResult<()> {
    conn.execute(
        "INSERT INTO tasks (id, status, created_at_ms, started_at_ms, group_ids, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            started_at_ms = excluded.started_at_ms,
            group_ids = excluded.group_ids,
            body = excluded.body",
        params![
            task.id.to_string(),
            task.status.to_db_string(),
            task.created_at.timestamp_millis(),
            task.started_at.map(|t| t.timestamp_millis()),
            serde_json::to_string(&task.group_ids)?,
            serde_json::to_string(task)?,
        ],
    )?;
    Ok(())
}

fn read_bodies(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> TaskResult<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map(args, |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(TaskError::from))
        .collect()
}

impl TaskStore for SqliteTaskStore {
    fn put(&self, task: &Task) -> TaskResult<()> {
        write_task(&*self.lock()?, task)
    }

    fn get(&self, id: Uuid) -> TaskResult<Option<Task>> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM tasks WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    fn list(&self, filter: &TaskFilter, page: u32, per_page: u32) -> TaskResult<TaskPage> {
        let mut clauses = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            args.push(Value::Text(status.to_db_string().to_string()));
        }
        if let Some(group_id) = filter.group_id {
            clauses.push("EXISTS (SELECT 1 FROM json_each(tasks.group_ids) WHERE json_each.value = ?)");
            args.push(Value::Integer(group_id));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM tasks {}", where_sql),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        args.push(Value::Integer(i64::from(per_page)));
        args.push(Value::Integer(offset));

        let items = read_bodies(
            &conn,
            &format!(
                "SELECT body FROM tasks {} ORDER BY rowid DESC LIMIT ? OFFSET ?",
                where_sql
            ),
            params_from_iter(args.iter()),
        )?;

        Ok(TaskPage {
            items,
            total: total as u64,
            page,
            per_page,
        })
    }

    fn update(&self, id: Uuid, apply: &dyn Fn(&mut Task) -> bool) -> TaskResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM tasks WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let body = body.ok_or(TaskError::NotFound(id))?;

        let mut task: Task = serde_json::from_str(&body)?;
        if !apply(&mut task) {
            return Ok(false);
        }

        write_task(&tx, &task)?;
        tx.commit()?;
        Ok(true)
    }

    fn current(&self) -> TaskResult<Option<Task>> {
        let conn = self.lock()?;
        let mut running = read_bodies(
            &conn,
            "SELECT body FROM tasks WHERE status = ?1
             ORDER BY started_at_ms DESC, rowid DESC LIMIT 1",
            params![TaskStatus::Running.to_db_string()],
        )?;
        Ok(running.pop())
    }

    fn all(&self) -> TaskResult<Vec<Task>> {
        read_bodies(&*self.lock()?, "SELECT body FROM tasks ORDER BY rowid", [])
    }
}
