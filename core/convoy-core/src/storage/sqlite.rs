//! Single-writer SQLite queue and the typed read path.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rusqlite::{Connection, params_from_iter};
use tracing::{debug, warn};

use crate::catalog::RelationKey;
use crate::error::{ConvoyError, ConvoyResult};
use crate::tuple::{Schema, TupleBatch, TupleBatchBuffer, TupleType, Value};
use std::sync::Arc;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl rusqlite::types::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::ToSqlOutput;
        Ok(match self {
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Long(l) => ToSqlOutput::from(*l),
            Value::Float(f) => ToSqlOutput::from(f64::from(*f)),
            Value::Double(d) => ToSqlOutput::from(*d),
            Value::Str(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

/// SQLite affinity for a column type.
pub fn sqlite_type(ty: TupleType) -> &'static str {
    match ty {
        TupleType::Bool | TupleType::Int | TupleType::Long => "INTEGER",
        TupleType::Float | TupleType::Double => "REAL",
        TupleType::Str => "TEXT",
    }
}

/// `CREATE TABLE IF NOT EXISTS` statement for a relation.
pub fn create_statement(key: &RelationKey, schema: &Schema) -> String {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| format!("{} {}", f.name(), sqlite_type(f.tuple_type())))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        key.canonical_name(),
        columns.join(", ")
    )
}

/// Positional insert statement for a relation.
pub fn insert_statement(key: &RelationKey, schema: &Schema) -> String {
    let placeholders = vec!["?"; schema.num_columns()].join(", ");
    format!(
        "INSERT INTO {} VALUES ({})",
        key.canonical_name(),
        placeholders
    )
}

enum Job {
    Exec {
        sql: String,
        reply: Sender<ConvoyResult<()>>,
    },
    InsertBatch {
        sql: String,
        batch: TupleBatch,
        reply: Sender<ConvoyResult<()>>,
    },
}

/// Serializes all writes to one database file through a dedicated thread
/// owning the connection. Callers block until their job committed, which
/// is the backpressure that keeps ingest from outrunning the disk.
pub struct SqliteQueue {
    path: PathBuf,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl SqliteQueue {
    /// Open (creating if absent) and start the writer thread. Open errors
    /// surface here, not on the first job.
    pub fn open(path: impl AsRef<Path>) -> ConvoyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<ConvoyResult<()>>();

        let db_path = path.clone();
        let worker = thread::spawn(move || {
            let mut conn = match open_connection(&db_path) {
                Ok(conn) => {
                    let _ = ready_tx.send(Ok(()));
                    conn
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            for job in job_rx {
                match job {
                    Job::Exec { sql, reply } => {
                        let _ = reply.send(run_exec(&conn, &sql));
                    }
                    Job::InsertBatch { sql, batch, reply } => {
                        let _ = reply.send(run_insert(&mut conn, &sql, &batch));
                    }
                }
            }
            debug!(path = %db_path.display(), "writer queue drained");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                path,
                sender: Some(job_tx),
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(ConvoyError::Interrupted(
                "sqlite writer thread died during open".to_string(),
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one SQL statement (DDL or the like) and wait for it.
    pub fn exec(&self, sql: &str) -> ConvoyResult<()> {
        let (reply, result) = mpsc::channel();
        self.submit(Job::Exec {
            sql: sql.to_string(),
            reply,
        })?;
        result
            .recv()
            .map_err(|_| interrupted("sqlite writer thread gone"))?
    }

    /// Insert every row of the batch inside one transaction; returns once
    /// the transaction committed.
    pub fn insert_batch(&self, sql: &str, batch: TupleBatch) -> ConvoyResult<()> {
        let (reply, result) = mpsc::channel();
        self.submit(Job::InsertBatch {
            sql: sql.to_string(),
            batch,
            reply,
        })?;
        result
            .recv()
            .map_err(|_| interrupted("sqlite writer thread gone"))?
    }

    fn submit(&self, job: Job) -> ConvoyResult<()> {
        match &self.sender {
            Some(sender) => sender
                .send(job)
                .map_err(|_| interrupted("sqlite writer thread gone")),
            None => Err(ConvoyError::InvalidOperation {
                message: "submit to a stopped writer queue".to_string(),
                context: format!("database {}", self.path.display()),
            }),
        }
    }

    /// Let pending jobs finish, then stop and join the writer thread.
    pub fn stop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(path = %self.path.display(), "sqlite writer thread panicked");
            }
        }
    }
}

impl Drop for SqliteQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn interrupted(what: &str) -> ConvoyError {
    ConvoyError::Interrupted(what.to_string())
}

fn open_connection(path: &Path) -> ConvoyResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn run_exec(conn: &Connection, sql: &str) -> ConvoyResult<()> {
    conn.execute_batch(sql)?;
    Ok(())
}

fn run_insert(conn: &mut Connection, sql: &str, batch: &TupleBatch) -> ConvoyResult<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(sql)?;
        let num_columns = batch.schema().num_columns();
        for row in 0..batch.num_rows() {
            let mut values = Vec::with_capacity(num_columns);
            for column in 0..num_columns {
                values.push(batch.value(column, row)?);
            }
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Read a query result back as batches. Each caller opens its own
/// connection, so any number of scans can run while the writer queue is
/// active.
pub fn scan(path: impl AsRef<Path>, sql: &str, schema: Arc<Schema>) -> ConvoyResult<Vec<TupleBatch>> {
    let conn = open_connection(path.as_ref())?;
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut buffer = TupleBatchBuffer::new(Arc::clone(&schema));
    while let Some(row) = rows.next()? {
        for column in 0..schema.num_columns() {
            let value = match schema.column_type(column) {
                TupleType::Bool => Value::Bool(row.get(column)?),
                TupleType::Int => Value::Int(row.get(column)?),
                TupleType::Long => Value::Long(row.get(column)?),
                TupleType::Float => Value::Float(row.get::<_, f64>(column)? as f32),
                TupleType::Double => Value::Double(row.get(column)?),
                TupleType::Str => Value::Str(row.get(column)?),
            };
            buffer.put(column, value)?;
        }
    }
    let mut batches = Vec::new();
    while let Some(batch) = buffer.pop_any() {
        batches.push(batch);
    }
    Ok(batches)
}
