//! Durable sink: every child batch becomes one committed SQLite
//! transaction before the next batch is pulled.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use super::{Fetch, Operator, OperatorConfig, OperatorState, check_open, check_transition};
use crate::catalog::RelationKey;
use crate::error::{ConvoyError, ConvoyResult};
use crate::storage::{SqliteQueue, create_statement, insert_statement};
use crate::tuple::Schema;

pub struct SqliteInsert {
    child: Vec<Box<dyn Operator>>,
    relation: RelationKey,
    db_path: PathBuf,
    /// Create the table at init even if the database file already exists.
    create_table: bool,
    queue: Option<SqliteQueue>,
    insert_sql: String,
    state: OperatorState,
    eos: bool,
}

impl SqliteInsert {
    pub fn new(
        relation: RelationKey,
        db_path: impl Into<PathBuf>,
        create_table: bool,
        child: Box<dyn Operator>,
    ) -> Self {
        Self {
            child: vec![child],
            relation,
            db_path: db_path.into(),
            create_table,
            queue: None,
            insert_sql: String::new(),
            state: OperatorState::Uninitialized,
            eos: false,
        }
    }

    /// Pull one batch from the child, write it, and echo it downstream
    /// once the transaction committed. The blocking write is the
    /// backpressure between ingest and disk.
    fn write_next(&mut self, fetched: Fetch) -> ConvoyResult<Fetch> {
        match fetched {
            Fetch::Batch(batch) => {
                let queue = self.queue.as_ref().ok_or_else(|| {
                    ConvoyError::InvalidOperation {
                        message: "write without an open writer queue".to_string(),
                        context: format!("relation {}", self.relation),
                    }
                })?;
                queue.insert_batch(&self.insert_sql, batch.clone())?;
                debug!(relation = %self.relation, rows = batch.num_rows(), "batch committed");
                Ok(Fetch::Batch(batch))
            }
            Fetch::Eos => {
                self.eos = true;
                Ok(Fetch::Eos)
            }
            Fetch::Pending => Ok(Fetch::Pending),
        }
    }
}

impl Operator for SqliteInsert {
    fn schema(&self) -> &Arc<Schema> {
        self.child[0].schema()
    }

    fn children(&self) -> &[Box<dyn Operator>] {
        &self.child
    }

    fn set_children(&mut self, children: Vec<Box<dyn Operator>>) -> ConvoyResult<()> {
        if children.len() != 1 {
            return Err(ConvoyError::InvalidOperation {
                message: "sqlite insert takes exactly one child".to_string(),
                context: format!("got {} children", children.len()),
            });
        }
        self.child = children;
        Ok(())
    }

    fn init(&mut self, config: &OperatorConfig) -> ConvoyResult<()> {
        check_transition(self.state, OperatorState::Uninitialized, "init")?;
        let newly_created = !self.db_path.exists();
        let queue = SqliteQueue::open(&self.db_path)?;
        if newly_created || self.create_table {
            queue.exec(&create_statement(&self.relation, self.schema()))?;
            info!(relation = %self.relation, path = %self.db_path.display(), "table ready");
        }
        self.insert_sql = insert_statement(&self.relation, self.schema());
        self.queue = Some(queue);
        self.child[0].init(config)?;
        self.state = OperatorState::Open;
        Ok(())
    }

    fn cleanup(&mut self) -> ConvoyResult<()> {
        check_transition(self.state, OperatorState::Open, "cleanup")?;
        self.child[0].cleanup()?;
        if let Some(mut queue) = self.queue.take() {
            queue.stop();
        }
        self.state = OperatorState::Closed;
        Ok(())
    }

    fn fetch_next(&mut self) -> ConvoyResult<Fetch> {
        check_open(self.state)?;
        if self.eos {
            return Ok(Fetch::Eos);
        }
        let fetched = self.child[0].fetch_next()?;
        self.write_next(fetched)
    }

    fn fetch_next_ready(&mut self) -> ConvoyResult<Fetch> {
        check_open(self.state)?;
        if self.eos {
            return Ok(Fetch::Eos);
        }
        let fetched = self.child[0].fetch_next_ready()?;
        self.write_next(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::BatchSource;
    use crate::storage::scan;
    use crate::tuple::{TupleBatchBuffer, TupleType, Value};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_pairs(&[
            ("id", TupleType::Long),
            ("name", TupleType::Str),
        ]))
    }

    fn source(rows: usize, capacity: usize) -> Box<dyn Operator> {
        let mut buffer = TupleBatchBuffer::with_capacity(schema(), capacity);
        for i in 0..rows {
            buffer.put(0, Value::Long(i as i64)).unwrap();
            buffer.put(1, Value::Str(format!("n{i}"))).unwrap();
        }
        Box::new(BatchSource::from_buffer(buffer))
    }

    fn drain(op: &mut dyn Operator) -> usize {
        let mut rows = 0;
        loop {
            match op.fetch_next().unwrap() {
                Fetch::Batch(b) => rows += b.num_rows(),
                Fetch::Eos => return rows,
                Fetch::Pending => unreachable!(),
            }
        }
    }

    #[test]
    fn sinks_every_batch_and_echoes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sink.db");
        let key = RelationKey::new("u", "p", "t");
        let mut sink = SqliteInsert::new(key.clone(), &path, false, source(7, 3));
        sink.init(&OperatorConfig::new()).unwrap();
        assert_eq!(drain(&mut sink), 7);
        sink.cleanup().unwrap();

        let sql = format!("SELECT id, name FROM {} ORDER BY id", key.canonical_name());
        let batches = scan(&path, &sql, schema()).unwrap();
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 7);
        assert_eq!(
            batches[0].value(1, 6).unwrap(),
            Value::Str("n6".to_string())
        );
    }

    #[test]
    fn creates_table_on_fresh_database_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.db");
        let key = RelationKey::new("u", "p", "t");
        // create_table is false; the file does not exist, so the table is
        // created anyway.
        let mut sink = SqliteInsert::new(key, &path, false, source(1, 2));
        sink.init(&OperatorConfig::new()).unwrap();
        assert_eq!(drain(&mut sink), 1);
        sink.cleanup().unwrap();
    }

    #[test]
    fn missing_table_on_existing_database_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.db");
        // Materialize the file first so init sees a pre-existing database.
        SqliteQueue::open(&path)
            .unwrap()
            .exec("CREATE TABLE unrelated (x INTEGER)")
            .unwrap();

        let key = RelationKey::new("u", "p", "t");
        let mut sink = SqliteInsert::new(key, &path, false, source(1, 2));
        sink.init(&OperatorConfig::new()).unwrap();
        assert!(matches!(
            sink.fetch_next(),
            Err(ConvoyError::Storage { .. })
        ));
    }

    #[test]
    fn append_run_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.db");
        let key = RelationKey::new("u", "p", "t");

        let mut first = SqliteInsert::new(key.clone(), &path, true, source(3, 2));
        first.init(&OperatorConfig::new()).unwrap();
        assert_eq!(drain(&mut first), 3);
        first.cleanup().unwrap();

        let mut second = SqliteInsert::new(key.clone(), &path, true, source(2, 2));
        second.init(&OperatorConfig::new()).unwrap();
        assert_eq!(drain(&mut second), 2);
        second.cleanup().unwrap();

        let sql = format!("SELECT id, name FROM {}", key.canonical_name());
        let batches = scan(&path, &sql, schema()).unwrap();
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 5);
    }
}
