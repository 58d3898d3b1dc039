// End-to-end sink tests: operator trees writing through the single-writer
// queue, then reading back through per-caller scan connections.

use std::sync::Arc;
use std::thread;

use convoy_core::catalog::RelationKey;
use convoy_core::operator::{BatchSource, Fetch, Operator, OperatorConfig, SqliteInsert};
use convoy_core::storage::{SqliteQueue, create_statement, insert_statement, scan};
use convoy_core::tuple::{Schema, TupleBatch, TupleBatchBuffer, TupleType, Value};
use tempfile::tempdir;

// ─── Helpers ────────────────────────────────────────────

fn schema() -> Arc<Schema> {
    Arc::new(Schema::from_pairs(&[
        ("id", TupleType::Long),
        ("label", TupleType::Str),
        ("weight", TupleType::Double),
    ]))
}

fn source(rows: usize, batch_capacity: usize) -> Box<dyn Operator> {
    let mut buffer = TupleBatchBuffer::with_capacity(schema(), batch_capacity);
    for i in 0..rows {
        buffer.put(0, Value::Long(i as i64)).unwrap();
        buffer.put(1, Value::Str(format!("label-{i}"))).unwrap();
        buffer.put(2, Value::Double(i as f64 * 0.25)).unwrap();
    }
    Box::new(BatchSource::from_buffer(buffer))
}

fn drain(op: &mut dyn Operator) -> usize {
    let mut rows = 0;
    loop {
        match op.fetch_next().unwrap() {
            Fetch::Batch(b) => rows += b.num_rows(),
            Fetch::Eos => return rows,
            Fetch::Pending => unreachable!("blocking fetch returned pending"),
        }
    }
}

fn total_rows(batches: &[TupleBatch]) -> usize {
    batches.iter().map(TupleBatch::num_rows).sum()
}

// ─── Tests ──────────────────────────────────────────────

#[test]
fn sink_persists_rows_across_many_batches_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("orders.db");
    let key = RelationKey::new("alice", "ingest", "orders");

    // 137 rows in batches of 10 forces a partial tail batch.
    let mut sink = SqliteInsert::new(key.clone(), &path, false, source(137, 10));
    sink.init(&OperatorConfig::new()).unwrap();
    assert_eq!(drain(&mut sink), 137);
    sink.cleanup().unwrap();

    let sql = format!(
        "SELECT id, label, weight FROM {} ORDER BY id",
        key.canonical_name()
    );
    let batches = scan(&path, &sql, schema()).unwrap();
    assert_eq!(total_rows(&batches), 137);

    // Rows come back exactly as produced.
    let mut expected = 0i64;
    for batch in &batches {
        for row in 0..batch.num_rows() {
            assert_eq!(batch.value(0, row).unwrap(), Value::Long(expected));
            assert_eq!(
                batch.value(1, row).unwrap(),
                Value::Str(format!("label-{expected}"))
            );
            assert_eq!(
                batch.value(2, row).unwrap(),
                Value::Double(expected as f64 * 0.25)
            );
            expected += 1;
        }
    }
    assert_eq!(expected, 137);
}

#[test]
fn concurrent_scans_share_one_database_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let key = RelationKey::new("bob", "bench", "rows");
    let schema = schema();

    let queue = SqliteQueue::open(&path).unwrap();
    queue.exec(&create_statement(&key, &schema)).unwrap();
    let mut buffer = TupleBatchBuffer::with_capacity(Arc::clone(&schema), 50);
    for i in 0..200i64 {
        buffer.put(0, Value::Long(i)).unwrap();
        buffer.put(1, Value::Str(format!("r{i}"))).unwrap();
        buffer.put(2, Value::Double(0.0)).unwrap();
    }
    let insert = insert_statement(&key, &schema);
    while let Some(batch) = buffer.pop_any() {
        queue.insert_batch(&insert, batch).unwrap();
    }
    drop(queue);

    let sql = format!("SELECT id, label, weight FROM {}", key.canonical_name());
    let handles: Vec<_> = (0..50)
        .map(|_| {
            let path = path.clone();
            let sql = sql.clone();
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let batches = scan(&path, &sql, schema).unwrap();
                total_rows(&batches)
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 200);
    }
}

#[test]
fn two_sinks_into_different_relations_of_one_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("multi.db");
    let first = RelationKey::new("u", "p", "a");
    let second = RelationKey::new("u", "p", "b");

    let mut sink_a = SqliteInsert::new(first.clone(), &path, true, source(5, 3));
    sink_a.init(&OperatorConfig::new()).unwrap();
    assert_eq!(drain(&mut sink_a), 5);
    sink_a.cleanup().unwrap();

    let mut sink_b = SqliteInsert::new(second.clone(), &path, true, source(8, 3));
    sink_b.init(&OperatorConfig::new()).unwrap();
    assert_eq!(drain(&mut sink_b), 8);
    sink_b.cleanup().unwrap();

    let rows_a = scan(
        &path,
        &format!("SELECT id, label, weight FROM {}", first.canonical_name()),
        schema(),
    )
    .unwrap();
    let rows_b = scan(
        &path,
        &format!("SELECT id, label, weight FROM {}", second.canonical_name()),
        schema(),
    )
    .unwrap();
    assert_eq!(total_rows(&rows_a), 5);
    assert_eq!(total_rows(&rows_b), 8);
}
