use std::pin::pin;
use std::time::Duration;

use futures_util::StreamExt;
use sql_relay::prelude::*;
use tokio::runtime::Runtime;

async fn setup_pool(dir: &tempfile::TempDir) -> Pool {
    let path = dir.path().join("relay.db");
    let pool = Pool::new(
        PoolConfig::new(path.to_string_lossy().to_string())
            .max_size(4)
            .acquire_timeout(Duration::from_secs(5)),
    )
    .await
    .unwrap();
    let conn = pool.acquire().await.unwrap();
    conn.execute_batch("CREATE TABLE t (id INTEGER, name TEXT);")
        .await
        .unwrap();
    pool
}

async fn count_rows(pool: &Pool) -> i64 {
    let spec = QuerySpec::new(
        "SELECT COUNT(*) AS n FROM t",
        StatementKind::Select,
        0,
        ExecutionContext::new(pool.clone()),
    );
    let mut results = pin!(execute(spec));
    let element = results.next().await.unwrap().unwrap();
    *element.as_row().unwrap().get("n").unwrap().as_int().unwrap()
}

fn insert_spec(pool: &Pool, tx: &Transaction, id: i64, name: &str) -> QuerySpec {
    let mut spec = QuerySpec::new(
        "INSERT INTO t VALUES (?1, ?2)",
        StatementKind::Dml,
        2,
        ExecutionContext::transactional(pool.clone(), tx.handle()),
    );
    spec.parameters = positional_parameters(
        vec![ParamValue::Int(id), ParamValue::Text(name.into())],
        2,
    );
    spec
}

#[test]
fn all_members_succeeding_commits_once_with_true_outcome() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let tx = Transaction::begin(&pool).await.unwrap();
        let outcome = tx.outcome();

        for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            let elements: Vec<_> = execute(insert_spec(&pool, &tx, id, name)).collect().await;
            assert_eq!(elements.len(), 1);
            assert_eq!(elements[0].as_ref().unwrap().rows_affected(), Some(1));
        }

        assert!(tx.finalize().await.unwrap());
        assert_eq!(outcome.wait().await.unwrap(), true);
        assert_eq!(count_rows(&pool).await, 3);
    });
}

#[test]
fn one_failing_member_rolls_back_everything() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let tx = Transaction::begin(&pool).await.unwrap();
        let outcome = tx.outcome();

        // A member that succeeds.
        let ok: Vec<_> = execute(insert_spec(&pool, &tx, 1, "kept?")).collect().await;
        assert!(ok[0].is_ok());

        // A member that fails locally: dangling remainder batch.
        let mut bad = QuerySpec::new(
            "INSERT INTO t VALUES (?1, ?2)",
            StatementKind::Dml,
            2,
            ExecutionContext::transactional(pool.clone(), tx.handle()),
        );
        bad.parameters = positional_parameters(
            vec![
                ParamValue::Int(2),
                ParamValue::Text("b".into()),
                ParamValue::Int(3),
            ],
            2,
        );
        let elements: Vec<_> = execute(bad).collect().await;
        assert!(matches!(
            elements.last().unwrap(),
            Err(RelayError::BindingCount { .. })
        ));

        // One rollback, zero commits: nothing survives, outcome is false.
        assert!(!tx.finalize().await.unwrap());
        assert_eq!(outcome.wait().await.unwrap(), false);
        assert_eq!(count_rows(&pool).await, 0);
    });
}

#[test]
fn finalize_with_members_in_flight_fails_fast() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;
        let conn = pool.acquire().await.unwrap();
        conn.execute_batch(
            "INSERT INTO t VALUES (1, 'a'); INSERT INTO t VALUES (2, 'b'); INSERT INTO t VALUES (3, 'c');",
        )
        .await
        .unwrap();
        drop(conn);

        let tx = Transaction::begin(&pool).await.unwrap();
        let spec = QuerySpec::new(
            "SELECT id FROM t ORDER BY id",
            StatementKind::Select,
            0,
            ExecutionContext::transactional(pool.clone(), tx.handle()),
        );
        let mut results = pin!(execute(spec));
        // First poll registers the member and opens the cursor.
        let first = results.next().await.unwrap().unwrap();
        assert!(first.as_row().is_some());

        match tx.finalize().await {
            Err(RelayError::Transaction(_)) => {}
            other => panic!("expected transaction error, got {other:?}"),
        }
    });
}

#[test]
fn sequenced_transactions_wait_on_previous_outcome() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let first = Transaction::begin(&pool).await.unwrap();
        let first_outcome = first.outcome();
        let elements: Vec<_> = execute(insert_spec(&pool, &first, 1, "first"))
            .collect()
            .await;
        assert!(elements[0].is_ok());
        assert!(first.finalize().await.unwrap());

        let second = Transaction::begin_after(&pool, first_outcome).await.unwrap();
        let elements: Vec<_> = execute(insert_spec(&pool, &second, 2, "second"))
            .collect()
            .await;
        assert!(elements[0].is_ok());
        assert!(second.finalize().await.unwrap());

        assert_eq!(count_rows(&pool).await, 2);
    });
}

#[test]
fn committed_outcome_gates_a_dependent_query() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let tx = Transaction::begin(&pool).await.unwrap();
        let outcome = tx.outcome();
        let elements: Vec<_> = execute(insert_spec(&pool, &tx, 7, "gated")).collect().await;
        assert!(elements[0].is_ok());

        let mut dependent = QuerySpec::new(
            "SELECT name FROM t WHERE id = ?1",
            StatementKind::Select,
            1,
            ExecutionContext::new(pool.clone()),
        );
        dependent.parameters = positional_parameters(vec![ParamValue::Int(7)], 1);
        dependent.dependencies = vec![Dependency::last_tx_outcome(outcome)];

        let (finalized, rows) = tokio::join!(
            async {
                // Let the dependent query subscribe first.
                tokio::time::sleep(Duration::from_millis(50)).await;
                tx.finalize().await
            },
            execute(dependent).collect::<Vec<_>>(),
        );
        assert!(finalized.unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].as_ref().unwrap().as_row().unwrap().get("name").unwrap().as_text(),
            Some("gated")
        );
    });
}

#[test]
fn dropping_a_transaction_publishes_a_rolled_back_outcome() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let tx = Transaction::begin(&pool).await.unwrap();
        let outcome = tx.outcome();
        let elements: Vec<_> = execute(insert_spec(&pool, &tx, 9, "doomed")).collect().await;
        assert!(elements[0].is_ok());
        drop(tx);

        assert_eq!(outcome.wait().await.unwrap(), false);
        assert_eq!(count_rows(&pool).await, 0);
    });
}

#[test]
fn rolled_back_outcome_is_published_only_after_the_write_lock_is_gone() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let tx = Transaction::begin(&pool).await.unwrap();
        let outcome = tx.outcome();
        let elements: Vec<_> = execute(insert_spec(&pool, &tx, 1, "doomed")).collect().await;
        assert!(elements[0].is_ok());
        drop(tx);

        // Once the outcome is observable the rollback has executed, so a
        // write on a fresh connection must not hit the old write lock.
        assert_eq!(outcome.wait().await.unwrap(), false);
        let spec = QuerySpec::new(
            "INSERT INTO t VALUES (?1, ?2)",
            StatementKind::Dml,
            2,
            ExecutionContext::new(pool.clone()),
        )
        .with_values(vec![ParamValue::Int(2), ParamValue::Text("after".into())]);
        let elements: Vec<_> = execute(spec).collect().await;
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].as_ref().unwrap().rows_affected(), Some(1));
        assert_eq!(count_rows(&pool).await, 1);
    });
}

#[test]
fn cancelling_a_member_mid_cursor_rolls_back_at_finalize() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let tx = Transaction::begin(&pool).await.unwrap();
        let outcome = tx.outcome();

        let mut values = Vec::new();
        for id in 0..10 {
            values.push(ParamValue::Int(id));
            values.push(ParamValue::Text(format!("row-{id}")));
        }
        let seed = QuerySpec::new(
            "INSERT INTO t VALUES (?1, ?2)",
            StatementKind::Dml,
            2,
            ExecutionContext::transactional(pool.clone(), tx.handle()),
        )
        .with_values(values);
        let seeded: Vec<_> = execute(seed).collect().await;
        assert_eq!(seeded.len(), 10);
        assert!(seeded.iter().all(Result::is_ok));

        let select = QuerySpec::new(
            "SELECT id FROM t ORDER BY id",
            StatementKind::Select,
            0,
            ExecutionContext::transactional(pool.clone(), tx.handle()),
        );
        {
            let mut results = pin!(execute(select));
            let first = results.next().await.unwrap().unwrap();
            assert!(first.as_row().is_some());
            // Dropping the stream here abandons the member mid-cursor.
        }

        // The cancelled member counts as a failure: finalize rolls back and
        // none of the seeded rows survive.
        assert!(!tx.finalize().await.unwrap());
        assert_eq!(outcome.wait().await.unwrap(), false);
        assert_eq!(count_rows(&pool).await, 0);
    });
}
