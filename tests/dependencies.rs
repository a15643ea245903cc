use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
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
    conn.execute_batch("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (42);")
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

#[test]
fn execution_waits_for_all_dependencies() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let fast = Arc::new(AtomicBool::new(false));
        let slow = Arc::new(AtomicBool::new(false));

        let mut spec = QuerySpec::new(
            "SELECT id FROM t",
            StatementKind::Select,
            0,
            ExecutionContext::new(pool.clone()),
        );
        spec.dependencies = vec![
            Dependency::completion({
                let fast = Arc::clone(&fast);
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    fast.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
            Dependency::completion({
                let slow = Arc::clone(&slow);
                async move {
                    tokio::time::sleep(Duration::from_millis(120)).await;
                    slow.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        ];

        let mut results = pin!(execute(spec));
        let first = results.next().await.unwrap().unwrap();
        // The first database interaction happened after the slowest
        // dependency finished.
        assert!(fast.load(Ordering::SeqCst));
        assert!(slow.load(Ordering::SeqCst));
        assert_eq!(first.as_row().unwrap().get("id").unwrap().as_int(), Some(&42));
    });
}

#[test]
fn dependency_failure_short_circuits_without_database_calls() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let mut spec = QuerySpec::new(
            "INSERT INTO t VALUES (?1)",
            StatementKind::Dml,
            1,
            ExecutionContext::new(pool.clone()),
        );
        spec.parameters = positional_parameters(vec![ParamValue::Int(7)], 1);
        spec.dependencies = vec![
            Dependency::completion(async {
                Err(RelayError::Connection("upstream source went away".into()))
            }),
            // Would never finish; failure must not wait for it.
            Dependency::completion(futures_util::future::pending()),
        ];

        let elements: Vec<_> = execute(spec).collect().await;
        assert_eq!(elements.len(), 1);
        assert!(matches!(elements[0], Err(RelayError::DependencyFailure(_))));

        // No statement was ever sent: the seed row is still alone.
        assert_eq!(count_rows(&pool).await, 1);
    });
}

#[test]
fn stream_dependency_discards_values_but_gates_completion() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = setup_pool(&dir).await;

        let done = Arc::new(AtomicBool::new(false));
        let upstream = {
            let done = Arc::clone(&done);
            async_stream::stream! {
                for value in 0..5 {
                    yield Ok::<i64, RelayError>(value);
                }
                done.store(true, Ordering::SeqCst);
            }
        };

        let mut spec = QuerySpec::new(
            "SELECT id FROM t",
            StatementKind::Select,
            0,
            ExecutionContext::new(pool.clone()),
        );
        spec.dependencies = vec![Dependency::from_stream(upstream)];

        let elements: Vec<_> = execute(spec).collect().await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(elements.len(), 1);
        assert!(elements[0].is_ok());
    });
}
