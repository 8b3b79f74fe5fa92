//! Benchmark for the claim hot path against a loaded ledger.

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

use drover::adapters::sqlite::{create_test_pool, Migrator, SqliteTaskLedger};
use drover::domain::models::{TaskSpec, TaskStatus};
use drover::domain::ports::TaskLedger;

async fn seeded_ledger(pending: usize) -> Arc<dyn TaskLedger> {
    let pool = create_test_pool().await.unwrap();
    Migrator::new(pool.clone()).run().await.unwrap();
    let ledger = SqliteTaskLedger::new(pool);

    for _ in 0..pending {
        ledger.submit(TaskSpec::new("bench.work")).await.unwrap();
    }

    Arc::new(ledger)
}

fn bench_claim_next(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let ledger = rt.block_on(seeded_ledger(1000));

    c.bench_function("claim_next_1000_pending", |b| {
        b.to_async(&rt).iter(|| {
            let ledger = ledger.clone();
            async move {
                // Claim, then hand the task straight back so the queue
                // depth stays constant across iterations.
                let task = ledger.claim_next("bench-agent", &[]).await.unwrap().unwrap();
                ledger.reassign(task.id, TaskStatus::Claimed).await.unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_claim_next);
criterion_main!(benches);
