//! Concurrent stress test for the model manager.
//!
//! Verifies that many tasks doing acquire/get/release cycles against a
//! shared manager complete without deadlock, counter corruption, or
//! panics, and that everything is evictable once the tasks are done.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use modelshed_resource::{BoxError, Manager, Providers};
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ModelKind {
    Ocr,
    Transcriber,
    TextEmbedding,
    Clip,
}

const KINDS: [ModelKind; 4] = [
    ModelKind::Ocr,
    ModelKind::Transcriber,
    ModelKind::TextEmbedding,
    ModelKind::Clip,
];

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_many_tasks_acquire_release() {
    let construction_count = Arc::new(AtomicU64::new(0));
    let mut providers = Providers::new();
    for kind in KINDS {
        let construction_count = construction_count.clone();
        providers = providers.provide(kind, move || {
            construction_count.fetch_add(1, Ordering::SeqCst);
            // Simulate small construction latency
            std::thread::sleep(Duration::from_millis(2));
            Ok::<_, BoxError>(format!("{kind:?}"))
        });
    }
    let mgr = Manager::builder(providers)
        .grace_period(Duration::from_millis(50))
        .build();

    let success_count = Arc::new(AtomicU64::new(0));
    let mut set = JoinSet::new();

    for task_id in 0..32 {
        let mgr = mgr.clone();
        let success_count = Arc::clone(&success_count);
        set.spawn(async move {
            // Each task does 20 cycles, walking the kinds from a
            // task-specific offset so every pairing occurs.
            for cycle in 0..20 {
                let kind = KINDS[(task_id + cycle) % KINDS.len()];
                mgr.acquire(&kind).await.expect("task should acquire");
                let model = mgr.get(&kind).await.expect("task should get");
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert_eq!(
                    model.downcast_ref::<String>().expect("should downcast"),
                    &format!("{kind:?}")
                );
                mgr.release(&kind).await.expect("task should release");
            }
            success_count.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Safety net against deadlock.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while let Some(result) = tokio::time::timeout_at(deadline, set.join_next())
        .await
        .expect("stress test should not deadlock (30s timeout)")
    {
        result.expect("task should not panic");
    }
    assert_eq!(success_count.load(Ordering::SeqCst), 32);

    // All usages returned.
    for kind in KINDS {
        assert_eq!(mgr.refcount(&kind).await.unwrap(), 0);
    }

    // No model ever needed rebuilding while the tasks kept it busy, and
    // provider-call count matches the manager's own load counter.
    let stats = mgr.stats();
    assert_eq!(stats.loads, construction_count.load(Ordering::SeqCst));

    // Idle now: everything drains within a few grace periods.
    tokio::time::sleep(Duration::from_millis(300)).await;
    for kind in KINDS {
        assert!(
            !mgr.is_loaded(&kind).await.unwrap(),
            "{kind:?} should be evicted after the tasks finish"
        );
    }
    assert_eq!(mgr.stats().unloads, mgr.stats().loads);
}
