// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nodown_adapters::{FakeProcessAdapter, ProcessCall};
use std::time::Duration;
use tokio::sync::mpsc;

type Events = mpsc::Receiver<ProcessEvent>;

fn setup() -> (PoolManager<FakeProcessAdapter>, FakeProcessAdapter, Events) {
    setup_with_retry(RetryPolicy::default())
}

fn setup_with_retry(
    retry: RetryPolicy,
) -> (PoolManager<FakeProcessAdapter>, FakeProcessAdapter, Events) {
    let (tx, rx) = mpsc::channel(64);
    let adapter = FakeProcessAdapter::new(tx);
    let pool = PoolManager::new(adapter.clone(), WorkerCommand::new("worker"), retry);
    (pool, adapter, rx)
}

/// Apply every queued event, collecting the outcomes
async fn drain(pool: &mut PoolManager<FakeProcessAdapter>, rx: &mut Events) -> Vec<PoolOutcome> {
    let mut outcomes = Vec::new();
    while let Ok(event) = rx.try_recv() {
        outcomes.push(pool.handle_event(event).await.unwrap());
    }
    outcomes
}

#[tokio::test]
async fn spawn_registers_starting_worker() {
    let (mut pool, adapter, _rx) = setup();
    adapter.set_auto_ready(false);

    let (id, _readiness) = pool.spawn().await.unwrap();

    assert_eq!(id, WorkerId(1));
    let worker = pool.registry().get(id).unwrap();
    assert_eq!(worker.status, WorkerStatus::Starting);
    assert_eq!(worker.pid, adapter.process(id).map(|p| p.pid));
    assert_eq!(pool.starting(), vec![id]);
}

#[tokio::test]
async fn readiness_resolves_with_reported_address() {
    let (mut pool, adapter, mut rx) = setup();
    adapter.set_auto_ready(false);
    let (id, readiness) = pool.spawn().await.unwrap();

    adapter.report_ready(id, Some("127.0.0.1:8080"));
    let outcomes = drain(&mut pool, &mut rx).await;

    assert_eq!(outcomes, vec![PoolOutcome::Ready(id)]);
    let ready = readiness.await.unwrap();
    assert_eq!(ready.address.as_deref(), Some("127.0.0.1:8080"));
    assert!(pool.registry().get(id).unwrap().is_ready());
}

#[tokio::test]
async fn duplicate_readiness_is_ignored() {
    let (mut pool, adapter, mut rx) = setup();
    let (id, _readiness) = pool.spawn().await.unwrap();
    adapter.report_ready(id, None);

    let outcomes = drain(&mut pool, &mut rx).await;

    assert_eq!(outcomes, vec![PoolOutcome::Ready(id), PoolOutcome::Ignored]);
}

#[tokio::test]
async fn retired_worker_exit_is_orchestrated_even_when_signaled() {
    let (mut pool, adapter, mut rx) = setup();
    adapter.set_exit_on_retire(false);
    let (id, _readiness) = pool.spawn().await.unwrap();
    drain(&mut pool, &mut rx).await;

    let retirement = pool.retire_one(id).await.unwrap();
    adapter.crash(id, 15);
    let outcomes = drain(&mut pool, &mut rx).await;

    let status = ExitStatus::signaled(15);
    assert_eq!(outcomes, vec![PoolOutcome::Retired { id, status }]);
    assert_eq!(retirement.await, status);
    assert!(pool.registry().is_empty());
    // No replacement for an orchestrated exit
    assert_eq!(adapter.spawned(), vec![id]);
}

#[tokio::test]
async fn retire_twice_is_rejected() {
    let (mut pool, adapter, mut rx) = setup();
    adapter.set_exit_on_retire(false);
    let (id, _readiness) = pool.spawn().await.unwrap();
    drain(&mut pool, &mut rx).await;

    let _retirement = pool.retire_one(id).await.unwrap();
    let err = pool.retire_one(id).await.unwrap_err();

    assert!(matches!(err, PoolError::AlreadyRetiring(w) if w == id));
}

#[tokio::test]
async fn retire_unknown_worker_fails() {
    let (mut pool, _adapter, _rx) = setup();

    let err = pool.retire_one(WorkerId(7)).await.unwrap_err();

    assert!(matches!(err, PoolError::UnknownWorker(WorkerId(7))));
}

#[tokio::test]
async fn unexpected_exit_of_ready_worker_respawns_once() {
    let (mut pool, adapter, mut rx) = setup();
    let (id, _readiness) = pool.spawn().await.unwrap();
    drain(&mut pool, &mut rx).await;

    adapter.crash(id, 9);
    let event = rx.try_recv().unwrap();
    let outcome = pool.handle_event(event).await.unwrap();

    let replacement = WorkerId(2);
    assert_eq!(
        outcome,
        PoolOutcome::Respawned {
            crashed: id,
            replacement
        }
    );
    assert_eq!(adapter.spawned(), vec![id, replacement]);
    assert_eq!(pool.snapshot(), vec![replacement]);
    assert!(pool
        .journal()
        .entries()
        .any(|e| *e == PoolEntry::Respawned {
            crashed: id,
            replacement
        }));
}

#[tokio::test]
async fn startup_failure_is_reported_to_readiness_waiter() {
    let (mut pool, adapter, mut rx) = setup();
    adapter.set_auto_ready(false);
    let (id, readiness) = pool.spawn().await.unwrap();

    adapter.exit(id, ExitStatus::code(3));
    let outcomes = drain(&mut pool, &mut rx).await;

    let status = ExitStatus::code(3);
    assert_eq!(outcomes, vec![PoolOutcome::StartupFailed { id, status }]);
    assert_eq!(readiness.await, Err(StartupFailure { id, status }));
    // The waiter compensates; the pool does not respawn on its own
    assert_eq!(adapter.spawned(), vec![id]);
}

#[tokio::test]
async fn startup_failure_without_waiter_respawns() {
    let (mut pool, adapter, mut rx) = setup();
    adapter.set_auto_ready(false);
    let (id, readiness) = pool.spawn().await.unwrap();
    drop(readiness);

    adapter.exit(id, ExitStatus::code(1));
    let outcomes = drain(&mut pool, &mut rx).await;

    assert_eq!(
        outcomes,
        vec![PoolOutcome::Respawned {
            crashed: id,
            replacement: WorkerId(2)
        }]
    );
}

#[tokio::test]
async fn superseded_worker_exit_is_lost() {
    let (mut pool, adapter, mut rx) = setup();
    let (old, _readiness) = pool.spawn().await.unwrap();
    drain(&mut pool, &mut rx).await;
    adapter.set_auto_ready(false);
    let (new, _new_readiness) = pool.spawn().await.unwrap();
    pool.mark_superseded(old, new);

    adapter.crash(old, 11);
    let outcomes = drain(&mut pool, &mut rx).await;

    assert_eq!(
        outcomes,
        vec![PoolOutcome::Lost {
            id: old,
            status: ExitStatus::signaled(11)
        }]
    );
    assert_eq!(adapter.spawned(), vec![old, new]);
}

#[tokio::test]
async fn reload_message_counts_only_from_connected_workers() {
    let (mut pool, adapter, mut rx) = setup();
    adapter.set_exit_on_retire(false);
    let (a, _ra) = pool.spawn().await.unwrap();
    let (b, _rb) = pool.spawn().await.unwrap();
    drain(&mut pool, &mut rx).await;
    let _retirement = pool.retire_one(b).await.unwrap();

    adapter.request_reload(a);
    adapter.request_reload(b);
    let outcomes = drain(&mut pool, &mut rx).await;

    assert_eq!(
        outcomes,
        vec![PoolOutcome::ReloadRequested(a), PoolOutcome::Ignored]
    );
}

#[tokio::test]
async fn events_for_unknown_workers_are_ignored() {
    let (mut pool, _adapter, _rx) = setup();

    let ready = ProcessEvent::Ready {
        id: WorkerId(9),
        address: None,
    };
    let exited = ProcessEvent::Exited {
        id: WorkerId(9),
        status: ExitStatus::code(0),
    };

    assert_eq!(pool.handle_event(ready).await.unwrap(), PoolOutcome::Ignored);
    assert_eq!(
        pool.handle_event(exited).await.unwrap(),
        PoolOutcome::Ignored
    );
}

#[tokio::test(start_paused = true)]
async fn spawn_retries_failed_attempts_with_fresh_ids() {
    let (mut pool, adapter, _rx) = setup();
    adapter.fail_next_spawns(2);

    let (id, _readiness) = pool.spawn().await.unwrap();

    assert_eq!(adapter.spawned(), vec![WorkerId(1), WorkerId(2), WorkerId(3)]);
    assert_eq!(id, WorkerId(3));
    assert_eq!(pool.registry().ids(), vec![WorkerId(3)]);
}

#[tokio::test(start_paused = true)]
async fn spawn_gives_up_after_configured_attempts() {
    let retry = RetryPolicy {
        attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    };
    let (mut pool, adapter, _rx) = setup_with_retry(retry);
    adapter.fail_next_spawns(10);

    let err = pool.spawn().await.unwrap_err();

    assert!(matches!(err, PoolError::SpawnExhausted { attempts: 3, .. }));
    assert_eq!(adapter.spawned().len(), 3);
    assert!(pool.registry().is_empty());
}

#[tokio::test]
async fn repeated_startup_failures_are_a_crash_loop() {
    let retry = RetryPolicy {
        attempts: 2,
        ..RetryPolicy::default()
    };
    let (mut pool, adapter, mut rx) = setup_with_retry(retry);
    adapter.set_auto_ready(false);

    let (first, readiness) = pool.spawn().await.unwrap();
    drop(readiness);
    adapter.exit(first, ExitStatus::code(1));
    let event = rx.try_recv().unwrap();
    let outcome = pool.handle_event(event).await.unwrap();
    let PoolOutcome::Respawned { replacement, .. } = outcome else {
        panic!("expected a respawn, got {outcome:?}");
    };

    adapter.exit(replacement, ExitStatus::code(1));
    let event = rx.try_recv().unwrap();
    let err = pool.handle_event(event).await.unwrap_err();

    assert!(matches!(err, PoolError::CrashLoop { failures: 2 }));
}

#[tokio::test]
async fn readiness_resets_startup_failures() {
    let retry = RetryPolicy {
        attempts: 2,
        ..RetryPolicy::default()
    };
    let (mut pool, adapter, mut rx) = setup_with_retry(retry);
    adapter.set_auto_ready(false);

    let (first, _r1) = pool.spawn().await.unwrap();
    adapter.exit(first, ExitStatus::code(1));
    drain(&mut pool, &mut rx).await;

    let (second, _r2) = pool.spawn().await.unwrap();
    adapter.report_ready(second, None);
    drain(&mut pool, &mut rx).await;

    let (third, _r3) = pool.spawn().await.unwrap();
    adapter.exit(third, ExitStatus::code(1));
    let outcomes = drain(&mut pool, &mut rx).await;

    assert!(matches!(outcomes[..], [PoolOutcome::StartupFailed { .. }]));
}

#[tokio::test]
async fn kill_of_dead_worker_only_logs() {
    let (mut pool, adapter, mut rx) = setup();
    let (id, _readiness) = pool.spawn().await.unwrap();
    adapter.crash(id, 9);
    drain(&mut pool, &mut rx).await;

    pool.kill(id).await;

    assert!(adapter.calls().contains(&ProcessCall::Kill { id }));
}

#[tokio::test]
async fn retire_all_retires_connected_workers() {
    let (mut pool, adapter, mut rx) = setup();
    for _ in 0..3 {
        pool.spawn().await.unwrap();
    }
    drain(&mut pool, &mut rx).await;

    assert_eq!(pool.retire_all().await, 3);
    drain(&mut pool, &mut rx).await;

    assert!(pool.registry().is_empty());
    assert_eq!(
        adapter.retired(),
        vec![WorkerId(1), WorkerId(2), WorkerId(3)]
    );
}
