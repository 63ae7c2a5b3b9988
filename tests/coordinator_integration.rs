//! Lock discipline between the render thread and the logic worker

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use skyrunner::config::TimingConfig;
use skyrunner::thread_pool::{ConcurrencyCoordinator, Guarded, LockId, TaskState};

fn timing(lock_ms: u64) -> TimingConfig {
    TimingConfig {
        lock_deadline_ms: lock_ms,
        shutdown_grace_ms: 500,
        ..TimingConfig::default()
    }
}

#[test]
fn test_writer_on_worker_blocks_render_reads_only_briefly() {
    let coordinator = ConcurrencyCoordinator::new(&timing(5)).unwrap();
    let counter = Arc::new(Guarded::new(LockId::Player, 0u32));

    let held = Arc::clone(&counter);
    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let handle = coordinator
        .submit(move |_| {
            let mut value = held.try_write_for(Duration::from_secs(1)).unwrap();
            let _ = started_tx.send(());
            std::thread::sleep(Duration::from_millis(60));
            *value += 1;
        })
        .unwrap();

    started_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(coordinator.read_under_lock(&counter, |v| *v), None);
    assert_eq!(coordinator.skipped_sections(), 1);

    assert_eq!(handle.wait(Duration::from_secs(2)), TaskState::Completed);
    assert_eq!(coordinator.read_under_lock(&counter, |v| *v), Some(1));
    coordinator.shutdown();
}

#[test]
fn test_tasks_run_in_submission_order() {
    let coordinator = ConcurrencyCoordinator::new(&timing(16)).unwrap();
    let log = Arc::new(Guarded::new(LockId::Platforms, Vec::new()));

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let log = Arc::clone(&log);
            coordinator
                .submit(move |_| {
                    log.try_write_for(Duration::from_secs(1)).unwrap().push(i);
                })
                .unwrap()
        })
        .collect();

    for handle in &handles {
        assert_eq!(handle.wait(Duration::from_secs(2)), TaskState::Completed);
    }
    assert_eq!(
        coordinator.read_under_lock(&log, |v| v.clone()),
        Some(vec![0, 1, 2, 3, 4])
    );
}

#[test]
fn test_cancelled_task_checks_flag_between_steps() {
    let coordinator = ConcurrencyCoordinator::new(&timing(16)).unwrap();
    let steps = Arc::new(AtomicUsize::new(0));

    let done = Arc::clone(&steps);
    let handle = coordinator
        .submit(move |context| {
            for _ in 0..3 {
                if context.is_cancelled() {
                    return;
                }
                done.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(40));
            }
        })
        .unwrap();

    while handle.state() != TaskState::Running {
        std::thread::yield_now();
    }
    assert_eq!(handle.wait(Duration::from_millis(10)), TaskState::TimedOut);

    coordinator.shutdown();
    assert!(steps.load(Ordering::SeqCst) < 3);
    assert!(coordinator.submit(|_| {}).is_err());
}
