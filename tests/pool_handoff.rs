//! Worker pool: startup, handoff protocol, and exclusive driving.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use proctree::demo::BoundedCompute;
use proctree::{
    DriverMode, Node, Outcome, PoolConfig, PoolError, Process, StepCtx, WorkerDriver, WorkerPool,
};

struct Idle;

impl Process for Idle {
    fn name(&self) -> &'static str {
        "Idle"
    }
    fn advance(&mut self, _ctx: &mut StepCtx<'_>) -> Outcome {
        Outcome::Pending
    }
}

/// Leaf that records the thread driving every advance call.
struct ThreadProbe {
    calls: Arc<AtomicU32>,
    threads: Arc<Mutex<HashSet<ThreadId>>>,
    finish_after: u32,
}

impl Process for ThreadProbe {
    fn name(&self) -> &'static str {
        "ThreadProbe"
    }

    fn advance(&mut self, _ctx: &mut StepCtx<'_>) -> Outcome {
        self.threads.lock().unwrap().insert(thread::current().id());
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls >= self.finish_after {
            Outcome::Success
        } else {
            Outcome::Pending
        }
    }
}

/// Strategy that records worker indices and captures the drivers instead of
/// spawning threads, so tests can drive sweeps deterministically.
fn capturing_strategy(
    indices: &Arc<Mutex<Vec<u16>>>,
    drivers: &Arc<Mutex<Vec<WorkerDriver>>>,
) -> proctree::DriverCreate {
    let indices = Arc::clone(indices);
    let drivers = Arc::clone(drivers);
    Box::new(move |driver, index| {
        indices.lock().unwrap().push(index);
        drivers.lock().unwrap().push(driver);
        Ok(())
    })
}

#[test]
fn startup_invokes_strategy_once_per_worker() {
    let indices = Arc::new(Mutex::new(Vec::new()));
    let drivers = Arc::new(Mutex::new(Vec::new()));

    let cfg = PoolConfig {
        workers: 3,
        sweep_interval: Duration::from_millis(2),
        strategy: Some(capturing_strategy(&indices, &drivers)),
    };
    let (pool_node, _handle) = WorkerPool::create(cfg).unwrap();
    let root = Node::new(Idle);
    root.start(Arc::clone(&pool_node), DriverMode::ByParent)
        .unwrap();

    root.sweep();
    assert_eq!(*indices.lock().unwrap(), vec![0, 1, 2]);

    // Worker creation is one-shot: further sweeps add nothing.
    root.sweep();
    root.sweep();
    assert_eq!(indices.lock().unwrap().len(), 3);
    assert_eq!(pool_node.outcome(), Outcome::Pending);
}

#[test]
fn handoff_is_driven_only_by_the_assigned_worker() {
    let indices = Arc::new(Mutex::new(Vec::new()));
    let drivers = Arc::new(Mutex::new(Vec::new()));

    let cfg = PoolConfig {
        workers: 1,
        sweep_interval: Duration::from_millis(2),
        strategy: Some(capturing_strategy(&indices, &drivers)),
    };
    let (pool_node, pool) = WorkerPool::create(cfg).unwrap();
    let root = Node::new(Idle);
    root.start(pool_node, DriverMode::ByParent).unwrap();
    root.sweep();

    let mut driver = drivers.lock().unwrap().pop().expect("one captured driver");
    assert_eq!(driver.index(), 0);

    let calls = Arc::new(AtomicU32::new(0));
    let threads = Arc::new(Mutex::new(HashSet::new()));
    let job = Node::new(ThreadProbe {
        calls: Arc::clone(&calls),
        threads: Arc::clone(&threads),
        finish_after: 3,
    });
    root.start(Arc::clone(&job), DriverMode::ByExternalDriver)
        .unwrap();

    // Attached but not yet added: nobody advances it.
    root.sweep();
    root.sweep();
    assert_eq!(calls.load(Ordering::Relaxed), 0);

    pool.add(&job).unwrap();

    // Still invisible to the parent's sweep.
    root.sweep();
    assert_eq!(calls.load(Ordering::Relaxed), 0);

    // The worker's sweep advances it, one call per pass.
    driver.sweep_once();
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    driver.sweep_once();
    driver.sweep_once();
    assert_eq!(calls.load(Ordering::Relaxed), 3);
    assert_eq!(job.outcome(), Outcome::Success);

    // Terminal: further worker sweeps no longer touch the body.
    driver.sweep_once();
    assert_eq!(calls.load(Ordering::Relaxed), 3);
    assert_eq!(driver.assigned_len(), 1, "still assigned until repelled");

    // Owner observes the terminal outcome and repels; the worker drops the
    // dead assignment on its next pass.
    root.repel(&job).unwrap();
    drop(job);
    driver.sweep_once();
    assert_eq!(driver.assigned_len(), 0);
}

#[test]
fn round_robin_spreads_nodes_and_never_reassigns() {
    let indices = Arc::new(Mutex::new(Vec::new()));
    let drivers = Arc::new(Mutex::new(Vec::new()));

    let cfg = PoolConfig {
        workers: 2,
        sweep_interval: Duration::from_millis(2),
        strategy: Some(capturing_strategy(&indices, &drivers)),
    };
    let (pool_node, pool) = WorkerPool::create(cfg).unwrap();
    let root = Node::new(Idle);
    root.start(pool_node, DriverMode::ByParent).unwrap();
    root.sweep();

    let mut assigned = Vec::new();
    let mut jobs = Vec::new();
    for _ in 0..4 {
        let job = BoundedCompute::create(Duration::from_secs(3600), 100).unwrap();
        root.start(Arc::clone(&job), DriverMode::ByExternalDriver)
            .unwrap();
        assigned.push(pool.add(&job).unwrap());
        jobs.push(job);
    }
    assert_eq!(assigned, vec![0, 1, 0, 1]);

    // A node joins at most one worker, ever.
    assert_eq!(
        pool.add(&jobs[0]).unwrap_err(),
        PoolError::AlreadyAssigned("BoundedCompute")
    );

    // Each worker sees exactly its own share.
    let mut drivers = drivers.lock().unwrap();
    for driver in drivers.iter_mut() {
        driver.sweep_once();
        assert_eq!(driver.assigned_len(), 2);
    }
}

#[test]
fn add_preconditions_are_enforced() {
    let (pool_node, pool) = WorkerPool::create(PoolConfig::new(1)).unwrap();
    let root = Node::new(Idle);
    root.start(pool_node, DriverMode::ByParent).unwrap();

    // Wrong driver mode.
    let by_parent = BoundedCompute::create(Duration::from_secs(1), 10).unwrap();
    root.start(Arc::clone(&by_parent), DriverMode::ByParent)
        .unwrap();
    assert_eq!(
        pool.add(&by_parent).unwrap_err(),
        PoolError::NotExternallyDriven("BoundedCompute")
    );

    // Not attached anywhere yet.
    let loose = BoundedCompute::create(Duration::from_secs(1), 10).unwrap();
    assert_eq!(
        pool.add(&loose).unwrap_err(),
        PoolError::NotAttached("BoundedCompute")
    );
}

#[test]
fn panicking_body_does_not_starve_worker_siblings() {
    struct Defective;
    impl Process for Defective {
        fn name(&self) -> &'static str {
            "Defective"
        }
        fn advance(&mut self, _ctx: &mut StepCtx<'_>) -> Outcome {
            panic!("defective body");
        }
    }

    // One worker, so both nodes share a driver thread.
    let (pool_node, pool) = WorkerPool::create(PoolConfig::new(1)).unwrap();
    let root = Node::new(Idle);
    root.start(pool_node, DriverMode::ByParent).unwrap();
    root.sweep();

    let calls = Arc::new(AtomicU32::new(0));
    let threads = Arc::new(Mutex::new(HashSet::new()));
    let bad = Node::new(Defective);
    let good = Node::new(ThreadProbe {
        calls: Arc::clone(&calls),
        threads: Arc::clone(&threads),
        finish_after: 3,
    });
    root.start(Arc::clone(&bad), DriverMode::ByExternalDriver)
        .unwrap();
    root.start(Arc::clone(&good), DriverMode::ByExternalDriver)
        .unwrap();
    pool.add(&bad).unwrap();
    pool.add(&good).unwrap();

    // The panic settles the defective node; the worker thread survives and
    // keeps sweeping the sibling to completion.
    let deadline = Instant::now() + Duration::from_secs(5);
    while good.outcome().is_pending() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(bad.outcome(), Outcome::Error);
    assert_eq!(good.outcome(), Outcome::Success);
    assert_eq!(calls.load(Ordering::Relaxed), 3);

    root.repel(&bad).unwrap();
    root.repel(&good).unwrap();
}

#[test]
fn pool_worker_thread_drives_the_node_exclusively() {
    // Real threads, portable default strategy.
    let (pool_node, pool) = WorkerPool::create(PoolConfig::new(1)).unwrap();
    let root = Node::new(Idle);
    root.start(pool_node, DriverMode::ByParent).unwrap();
    root.sweep(); // spins up the worker

    let calls = Arc::new(AtomicU32::new(0));
    let threads = Arc::new(Mutex::new(HashSet::new()));
    let job = Node::new(ThreadProbe {
        calls: Arc::clone(&calls),
        threads: Arc::clone(&threads),
        finish_after: 5,
    });
    root.start(Arc::clone(&job), DriverMode::ByExternalDriver)
        .unwrap();
    pool.add(&job).unwrap();

    // The owner keeps sweeping its own tree while the worker runs.
    let deadline = Instant::now() + Duration::from_secs(5);
    while job.outcome().is_pending() && Instant::now() < deadline {
        root.sweep();
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(job.outcome(), Outcome::Success);
    assert_eq!(calls.load(Ordering::Relaxed), 5);

    // Every advance ran on one thread, and not on this one.
    let threads = threads.lock().unwrap();
    assert_eq!(threads.len(), 1);
    assert!(!threads.contains(&thread::current().id()));

    root.repel(&job).unwrap();
}
