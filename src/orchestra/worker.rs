use crate::orchestra::communication::{Reply, Task};
use crate::orchestra::error::{Result, ScanError};
use crate::primality::Verdict;
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

/// Function a worker applies to every integer it receives.
pub type Probe = fn(u64) -> Verdict;

/// Runs `body` against a dedicated pool of `worker_count` threads.
///
/// The pool lives only for the duration of `body`: its threads are spawned in
/// a `std::thread::scope` and every one of them is joined before this function
/// returns, on the error path too. Two consecutive trials therefore never share
/// a live thread.
///
/// # Parameters
/// - `worker_count`: Number of threads in the pool.
/// - `body`: Work to run while the pool is up. Jobs spawned on the pool from
///   `body` run on its threads.
///
/// # Returns
/// Whatever `body` returns, or `InvalidInput` when `worker_count` is zero and
/// `ResourceExhaustion` when the threads cannot be created.
pub fn with_pool<R, F>(worker_count: usize, body: F) -> Result<R>
where
    F: FnOnce(&ThreadPool) -> R,
{
    if worker_count == 0 {
        return Err(ScanError::invalid_input("worker_count must be at least 1"));
    }

    debug!("building pool of {worker_count} worker(s)");
    let result = ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|i| format!("prime-worker-{i}"))
        .build_scoped(|thread| thread.run(), body)
        .map_err(ScanError::pool_failed)?;
    debug!("pool of {worker_count} worker(s) torn down");

    Ok(result)
}

/// Executes one task on the current thread.
///
/// A panic raised by the probe is caught and turned into [`Reply::Failed`],
/// so the scanner is never left waiting for a reply that will not come.
///
/// # Returns
/// `None` when `cancelled` is set, either before the task starts or part way
/// through a chunk.
pub fn run_task(task: &Task, probe: Probe, cancelled: &AtomicBool) -> Option<Reply> {
    if cancelled.load(Ordering::Relaxed) {
        return None;
    }

    match panic::catch_unwind(AssertUnwindSafe(|| execute(task, probe, cancelled))) {
        Ok(reply) => reply,
        Err(payload) => Some(Reply::Failed {
            worker_id: rayon::current_thread_index(),
            reason: panic_message(payload.as_ref()),
        }),
    }
}

fn execute(task: &Task, probe: Probe, cancelled: &AtomicBool) -> Option<Reply> {
    match task {
        Task::Single(x) => Some(Reply::Single(probe(*x).prime())),
        Task::Chunk { index, range } => {
            let mut primes = Vec::new();
            for x in range.clone() {
                if cancelled.load(Ordering::Relaxed) {
                    return None;
                }
                primes.extend(probe(x).prime());
            }
            Some(Reply::Chunk {
                index: *index,
                primes,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("worker panicked: {msg}")
    } else {
        "worker panicked".to_string()
    }
}
