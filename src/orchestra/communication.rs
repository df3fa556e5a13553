use std::ops::Range;

/// Unit of work sent from the scanner to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Test a single integer (eager dispatch).
    Single(u64),
    /// Test every integer in `range`; `index` is the chunk's position in the interval.
    Chunk { index: usize, range: Range<u64> },
}

/// Message sent back from the workers to the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Verdict for a `Task::Single`. `None` when the number is not prime.
    Single(Option<u64>),
    /// Primes found in a chunk, ascending.
    Chunk { index: usize, primes: Vec<u64> },
    /// Primes of every chunk of a batched trial, in interval order.
    Batch { primes: Vec<u64> },
    /// A worker failed while executing a task. `worker_id` is its index in
    /// the pool, `None` when the task ran outside one.
    Failed {
        worker_id: Option<usize>,
        reason: String,
    },
}

impl Task {
    /// Number of interval elements covered by this task.
    pub fn span(&self) -> u64 {
        match self {
            Task::Single(_) => 1,
            Task::Chunk { range, .. } => range.end.saturating_sub(range.start),
        }
    }
}

/// Splits `range` into consecutive chunks of at most `chunk_size` elements.
pub fn chunked(range: Range<u64>, chunk_size: u64) -> impl Iterator<Item = Task> {
    let chunk_size = chunk_size.max(1);
    let mut next = range.start;
    let mut index = 0;
    std::iter::from_fn(move || {
        if next >= range.end {
            return None;
        }
        let end = next.saturating_add(chunk_size).min(range.end);
        let task = Task::Chunk {
            index,
            range: next..end,
        };
        next = end;
        index += 1;
        Some(task)
    })
}
