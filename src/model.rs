#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub num_threads: usize,
    /// Worker threads still alive. Zero once shutdown has joined them.
    pub live_workers: usize,
    pub active_tasks: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_spawned: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub rejected_tasks: usize,
}

impl PoolMetrics {
    /// Share of worker threads currently driving an isolated scheduler.
    pub fn utilization(&self) -> f64 {
        if self.num_threads == 0 {
            return 0.0;
        }
        let busy = self.num_threads.saturating_sub(self.idle_workers);
        busy as f64 / self.num_threads as f64
    }

    pub fn queue_pressure(&self) -> f64 {
        self.queued_tasks as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}

/// Lifecycle of one delegation. Moves from `Pending` to `Settled` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationState {
    Pending,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOrdering {
    /// Outcomes in submission order.
    Ordered,
    /// Outcomes in completion order.
    UnOrdered,
}
