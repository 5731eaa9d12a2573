#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub threads: usize,
    /// Closures currently executing, including ones whose handle was
    /// already cancelled.
    pub active_tasks: usize,
    pub total_spawned: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    /// Handles resolved as cancelled. A task cancelled after it started
    /// lands here even though its closure runs to completion.
    pub cancelled_tasks: usize,
    pub scheduled_tasks: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.threads == 0 {
            return 0.0;
        }
        self.active_tasks.min(self.threads) as f64 / self.threads as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}

#[derive(Debug, Clone)]
pub struct ParallelizerMetrics {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ParallelizerMetrics {
    pub fn total(&self) -> usize {
        self.pending + self.completed + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        let finished = self.completed + self.failed;
        if finished == 0 {
            return 1.0;
        }
        self.completed as f64 / finished as f64
    }
}
