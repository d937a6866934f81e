//! Percentage bookkeeping for one job.

/// A deduplicated progress update, ready for the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub pass: i32,
    pub total: i32,
    pub percent: i64,
}

/// Turns raw engine pass counters into updates, dropping repeats.
///
/// Passes the job runs outside the engine (the lossless transform step) are
/// added on top of the engine's own pass count.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last_percent: Option<i64>,
    completed_extra_passes: i32,
    total_extra_passes: i32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce `passes` extra passes that will run outside the engine.
    pub fn add_extra_passes(&mut self, passes: i32) {
        self.total_extra_passes += passes;
    }

    /// Mark one extra pass done.
    pub fn complete_extra_pass(&mut self) {
        self.completed_extra_passes = (self.completed_extra_passes + 1).min(self.total_extra_passes);
    }

    /// Feed the engine's counters.
    ///
    /// Returns an update only when the whole-number percentage differs from
    /// the last one returned.
    ///
    /// # Arguments
    ///
    /// * `counter` / `limit` - work units done and expected in this pass
    /// * `completed_passes` / `total_passes` - the engine's pass counters
    pub fn update(
        &mut self,
        counter: i64,
        limit: i64,
        completed_passes: i32,
        total_passes: i32,
    ) -> Option<ProgressUpdate> {
        let percent = if limit > 0 {
            counter.saturating_mul(100) / limit
        } else {
            0
        };
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(ProgressUpdate {
            pass: completed_passes + self.completed_extra_passes + 1,
            total: total_passes + self.total_extra_passes,
            percent,
        })
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
