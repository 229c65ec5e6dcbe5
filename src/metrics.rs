//! Statistics collected over one clustering run.
//!
//! Every successful `MapReduce` returns a [`RunStatistics`] next to the final
//! clusters:
//!
//! ```ignore
//! let out = master.map_reduce(10, "points.txt")?;
//! println!("{}", out.stats.summary());
//! // RunStatistics:
//! //   Iterations: 7 (8 rounds, 1 restarts)
//! //   Mappers: 3 active (1 dropped)
//! //   Changes: first=10000, last=12
//! //   Time: 41.200ms
//! ```

use std::time::Duration;

/// What happened during one run of the master's iteration loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStatistics {
    /// Completed iterations, as returned to the caller.
    pub iterations: usize,
    /// Rounds whose replies reached the reducer.
    pub rounds: usize,
    /// Rounds abandoned because a mapper failed mid-round.
    pub restarts: usize,
    /// Mappers removed from the active pool.
    pub mappers_dropped: usize,
    /// Size of the active pool at the end of the run.
    pub active_mappers: usize,
    /// Total change count reported in each successful round.
    pub changes_per_round: Vec<usize>,
    /// Wall-clock time of the run, dataset load excluded.
    pub elapsed: Duration,
}

impl RunStatistics {
    /// Record a successful round.
    pub fn record_round(&mut self, changes: usize) {
        self.rounds += 1;
        self.changes_per_round.push(changes);
    }

    /// Change count of the last successful round.
    pub fn final_changes(&self) -> Option<usize> {
        self.changes_per_round.last().copied()
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        let first = self
            .changes_per_round
            .first()
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        let last = self
            .final_changes()
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        format!(
            "RunStatistics:\n  \
             Iterations: {} ({} rounds, {} restarts)\n  \
             Mappers: {} active ({} dropped)\n  \
             Changes: first={}, last={}\n  \
             Time: {:.3}ms",
            self.iterations,
            self.rounds,
            self.restarts,
            self.active_mappers,
            self.mappers_dropped,
            first,
            last,
            self.elapsed_ms()
        )
    }
}
