use std::time::Duration;

/// Retry delays in milliseconds: 5s, 15s, 45s, 135s, 10m, 30m, 1h.
pub const DEFAULT_BACKOFF_MS: [u64; 7] = [
    5_000, 15_000, 45_000, 135_000, 600_000, 1_800_000, 3_600_000,
];

/// Fixed escalating retry table, clamped to its last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps_ms: Vec<u64>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            steps_ms: DEFAULT_BACKOFF_MS.to_vec(),
        }
    }
}

impl BackoffSchedule {
    /// Build a schedule from explicit delays. An empty table falls back to
    /// the default one.
    pub fn new(steps_ms: impl Into<Vec<u64>>) -> Self {
        let steps_ms = steps_ms.into();
        if steps_ms.is_empty() {
            return Self::default();
        }
        Self { steps_ms }
    }

    pub fn steps(&self) -> &[u64] {
        &self.steps_ms
    }

    /// Delay for a record that has failed `tries` times, indexed directly by
    /// the try count. The first entry only applies to a record that has never
    /// failed, so the first retry waits the second entry.
    pub fn delay_ms(&self, tries: u32) -> u64 {
        let index = usize::try_from(tries)
            .unwrap_or(usize::MAX)
            .min(self.steps_ms.len() - 1);
        self.steps_ms[index]
    }

    pub fn delay(&self, tries: u32) -> Duration {
        Duration::from_millis(self.delay_ms(tries))
    }

    pub fn next_attempt_at(&self, now_ms: i64, tries: u32) -> i64 {
        let delay = i64::try_from(self.delay_ms(tries)).unwrap_or(i64::MAX);
        now_ms.saturating_add(delay)
    }
}
