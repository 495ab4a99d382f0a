// Query window shared by every query of one summarization pass.

use serde::Serialize;

/// Default sampling resolution for range queries, in seconds.
pub const DEFAULT_STEP_SECS: i64 = 15;

/// Half-open `[start, end)` interval in epoch seconds plus the range-query step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: i64,
    end: i64,
    step: i64,
}

impl TimeWindow {
    /// Window ending `end_offset` seconds before now and spanning `nseconds`.
    pub fn ending_now(nseconds: i64, end_offset: i64) -> anyhow::Result<Self> {
        let now = chrono::Utc::now().timestamp();
        let end = now
            .checked_sub(end_offset)
            .ok_or_else(|| anyhow::anyhow!("end offset {} out of range", end_offset))?;
        Self::ending_at(end, nseconds)
    }

    /// Window ending at `end` (epoch seconds) and spanning `nseconds`.
    pub fn ending_at(end: i64, nseconds: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(nseconds > 0, "nseconds must be > 0, got {}", nseconds);
        let start = end
            .checked_sub(nseconds)
            .ok_or_else(|| {
                anyhow::anyhow!("window of {}s before {} out of range", nseconds, end)
            })?;
        Ok(Self {
            start,
            end,
            step: DEFAULT_STEP_SECS,
        })
    }

    /// Window starting at `start` (epoch seconds) and spanning `nseconds`.
    pub fn starting_at(start: i64, nseconds: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(nseconds > 0, "nseconds must be > 0, got {}", nseconds);
        let end = start
            .checked_add(nseconds)
            .ok_or_else(|| {
                anyhow::anyhow!("window of {}s after {} out of range", nseconds, start)
            })?;
        Ok(Self {
            start,
            end,
            step: DEFAULT_STEP_SECS,
        })
    }

    pub fn with_step(self, step: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(step > 0, "step must be > 0, got {}", step);
        Ok(Self { step, ..self })
    }

    /// Single-sample resolution: step equals the whole window.
    pub fn coarse(self) -> Self {
        Self {
            step: self.duration(),
            ..self
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn duration(&self) -> i64 {
        self.end - self.start
    }
}
