//! Benchmark run status shared between the engine and viewers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use crate::dashboard::clock;

/// Lifecycle phase of a benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Phase::Idle),
            "running" => Ok(Phase::Running),
            "completed" => Ok(Phase::Completed),
            "failed" => Ok(Phase::Failed),
            _ => Err(format!("Invalid benchmark phase: {}", s)),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Point-in-time status of the running benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkStatus {
    pub phase: Phase,
    pub current_scenario: Option<String>,
    pub current_iteration: u32,
    pub total_scenarios: u32,
    pub total_iterations: u32,
    /// Always within [0, 100]
    pub progress_percentage: f64,
    pub started_at: f64,
    pub updated_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_end_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BenchmarkStatus {
    /// Fresh `idle` status stamped with the current time
    pub fn idle() -> Self {
        let now = clock::now();
        Self {
            phase: Phase::Idle,
            current_scenario: None,
            current_iteration: 0,
            total_scenarios: 0,
            total_iterations: 0,
            progress_percentage: 0.0,
            started_at: now,
            updated_at: now,
            estimated_end_time: None,
            error_message: None,
        }
    }
}

/// Partial status update; `None` fields are left untouched.
///
/// ```rust
/// use benchstream::dashboard::status::{Phase, StatusUpdate};
///
/// let update = StatusUpdate::new()
///     .phase(Phase::Running)
///     .scenario("D(100,100)")
///     .progress(25.0);
/// assert_eq!(update.phase, Some(Phase::Running));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub phase: Option<Phase>,
    pub current_scenario: Option<String>,
    pub current_iteration: Option<u32>,
    pub total_scenarios: Option<u32>,
    pub total_iterations: Option<u32>,
    pub progress_percentage: Option<f64>,
    pub estimated_end_time: Option<f64>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn scenario(mut self, scenario: impl Into<String>) -> Self {
        self.current_scenario = Some(scenario.into());
        self
    }

    pub fn iteration(mut self, iteration: u32) -> Self {
        self.current_iteration = Some(iteration);
        self
    }

    pub fn totals(mut self, scenarios: u32, iterations: u32) -> Self {
        self.total_scenarios = Some(scenarios);
        self.total_iterations = Some(iterations);
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress_percentage = Some(progress);
        self
    }

    pub fn estimated_end_time(mut self, at: f64) -> Self {
        self.estimated_end_time = Some(at);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Clamp a progress value into [0, 100]. NaN maps to 0.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Owner of the single mutable [`BenchmarkStatus`] record.
///
/// Writers apply whole updates under the write lock; readers always get a
/// complete clone, never a half-applied record.
#[derive(Debug)]
pub struct StatusTracker {
    status: RwLock<BenchmarkStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(BenchmarkStatus::idle()),
        }
    }

    /// Consistent copy of the current status
    pub fn snapshot(&self) -> BenchmarkStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply an update (last writer wins per field) and return the resulting status
    pub fn apply(&self, update: StatusUpdate) -> BenchmarkStatus {
        self.apply_then(update, BenchmarkStatus::clone)
    }

    /// Apply an update, then run `observe` on the result before the write lock
    /// is released. Publishing from `observe` keeps published statuses in the
    /// same order the updates were applied.
    pub fn apply_then<R>(
        &self,
        update: StatusUpdate,
        observe: impl FnOnce(&BenchmarkStatus) -> R,
    ) -> R {
        let mut status = self
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(phase) = update.phase {
            status.phase = phase;
        }
        if let Some(scenario) = update.current_scenario {
            status.current_scenario = Some(scenario);
        }
        if let Some(iteration) = update.current_iteration {
            status.current_iteration = iteration;
        }
        if let Some(total) = update.total_scenarios {
            status.total_scenarios = total;
        }
        if let Some(total) = update.total_iterations {
            status.total_iterations = total;
        }
        if let Some(progress) = update.progress_percentage {
            status.progress_percentage = clamp_progress(progress);
        }
        if let Some(at) = update.estimated_end_time {
            status.estimated_end_time = Some(at);
        }
        if let Some(message) = update.error_message {
            status.error_message = Some(message);
        }
        status.updated_at = clock::now();

        observe(&status)
    }

    /// Set only the progress percentage, returning the clamped value stored
    pub fn set_progress(&self, progress: f64) -> f64 {
        self.apply_then(StatusUpdate::new().progress(progress), |status| {
            status.progress_percentage
        })
    }

    /// Stamp `started_at` with the current time; called when the dashboard starts
    pub fn mark_started(&self) -> f64 {
        let mut status = self
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let now = clock::now();
        status.started_at = now;
        status.updated_at = now;
        now
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
