//! Trial tracking and study results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use st_types::{Fitness, ParameterVector, StResult, StudyError};

/// Unique study identifier.
pub type StudyId = Uuid;

/// Optimization direction. Studies always minimize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    #[default]
    Minimize,
}

impl fmt::Display for ObjectiveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "minimize")
    }
}

/// Lifecycle state for a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyState {
    Pending,
    Running,
    Completed,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Complete,
    /// The objective returned the sentinel.
    Failed,
}

/// One finished propose/evaluate/update cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: Uuid,
    pub number: usize,
    pub params: ParameterVector,
    pub fitness: Fitness,
    pub state: TrialState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TrialRecord {
    pub fn new(
        number: usize,
        params: ParameterVector,
        fitness: Fitness,
        started_at: DateTime<Utc>,
    ) -> Self {
        let state = if fitness.is_sentinel() {
            TrialState::Failed
        } else {
            TrialState::Complete
        };
        Self {
            id: Uuid::new_v4(),
            number,
            params,
            fitness,
            state,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Strictly better: lower fitness, or equal fitness from an earlier trial.
    pub fn beats(&self, other: &TrialRecord) -> bool {
        (self.fitness, self.number) < (other.fitness, other.number)
    }
}

/// Aggregate status of a running study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyStatus {
    pub id: StudyId,
    pub name: String,
    pub state: StudyState,
    pub trials_completed: usize,
    pub trials_failed: usize,
    pub best_trial: Option<TrialRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StudyStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: StudyState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            best_trial: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = StudyState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = StudyState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.state = StudyState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Count a finished trial and keep the best one.
    pub fn record(&mut self, record: &TrialRecord) {
        self.trials_completed += 1;
        if record.state == TrialState::Failed {
            self.trials_failed += 1;
        }
        let improves = match &self.best_trial {
            None => true,
            Some(current_best) => record.beats(current_best),
        };
        if improves {
            self.best_trial = Some(record.clone());
        }
    }

    pub fn best_fitness(&self) -> Fitness {
        self.best_trial
            .as_ref()
            .map(|t| t.fitness)
            .unwrap_or(Fitness::SENTINEL)
    }
}

/// Final, immutable outcome of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyResult {
    pub best_params: ParameterVector,
    pub best_value: Fitness,
    pub best_trial_number: usize,
    pub direction: ObjectiveDirection,
    pub n_trials: usize,
}

impl StudyResult {
    /// Minimal fitness over all records, ties going to the earliest trial.
    pub fn from_records(records: &[TrialRecord]) -> StResult<Self> {
        let best = records
            .iter()
            .min_by_key(|r| (r.fitness, r.number))
            .ok_or(StudyError::NoTrials)?;

        Ok(Self {
            best_params: best.params,
            best_value: best.fitness,
            best_trial_number: best.number,
            direction: ObjectiveDirection::Minimize,
            n_trials: records.len(),
        })
    }

    /// Every trial failed, so `best_params` is not a real optimum.
    pub fn is_degenerate(&self) -> bool {
        self.best_value.is_sentinel()
    }

    /// `Err(StudyError::Degenerate)` instead of a meaningless optimum.
    pub fn ensure_valid(&self) -> Result<&Self, StudyError> {
        if self.is_degenerate() {
            Err(StudyError::Degenerate {
                n_trials: self.n_trials,
            })
        } else {
            Ok(self)
        }
    }
}
