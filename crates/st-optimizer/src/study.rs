//! The sequential search loop.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use st_eval::{ExternalEvaluator, Objective, ProgramCommand, TrialObjective, DEFAULT_TIMEOUT};
use st_types::{SearchSpace, StResult, StudyError};

use crate::search::{build_strategy, SearchStrategy, StrategyKind, TpeSettings};
use crate::trial::{StudyResult, StudyStatus, TrialRecord};

/// Default number of trials per study.
pub const DEFAULT_TRIALS: usize = 100;

/// Top-level configuration for a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    pub name: String,

    /// Trials to run. Fixed once the study starts.
    pub n_trials: usize,

    /// Hard limit on each external evaluation.
    pub timeout: Duration,

    pub strategy: StrategyKind,

    /// Seed for reproducible proposals.
    pub seed: Option<u64>,

    pub tpe: TpeSettings,
}

impl StudyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            n_trials: DEFAULT_TRIALS,
            timeout: DEFAULT_TIMEOUT,
            strategy: StrategyKind::default(),
            seed: None,
            tpe: TpeSettings::default(),
        }
    }

    pub fn with_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tpe(mut self, tpe: TpeSettings) -> Self {
        self.tpe = tpe;
        self
    }

    pub fn validate(&self) -> Result<(), StudyError> {
        let invalid = |message: &str| StudyError::InvalidConfig {
            message: message.to_string(),
        };
        if self.n_trials == 0 {
            return Err(invalid("n_trials must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be positive"));
        }
        if !(self.tpe.gamma > 0.0 && self.tpe.gamma < 1.0) {
            return Err(invalid("gamma must lie in (0, 1)"));
        }
        Ok(())
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self::new("pso-tuning")
    }
}

/// Cooperative stop signal, checked between trials only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a finished study produced.
#[derive(Debug, Clone)]
pub struct StudyOutcome {
    pub records: Vec<TrialRecord>,
    pub result: StudyResult,
    pub status: StudyStatus,
    pub cancelled: bool,
}

/// Drives propose → evaluate → update for a fixed number of trials.
///
/// One trial finishes completely before the next proposal is made, so the
/// strategy's model is only ever touched from this loop.
pub struct Study<O> {
    config: StudyConfig,
    objective: O,
    strategy: Box<dyn SearchStrategy>,
    cancel: CancelFlag,
}

impl Study<TrialObjective<ExternalEvaluator>> {
    /// Study scoring trials with the external program, bounded by `config.timeout`.
    pub fn external(config: StudyConfig, command: ProgramCommand) -> StResult<Self> {
        let objective =
            TrialObjective::new(ExternalEvaluator::new(command)).with_timeout(config.timeout);
        Self::new(config, objective)
    }
}

impl<O: Objective> Study<O> {
    /// Study over the fixed swarm space using the configured strategy.
    pub fn new(config: StudyConfig, objective: O) -> StResult<Self> {
        let strategy = build_strategy(
            config.strategy,
            SearchSpace::swarm(),
            config.tpe,
            config.seed,
        );
        Self::with_strategy(config, objective, strategy)
    }

    pub fn with_strategy(
        config: StudyConfig,
        objective: O,
        strategy: Box<dyn SearchStrategy>,
    ) -> StResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            objective,
            strategy,
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub async fn run(mut self) -> StResult<StudyOutcome> {
        let mut status = StudyStatus::new(self.config.name.clone());
        let mut records = Vec::with_capacity(self.config.n_trials);
        let mut cancelled = false;

        status.mark_running();
        info!(
            study = %self.config.name,
            n_trials = self.config.n_trials,
            strategy = self.strategy.name(),
            "Starting study"
        );

        for number in 0..self.config.n_trials {
            if self.cancel.is_cancelled() {
                info!(completed = records.len(), "Study cancelled");
                cancelled = true;
                break;
            }

            let params = self.strategy.propose();
            let started_at = Utc::now();
            let fitness = self.objective.score(&params).await;
            self.strategy.update(&params, fitness);

            let record = TrialRecord::new(number, params, fitness, started_at);
            status.record(&record);
            info!(
                trial = number,
                fitness = %fitness,
                best = %status.best_fitness(),
                duration_secs = record.duration_seconds(),
                "Trial finished"
            );
            records.push(record);
        }

        if cancelled {
            status.mark_cancelled();
        } else {
            status.mark_completed();
        }

        let result = StudyResult::from_records(&records)?;
        if result.is_degenerate() {
            warn!(
                n_trials = result.n_trials,
                "Every trial failed; no valid optimum was found"
            );
        } else {
            info!(
                best_trial = result.best_trial_number,
                best_value = %result.best_value,
                best_params = %result.best_params,
                failed = status.trials_failed,
                "Study finished"
            );
        }

        Ok(StudyOutcome {
            records,
            result,
            status,
            cancelled,
        })
    }
}
