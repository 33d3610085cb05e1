//! Persisting the best trial.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use st_types::{Fitness, ParameterVector, StResult, StudyError};

use crate::trial::{ObjectiveDirection, StudyResult};

/// Default result file name.
pub const DEFAULT_RESULTS_PATH: &str = "best_results.json";

/// Where a finished [`StudyResult`] goes.
pub trait ResultReporter {
    /// A failure here never changes the result itself.
    fn report(&self, result: &StudyResult) -> StResult<()>;
}

/// On-disk shape of the result file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    pub best_params: ParameterVector,
    /// `null` when every trial failed.
    pub best_value: Fitness,
    pub best_trial_number: usize,
    pub direction: ObjectiveDirection,
}

impl From<&StudyResult> for ResultFile {
    fn from(result: &StudyResult) -> Self {
        Self {
            best_params: result.best_params,
            best_value: result.best_value,
            best_trial_number: result.best_trial_number,
            direction: result.direction,
        }
    }
}

/// Writes pretty-printed JSON to a single file.
#[derive(Debug, Clone)]
pub struct JsonFileReporter {
    path: PathBuf,
}

impl JsonFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, message: impl ToString) -> StudyError {
        StudyError::Persistence {
            path: self.path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl Default for JsonFileReporter {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_PATH)
    }
}

impl ResultReporter for JsonFileReporter {
    fn report(&self, result: &StudyResult) -> StResult<()> {
        let json = serde_json::to_string_pretty(&ResultFile::from(result))
            .map_err(|e| self.persistence_error(e))?;
        std::fs::write(&self.path, json).map_err(|e| self.persistence_error(e))?;
        info!(path = %self.path.display(), "Saved best results");
        Ok(())
    }
}
