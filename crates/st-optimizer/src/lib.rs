//! # st-optimizer
//!
//! Sequential search over PSO hyperparameters.
//!
//! Provides search strategies (random, tree-structured Parzen estimator),
//! trial tracking, the study loop that drives an objective once per trial,
//! and persistence of the best result.

mod report;
mod search;
mod study;
mod trial;

pub use report::{JsonFileReporter, ResultFile, ResultReporter, DEFAULT_RESULTS_PATH};
pub use search::{
    build_strategy, RandomSearch, SearchStrategy, StrategyKind, TpeSearch, TpeSettings,
};
pub use study::{CancelFlag, Study, StudyConfig, StudyOutcome, DEFAULT_TRIALS};
pub use trial::{
    ObjectiveDirection, StudyId, StudyResult, StudyState, StudyStatus, TrialRecord, TrialState,
};
