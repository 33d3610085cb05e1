//! # st-eval
//!
//! Runs the external PSO program for one parameter vector and turns whatever
//! it prints into a single fitness value.

pub mod evaluator;
pub mod extract;
pub mod objective;

pub use evaluator::{EvaluationOutcome, Evaluator, ExternalEvaluator, ProcessOutput, ProgramCommand};
pub use extract::{extract_fitness, parse_fitness};
pub use objective::{Objective, TrialObjective, DEFAULT_TIMEOUT};
