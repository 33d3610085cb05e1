//! Command-line arguments and how they map onto a study.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use st_eval::ProgramCommand;
use st_optimizer::{StrategyKind, StudyConfig, TpeSettings, DEFAULT_RESULTS_PATH, DEFAULT_TRIALS};
use st_types::{config_error, StResult};

/// Where the PSO build drops its jar, relative to the working directory.
pub const DEFAULT_JAR: &str =
    "PSO_thermoforming/thermoforming_optimization/target/thermoforming_optimization-1.0.jar";

#[derive(Debug, Parser)]
#[command(
    name = "swarmtune",
    version,
    about = "Tune PSO hyperparameters by running an external optimizer"
)]
pub struct Args {
    /// PSO jar, run as `<java> -jar <jar> swarmSize maxIters inertia c1 c2`
    #[arg(long, default_value = DEFAULT_JAR, conflicts_with = "program")]
    pub jar: PathBuf,

    /// Native executable to run instead of a jar
    #[arg(long)]
    pub program: Option<PathBuf>,

    /// Java launcher used for --jar
    #[arg(long, default_value = "java")]
    pub java: PathBuf,

    /// Number of trials
    #[arg(long, default_value_t = DEFAULT_TRIALS)]
    pub trials: usize,

    /// Per-trial timeout in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Search strategy: tpe or random
    #[arg(long, default_value = "tpe")]
    pub strategy: StrategyKind,

    /// Seed for reproducible proposals
    #[arg(long)]
    pub seed: Option<u64>,

    /// Random trials before the TPE model is used
    #[arg(long, default_value_t = TpeSettings::default().startup_trials)]
    pub startup_trials: usize,

    /// Where to write the best result
    #[arg(long, short, default_value = DEFAULT_RESULTS_PATH)]
    pub output: PathBuf,
}

impl Args {
    /// The file that must exist before any trial runs.
    pub fn target(&self) -> &Path {
        self.program.as_deref().unwrap_or(&self.jar)
    }

    /// Absolute path of the external program, or an error if it is missing.
    pub fn resolve_target(&self) -> StResult<PathBuf> {
        let target = self.target();
        if !target.is_file() {
            return Err(config_error!(
                "{} not found at `{}`. Please build the project or correct the path.",
                if self.program.is_some() { "Program" } else { "JAR" },
                target.display()
            ));
        }
        Ok(std::fs::canonicalize(target)?)
    }

    pub fn command(&self, target: PathBuf) -> ProgramCommand {
        if self.program.is_some() {
            ProgramCommand::new(target)
        } else {
            ProgramCommand::jar(&self.java, target)
        }
    }

    pub fn study_config(&self) -> StudyConfig {
        StudyConfig::new("pso-hyperparameters")
            .with_trials(self.trials)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_strategy(self.strategy)
            .with_seed(self.seed)
            .with_tpe(TpeSettings {
                startup_trials: self.startup_trials,
                ..TpeSettings::default()
            })
    }
}
