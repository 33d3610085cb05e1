//! Search strategies proposing PSO parameter vectors.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use st_types::{
    validation_error, Fitness, ParameterKind, ParameterVector, SearchSpace, StError, DIMS,
};

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
///
/// The loop calls `propose` then, once the trial's fitness is known, `update`
/// with the same vector. Proposals may depend on every earlier update.
pub trait SearchStrategy: Send {
    /// Next parameter vector to evaluate. Always within the search space.
    fn propose(&mut self) -> ParameterVector;

    /// Report a completed trial so adaptive strategies can learn.
    fn update(&mut self, _params: &ParameterVector, _fitness: Fitness) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Which strategy a study uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Random,
    #[default]
    Tpe,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::Tpe => write!(f, "tpe"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = StError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "tpe" | "bayesian" => Ok(Self::Tpe),
            other => Err(validation_error!("unknown search strategy: {other}")),
        }
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn sample_unit(rng: &mut StdRng) -> [f64; DIMS] {
    let mut unit = [0.0; DIMS];
    for u in &mut unit {
        *u = rng.random::<f64>();
    }
    unit
}

// ---- Random search ----

/// Independent uniform sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: StdRng,
}

impl RandomSearch {
    pub fn with_seed(space: SearchSpace, seed: Option<u64>) -> Self {
        Self {
            space,
            rng: make_rng(seed),
        }
    }

    fn sample_one(&mut self) -> ParameterVector {
        let mut raw = [0.0; DIMS];
        for (i, param) in self.space.parameters.iter().enumerate() {
            raw[i] = match param.kind {
                ParameterKind::FloatRange { low, high } => {
                    self.rng.random_range(low..=high)
                }
                ParameterKind::IntRange { low, high } => {
                    self.rng.random_range(low..=high) as f64
                }
            };
        }
        self.space.decode(raw)
    }
}

impl SearchStrategy for RandomSearch {
    fn propose(&mut self) -> ParameterVector {
        self.sample_one()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Tree-structured Parzen estimator ----

/// Settings for [`TpeSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpeSettings {
    /// Purely random proposals before the model kicks in.
    pub startup_trials: usize,
    /// Fraction of finite observations treated as "good".
    pub gamma: f64,
    /// Candidates scored per proposal.
    pub candidates: usize,
}

impl Default for TpeSettings {
    fn default() -> Self {
        Self {
            startup_trials: 10,
            gamma: 0.25,
            candidates: 24,
        }
    }
}

/// Sequential model-based search.
///
/// Observations live in the unit hypercube. Finite results are split at the
/// `gamma` quantile into good and bad sets; sentinel results always count as
/// bad. Each set gets a per-dimension Gaussian Parzen density, candidates are
/// drawn around good points, and the candidate maximizing l(x)/g(x) wins.
#[derive(Debug, Clone)]
pub struct TpeSearch {
    space: SearchSpace,
    settings: TpeSettings,
    rng: StdRng,
    observations: Vec<([f64; DIMS], Fitness)>,
}

impl TpeSearch {
    pub fn with_seed(space: SearchSpace, settings: TpeSettings, seed: Option<u64>) -> Self {
        Self {
            space,
            settings,
            rng: make_rng(seed),
            observations: Vec::new(),
        }
    }

    pub fn observations(&self) -> usize {
        self.observations.len()
    }

    /// Split into (good, bad) points; `None` while the model has too little data.
    fn split(&self) -> Option<(Vec<[f64; DIMS]>, Vec<[f64; DIMS]>)> {
        let mut finite: Vec<&([f64; DIMS], Fitness)> = self
            .observations
            .iter()
            .filter(|(_, fitness)| !fitness.is_sentinel())
            .collect();
        if finite.len() < 2 {
            return None;
        }
        finite.sort_by(|a, b| a.1.cmp(&b.1));

        let n_good = ((self.settings.gamma * finite.len() as f64).ceil() as usize)
            .clamp(1, finite.len() - 1);
        let good = finite[..n_good].iter().map(|(x, _)| *x).collect();
        let bad = finite[n_good..]
            .iter()
            .map(|(x, _)| *x)
            .chain(
                self.observations
                    .iter()
                    .filter(|(_, fitness)| fitness.is_sentinel())
                    .map(|(x, _)| *x),
            )
            .collect();
        Some((good, bad))
    }

    fn bandwidth(n: usize) -> f64 {
        (0.3 * (n as f64).powf(-0.2)).max(0.05)
    }

    fn log_density(points: &[[f64; DIMS]], dim: usize, x: f64) -> f64 {
        let h = Self::bandwidth(points.len());
        let sum: f64 = points
            .iter()
            .map(|p| {
                let z = (x - p[dim]) / h;
                (-0.5 * z * z).exp() / h
            })
            .sum();
        (sum / points.len() as f64 + 1e-12).ln()
    }

    fn gaussian(&mut self) -> f64 {
        // Box-Muller
        let u1: f64 = self.rng.random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = self.rng.random();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    fn model_proposal(&mut self, good: &[[f64; DIMS]], bad: &[[f64; DIMS]]) -> [f64; DIMS] {
        let h = Self::bandwidth(good.len());
        let mut best = sample_unit(&mut self.rng);
        let mut best_score = f64::NEG_INFINITY;

        for _ in 0..self.settings.candidates.max(1) {
            let center = good[self.rng.random_range(0..good.len())];
            let mut candidate = [0.0; DIMS];
            for (d, c) in candidate.iter_mut().enumerate() {
                *c = (center[d] + h * self.gaussian()).clamp(0.0, 1.0);
            }

            let score: f64 = (0..DIMS)
                .map(|d| {
                    let l = Self::log_density(good, d, candidate[d]);
                    // Uniform prior when nothing is known to be bad.
                    let g = if bad.is_empty() {
                        0.0
                    } else {
                        Self::log_density(bad, d, candidate[d])
                    };
                    l - g
                })
                .sum();

            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        best
    }
}

impl SearchStrategy for TpeSearch {
    fn propose(&mut self) -> ParameterVector {
        if self.observations.len() < self.settings.startup_trials {
            let unit = sample_unit(&mut self.rng);
            return self.space.from_unit(unit);
        }
        let unit = match self.split() {
            Some((good, bad)) => self.model_proposal(&good, &bad),
            None => sample_unit(&mut self.rng),
        };
        self.space.from_unit(unit)
    }

    fn update(&mut self, params: &ParameterVector, fitness: Fitness) {
        self.observations.push((self.space.to_unit(params), fitness));
    }

    fn name(&self) -> &str {
        "tpe"
    }
}

/// Build the strategy a study was configured with.
pub fn build_strategy(
    kind: StrategyKind,
    space: SearchSpace,
    settings: TpeSettings,
    seed: Option<u64>,
) -> Box<dyn SearchStrategy> {
    match kind {
        StrategyKind::Random => Box::new(RandomSearch::with_seed(space, seed)),
        StrategyKind::Tpe => Box::new(TpeSearch::with_seed(space, settings, seed)),
    }
}
