//! The five-dimensional PSO hyperparameter space.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of tuned parameters.
pub const DIMS: usize = 5;

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
}

impl ParameterKind {
    pub fn low(&self) -> f64 {
        match self {
            Self::FloatRange { low, .. } => *low,
            Self::IntRange { low, .. } => *low as f64,
        }
    }

    pub fn high(&self) -> f64 {
        match self {
            Self::FloatRange { high, .. } => *high,
            Self::IntRange { high, .. } => *high as f64,
        }
    }

    /// Clamp into range, rounding integer dimensions.
    pub fn clamp(&self, value: f64) -> f64 {
        match self {
            Self::FloatRange { low, high } => value.clamp(*low, *high),
            Self::IntRange { low, high } => value.round().clamp(*low as f64, *high as f64),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        match self {
            Self::FloatRange { low, high } => value >= *low && value <= *high,
            Self::IntRange { low, high } => {
                value.fract() == 0.0 && value >= *low as f64 && value <= *high as f64
            }
        }
    }
}

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterDef {
    /// Name as it appears in result files (e.g. "swarmSize").
    pub name: &'static str,
    pub kind: ParameterKind,
}

/// Fixed bounds of the search, in the external program's argument order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSpace {
    pub parameters: [ParameterDef; DIMS],
}

impl SearchSpace {
    /// swarmSize ∈ [10,100], maxIters ∈ [50,1000], inertia ∈ [0.1,1.0],
    /// c1 and c2 ∈ [0.1,3.0].
    pub const fn swarm() -> Self {
        Self {
            parameters: [
                ParameterDef {
                    name: "swarmSize",
                    kind: ParameterKind::IntRange { low: 10, high: 100 },
                },
                ParameterDef {
                    name: "maxIters",
                    kind: ParameterKind::IntRange { low: 50, high: 1000 },
                },
                ParameterDef {
                    name: "inertia",
                    kind: ParameterKind::FloatRange { low: 0.1, high: 1.0 },
                },
                ParameterDef {
                    name: "c1",
                    kind: ParameterKind::FloatRange { low: 0.1, high: 3.0 },
                },
                ParameterDef {
                    name: "c2",
                    kind: ParameterKind::FloatRange { low: 0.1, high: 3.0 },
                },
            ],
        }
    }

    /// Build a vector from raw coordinates, clamping and rounding as needed.
    pub fn decode(&self, raw: [f64; DIMS]) -> ParameterVector {
        let mut values = [0.0; DIMS];
        for (i, param) in self.parameters.iter().enumerate() {
            values[i] = param.kind.clamp(raw[i]);
        }
        ParameterVector::from_values(values)
    }

    /// Map a vector into the unit hypercube.
    pub fn to_unit(&self, params: &ParameterVector) -> [f64; DIMS] {
        let values = params.values();
        let mut unit = [0.0; DIMS];
        for (i, param) in self.parameters.iter().enumerate() {
            let (low, high) = (param.kind.low(), param.kind.high());
            unit[i] = ((values[i] - low) / (high - low)).clamp(0.0, 1.0);
        }
        unit
    }

    /// Inverse of [`SearchSpace::to_unit`].
    pub fn from_unit(&self, unit: [f64; DIMS]) -> ParameterVector {
        let mut raw = [0.0; DIMS];
        for (i, param) in self.parameters.iter().enumerate() {
            let (low, high) = (param.kind.low(), param.kind.high());
            let u = unit[i].clamp(0.0, 1.0);
            raw[i] = low * (1.0 - u) + high * u;
        }
        self.decode(raw)
    }

    pub fn contains(&self, params: &ParameterVector) -> bool {
        let values = params.values();
        self.parameters
            .iter()
            .zip(values)
            .all(|(param, value)| param.kind.contains(value))
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::swarm()
    }
}

/// One concrete PSO configuration, produced fresh for every trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterVector {
    pub swarm_size: i64,
    pub max_iters: i64,
    pub inertia: f64,
    pub c1: f64,
    pub c2: f64,
}

impl ParameterVector {
    pub fn new(swarm_size: i64, max_iters: i64, inertia: f64, c1: f64, c2: f64) -> Self {
        Self {
            swarm_size,
            max_iters,
            inertia,
            c1,
            c2,
        }
    }

    /// Integer dimensions are rounded to the nearest whole number.
    pub fn from_values(values: [f64; DIMS]) -> Self {
        Self {
            swarm_size: values[0].round() as i64,
            max_iters: values[1].round() as i64,
            inertia: values[2],
            c1: values[3],
            c2: values[4],
        }
    }

    pub fn values(&self) -> [f64; DIMS] {
        [
            self.swarm_size as f64,
            self.max_iters as f64,
            self.inertia,
            self.c1,
            self.c2,
        ]
    }

    /// Positional arguments for the external program:
    /// `swarmSize maxIters inertia c1 c2`.
    pub fn to_args(&self) -> [String; DIMS] {
        [
            self.swarm_size.to_string(),
            self.max_iters.to_string(),
            self.inertia.to_string(),
            self.c1.to_string(),
            self.c2.to_string(),
        ]
    }
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{swarmSize: {}, maxIters: {}, inertia: {}, c1: {}, c2: {}}}",
            self.swarm_size, self.max_iters, self.inertia, self.c1, self.c2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_calling_convention() {
        let params = ParameterVector::new(30, 500, 0.7, 1.5, 2.25);
        assert_eq!(params.to_args(), ["30", "500", "0.7", "1.5", "2.25"]);
    }

    #[test]
    fn serializes_with_external_names() {
        let params = ParameterVector::new(10, 50, 0.1, 0.1, 3.0);
        let json = serde_json::to_value(params).unwrap();
        assert_eq!(json["swarmSize"], 10);
        assert_eq!(json["maxIters"], 50);
        assert_eq!(json["inertia"], 0.1);
        assert_eq!(json["c2"], 3.0);
    }

    #[test]
    fn decode_clamps_and_rounds() {
        let space = SearchSpace::swarm();
        let params = space.decode([7.4, 1234.0, 0.55, -1.0, 2.5]);
        assert_eq!(params.swarm_size, 10);
        assert_eq!(params.max_iters, 1000);
        assert_eq!(params.inertia, 0.55);
        assert_eq!(params.c1, 0.1);
        assert!(space.contains(&params));

        let params = space.decode([42.6, 50.2, 1.0, 3.0, 0.1]);
        assert_eq!(params.swarm_size, 43);
        assert_eq!(params.max_iters, 50);
    }

    #[test]
    fn unit_mapping_round_trips_the_corners() {
        let space = SearchSpace::swarm();
        let low = space.from_unit([0.0; DIMS]);
        assert_eq!(low, ParameterVector::new(10, 50, 0.1, 0.1, 0.1));
        let high = space.from_unit([1.0; DIMS]);
        assert_eq!(high, ParameterVector::new(100, 1000, 1.0, 3.0, 3.0));
        assert_eq!(space.to_unit(&high), [1.0; DIMS]);
    }

    #[test]
    fn contains_rejects_out_of_range_values() {
        let space = SearchSpace::swarm();
        assert!(!space.contains(&ParameterVector::new(5, 100, 0.5, 1.0, 1.0)));
        assert!(!space.contains(&ParameterVector::new(50, 100, 0.5, 1.0, 3.5)));
        assert!(space.contains(&ParameterVector::new(50, 100, 0.5, 1.0, 1.0)));
    }
}
