//! Pulling the fitness value out of the program's output.
//!
//! The program prints its final fitness on the last non-empty line; anything
//! before that is diagnostics and is ignored.

use regex::Regex;
use std::sync::LazyLock;

use st_types::{EvalError, Fitness};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?").unwrap());

/// Parse the fitness from raw output, describing why when there is none.
pub fn parse_fitness(raw: &str) -> Result<Fitness, EvalError> {
    let last_line = raw
        .lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
        .ok_or_else(|| EvalError::Parse {
            message: "no output to parse".to_string(),
        })?;

    let token = NUMBER_RE
        .find(last_line)
        .ok_or_else(|| EvalError::Parse {
            message: format!("no numeric value found in last line: {last_line}"),
        })?
        .as_str();

    let value: f64 = token.parse().map_err(|_| EvalError::Parse {
        message: format!("failed to convert extracted token to float: {token}"),
    })?;

    Ok(Fitness::new(value))
}

/// Total version of [`parse_fitness`]: every failure is the sentinel.
pub fn extract_fitness(raw: &str) -> Fitness {
    parse_fitness(raw).unwrap_or(Fitness::SENTINEL)
}
