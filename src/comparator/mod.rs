//! Typed comparison of probe output against an expected value.
//!
//! Every probe kind reduces its observation to a string and hands it to a
//! [`Comparator`] together with a [`ComparatorSpec`]. The `kind` field picks
//! integer, float or string semantics; the `criteria` names the operator.
//!
//! # Example
//!
//! ```rust
//! use faultline::comparator::{Comparator, ComparatorKind};
//!
//! let cmp = Comparator::new("replicas");
//! assert!(cmp.evaluate("7", "5,10", "between", ComparatorKind::Int).is_ok());
//! assert!(cmp.evaluate("11", "5,10", "between", ComparatorKind::Int).is_err());
//! assert!(cmp.evaluate("b", "a,b,c", "oneOf", ComparatorKind::String).is_ok());
//! ```

mod numeric;
mod string;

pub use numeric::NumericOperator;
pub use string::StringOperator;

use crate::error::{FaultlineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Value semantics used for a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparatorKind {
    Int,
    Float,
    String,
}

impl fmt::Display for ComparatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComparatorKind::Int => "int",
            ComparatorKind::Float => "float",
            ComparatorKind::String => "string",
        };
        f.write_str(name)
    }
}

impl FromStr for ComparatorKind {
    type Err = FaultlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int" => Ok(ComparatorKind::Int),
            "float" => Ok(ComparatorKind::Float),
            "string" => Ok(ComparatorKind::String),
            other => Err(FaultlineError::InvalidArgument(format!(
                "comparator type '{}' not supported",
                other
            ))),
        }
    }
}

/// Declarative comparison attached to a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorSpec {
    /// Value semantics.
    #[serde(rename = "type")]
    pub kind: ComparatorKind,
    /// Operator name, e.g. `>=`, `between`, `contains`.
    pub criteria: String,
    /// Expected value: a scalar, a comma list for `oneOf`, or `lower,upper`.
    pub value: String,
}

impl ComparatorSpec {
    pub fn new(kind: ComparatorKind, criteria: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            criteria: criteria.into(),
            value: value.into(),
        }
    }

    /// Check that the operator exists for this kind without evaluating.
    pub fn validate(&self, probe: &str) -> Result<()> {
        match self.kind {
            ComparatorKind::Int | ComparatorKind::Float => {
                NumericOperator::parse(probe, &self.criteria).map(|_| ())
            }
            ComparatorKind::String => StringOperator::parse(probe, &self.criteria).map(|_| ()),
        }
    }
}

/// Evaluates actual values on behalf of a named probe.
#[derive(Debug, Clone)]
pub struct Comparator {
    probe: String,
}

impl Comparator {
    pub fn new(probe: impl Into<String>) -> Self {
        Self {
            probe: probe.into(),
        }
    }

    pub fn probe(&self) -> &str {
        &self.probe
    }

    /// Compare `actual` with `expected` under `operator`. `Ok(())` means match.
    ///
    /// Mismatches are [`FaultlineError::ProbeFailed`]; malformed operands and
    /// unknown operators are [`FaultlineError::Evaluation`].
    pub fn evaluate(
        &self,
        actual: &str,
        expected: &str,
        operator: &str,
        kind: ComparatorKind,
    ) -> Result<()> {
        debug!(
            probe = %self.probe,
            actual = %actual,
            expected = %expected,
            operator = %operator,
            kind = %kind,
            "Evaluating probe output"
        );

        match kind {
            ComparatorKind::Int => {
                let op = NumericOperator::parse(&self.probe, operator)?;
                numeric::compare::<i64>(&self.probe, actual, expected, op)
            }
            ComparatorKind::Float => {
                let op = NumericOperator::parse(&self.probe, operator)?;
                numeric::compare::<f64>(&self.probe, actual, expected, op)
            }
            ComparatorKind::String => {
                let op = StringOperator::parse(&self.probe, operator)?;
                string::compare(&self.probe, actual, expected, op)
            }
        }
    }

    /// Evaluate against a full [`ComparatorSpec`].
    pub fn evaluate_spec(&self, actual: &str, spec: &ComparatorSpec) -> Result<()> {
        self.evaluate(actual, &spec.value, &spec.criteria, spec.kind)
    }
}

pub(crate) fn unsupported(probe: &str, operator: &str) -> FaultlineError {
    FaultlineError::evaluation(
        probe,
        format!("criteria '{}' not supported in the probe", operator),
    )
}

/// Split a comma list, trimming each entry.
pub(crate) fn split_list(expected: &str) -> Vec<&str> {
    expected.trim().split(',').map(str::trim).collect()
}
