//! Integer and float comparison.

use super::{split_list, unsupported};
use crate::error::{FaultlineError, Result};
use std::fmt::{Debug, Display};
use std::str::FromStr;

/// Operators available to `int` and `float` comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOperator {
    GreaterOrEqual,
    LessOrEqual,
    Greater,
    Less,
    Equal,
    NotEqual,
    OneOf,
    Between,
}

impl NumericOperator {
    /// Parse an operator name, reporting unknown ones against `probe`.
    pub fn parse(probe: &str, raw: &str) -> Result<Self> {
        match raw.trim() {
            ">=" => Ok(Self::GreaterOrEqual),
            "<=" => Ok(Self::LessOrEqual),
            ">" => Ok(Self::Greater),
            "<" => Ok(Self::Less),
            "==" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "oneOf" | "OneOf" => Ok(Self::OneOf),
            "between" | "Between" => Ok(Self::Between),
            other => Err(unsupported(probe, other)),
        }
    }
}

/// A number the comparator can parse out of probe output.
pub(crate) trait Numeric: Copy + PartialOrd + Display + Debug + FromStr {
    const NAME: &'static str;
}

impl Numeric for i64 {
    const NAME: &'static str = "integer";
}

impl Numeric for f64 {
    const NAME: &'static str = "float";
}

fn parse_value<T: Numeric>(probe: &str, role: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        FaultlineError::evaluation(
            probe,
            format!("{} value '{}' is not a valid {}", role, raw.trim(), T::NAME),
        )
    })
}

fn parse_list<T: Numeric>(probe: &str, expected: &str) -> Result<Vec<T>> {
    split_list(expected)
        .into_iter()
        .map(|item| parse_value::<T>(probe, "Expected", item))
        .collect()
}

pub(crate) fn compare<T: Numeric>(
    probe: &str,
    actual: &str,
    expected: &str,
    op: NumericOperator,
) -> Result<()> {
    let a = parse_value::<T>(probe, "Actual", actual)?;

    let mismatch = |reason: String| {
        Err(FaultlineError::probe_failed(
            probe,
            format!("Probe responded with an invalid output. {}", reason),
        ))
    };

    match op {
        NumericOperator::OneOf => {
            let list = parse_list::<T>(probe, expected)?;
            if list.iter().any(|v| *v == a) {
                Ok(())
            } else {
                mismatch(format!(
                    "Actual value: {} doesn't matched any of the Expected values: {:?}",
                    a, list
                ))
            }
        }
        NumericOperator::Between => {
            let list = parse_list::<T>(probe, expected)?;
            if list.len() != 2 {
                return Err(FaultlineError::evaluation(
                    probe,
                    format!(
                        "Expected value: {:?} should contains both lower and upper limits",
                        list
                    ),
                ));
            }
            let (lower, upper) = (list[0], list[1]);
            if lower > upper {
                return Err(FaultlineError::evaluation(
                    probe,
                    format!(
                        "Expected range: {:?} has a lower limit greater than its upper limit",
                        list
                    ),
                ));
            }
            if a >= lower && a <= upper {
                Ok(())
            } else {
                mismatch(format!(
                    "Actual value: {} doesn't lie in between the Expected range: {:?}",
                    a, list
                ))
            }
        }
        scalar => {
            let b = parse_value::<T>(probe, "Expected", expected)?;
            let (ok, phrase) = scalar_outcome(scalar, a, b);
            if ok {
                Ok(())
            } else {
                mismatch(format!(
                    "Actual value: {} {} the Expected value: {}",
                    a, phrase, b
                ))
            }
        }
    }
}

fn scalar_outcome<T: Numeric>(op: NumericOperator, a: T, b: T) -> (bool, &'static str) {
    match op {
        NumericOperator::GreaterOrEqual => (a >= b, "is not greater than or equal to"),
        NumericOperator::LessOrEqual => (a <= b, "is not lesser than or equal to"),
        NumericOperator::Greater => (a > b, "is not greater than"),
        NumericOperator::Less => (a < b, "is not lesser than"),
        NumericOperator::NotEqual => (a != b, "should not matched with"),
        NumericOperator::Equal | NumericOperator::OneOf | NumericOperator::Between => {
            (a == b, "is not equal to")
        }
    }
}
