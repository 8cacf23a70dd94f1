//! String comparison.

use super::{split_list, unsupported};
use crate::error::{FaultlineError, Result};
use regex::Regex;

/// Operators available to the `string` comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOperator {
    Equal,
    NotEqual,
    Contains,
    Matches,
    NotMatches,
    OneOf,
}

impl StringOperator {
    pub fn parse(probe: &str, raw: &str) -> Result<Self> {
        match raw.trim() {
            "equal" | "Equal" => Ok(Self::Equal),
            "notEqual" | "NotEqual" => Ok(Self::NotEqual),
            "contains" | "Contains" => Ok(Self::Contains),
            "matches" | "Matches" => Ok(Self::Matches),
            "notMatches" | "NotMatches" => Ok(Self::NotMatches),
            "oneOf" | "OneOf" => Ok(Self::OneOf),
            other => Err(unsupported(probe, other)),
        }
    }
}

fn compile(probe: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|_| {
        FaultlineError::evaluation(
            probe,
            format!("The probe regex '{}' is not a valid expression", pattern),
        )
    })
}

pub(crate) fn compare(probe: &str, actual: &str, expected: &str, op: StringOperator) -> Result<()> {
    let (ok, reason) = match op {
        StringOperator::Equal => (
            actual == expected,
            format!("Actual value: {} is not equal to the Expected value: {}", actual, expected),
        ),
        StringOperator::NotEqual => (
            actual != expected,
            format!(
                "Actual value: {} should not matched with the Expected value: {}",
                actual, expected
            ),
        ),
        StringOperator::Contains => (
            actual.contains(expected),
            format!("Actual value: {} doesn't contain Expected value: {}", actual, expected),
        ),
        StringOperator::Matches => (
            compile(probe, expected)?.is_match(actual),
            format!(
                "Actual value: {} is not matched with the Expected regex: {}",
                actual, expected
            ),
        ),
        StringOperator::NotMatches => (
            !compile(probe, expected)?.is_match(actual),
            format!(
                "Actual value: {} should not matched with Expected regex: {}",
                actual, expected
            ),
        ),
        StringOperator::OneOf => {
            let list = split_list(expected);
            (
                list.iter().any(|v| *v == actual),
                format!(
                    "Actual value: {} doesn't matched any of the Expected values: {:?}",
                    actual, list
                ),
            )
        }
    };

    if ok {
        Ok(())
    } else {
        Err(FaultlineError::probe_failed(
            probe,
            format!("Probe responded with an invalid output. {}", reason),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{Comparator, ComparatorKind};

    fn check(actual: &str, expected: &str, op: &str) -> Result<()> {
        Comparator::new("string-probe").evaluate(actual, expected, op, ComparatorKind::String)
    }

    #[test]
    fn test_one_of() {
        assert!(check("b", "a,b,c", "oneOf").is_ok());
        assert!(check("d", "a,b,c", "oneOf").is_err());
        assert!(check("b", "a, b", "OneOf").is_ok());
    }

    #[test]
    fn test_equality() {
        assert!(check("Running", "Running", "equal").is_ok());
        assert!(check("Pending", "Running", "Equal").is_err());
        assert!(check("Pending", "Running", "notEqual").is_ok());
        assert!(check("a,b", "a,b", "equal").is_ok());
    }

    #[test]
    fn test_contains() {
        assert!(check("pod nginx-1 Running", "Running", "contains").is_ok());
        assert!(check("pod nginx-1 Pending", "Running", "contains").is_err());
    }

    #[test]
    fn test_regex_operators() {
        assert!(check("nginx-7f9c", "^nginx-[0-9a-f]+$", "matches").is_ok());
        assert!(check("redis-1", "^nginx", "matches").is_err());
        assert!(check("redis-1", "^nginx", "notMatches").is_ok());
        assert!(check("nginx-1", "^nginx", "NotMatches").is_err());
    }

    #[test]
    fn test_invalid_regex_is_evaluation_error() {
        let err = check("anything", "([unclosed", "matches").unwrap_err();
        assert!(err.is_evaluation());
        assert!(check("anything", "([unclosed", "notMatches")
            .unwrap_err()
            .is_evaluation());
    }

    #[test]
    fn test_numeric_operator_rejected() {
        assert!(check("1", "1", "==").unwrap_err().is_evaluation());
    }
}
