//! Fault injection for the local cloud.
//!
//! `STACKFORM_FAIL=vpc,web` makes every mutation of those resources fail
//! permanently. `STACKFORM_FLAKY=vpc:2` makes the first two mutations of
//! `vpc` fail with a transient error, after which they succeed.

use declarative::ProviderError;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

/// Environment variable listing permanently failing resources
pub const FAIL_ENV: &str = "STACKFORM_FAIL";
/// Environment variable listing flaky resources and their failure counts
pub const FLAKY_ENV: &str = "STACKFORM_FLAKY";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FaultError {
    #[error("invalid flaky entry '{0}' (expected <resource>:<count>)")]
    InvalidFlaky(String),
}

/// Which resources fail, and how
#[derive(Debug, Default)]
pub struct FaultPlan {
    failing: HashSet<String>,
    flaky: Mutex<HashMap<String, u32>>,
}

impl FaultPlan {
    /// No faults
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse comma-separated lists in the environment variable formats.
    pub fn parse(fail: &str, flaky: &str) -> Result<Self, FaultError> {
        let failing = entries(fail).map(str::to_string).collect();
        let flaky = entries(flaky)
            .map(|entry| {
                let (id, count) = entry
                    .rsplit_once(':')
                    .ok_or_else(|| FaultError::InvalidFlaky(entry.to_string()))?;
                let count = count
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| FaultError::InvalidFlaky(entry.to_string()))?;
                Ok((id.trim().to_string(), count))
            })
            .collect::<Result<HashMap<_, _>, FaultError>>()?;
        Ok(Self {
            failing,
            flaky: Mutex::new(flaky),
        })
    }

    /// Read `STACKFORM_FAIL` and `STACKFORM_FLAKY`.
    pub fn from_env() -> Result<Self, FaultError> {
        let fail = std::env::var(FAIL_ENV).unwrap_or_default();
        let flaky = std::env::var(FLAKY_ENV).unwrap_or_default();
        let plan = Self::parse(&fail, &flaky)?;
        if !plan.is_empty() {
            log::debug!("Fault injection active: {plan:?}");
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.failing.is_empty() && self.pending_flaky() == 0
    }

    fn pending_flaky(&self) -> u64 {
        let total =
            |flaky: &HashMap<String, u32>| -> u64 { flaky.values().copied().map(u64::from).sum() };
        match self.flaky.lock() {
            Ok(flaky) => total(&flaky),
            Err(poisoned) => total(&poisoned.into_inner()),
        }
    }

    /// Fail a mutation of `id` if a fault is configured for it.
    pub fn check(&self, id: &str, verb: &str) -> Result<(), ProviderError> {
        if self.failing.contains(id) {
            return Err(ProviderError::Other(format!(
                "{verb} {id} failed (injected fault)"
            )));
        }
        let mut flaky = match self.flaky.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(left) = flaky.get_mut(id)
            && *left > 0
        {
            *left -= 1;
            return Err(ProviderError::Transient {
                message: format!("{verb} {id} timed out (injected, {left} left)"),
            });
        }
        Ok(())
    }
}

fn entries(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lists() {
        let plan = FaultPlan::parse("vpc, web ,", "public-1:2").unwrap();
        assert!(plan.check("vpc", "create").is_err());
        assert!(plan.check("web", "create").is_err());
        assert!(plan.check("role", "create").is_ok());
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_flaky_recovers_after_count() {
        let plan = FaultPlan::parse("", "public-1:2").unwrap();
        for _ in 0..2 {
            let err = plan.check("public-1", "create").unwrap_err();
            assert!(err.is_retryable());
        }
        assert!(plan.check("public-1", "create").is_ok());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_permanent_failure_not_retryable() {
        let plan = FaultPlan::parse("vpc", "").unwrap();
        let err = plan.check("vpc", "create").unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("injected"));
    }

    #[test]
    fn test_invalid_flaky_entry() {
        assert_eq!(
            FaultPlan::parse("", "vpc").unwrap_err(),
            FaultError::InvalidFlaky("vpc".to_string())
        );
        assert!(FaultPlan::parse("", "vpc:many").is_err());
    }

    #[test]
    fn test_large_flaky_counts_do_not_overflow() {
        let max = u32::MAX;
        let plan = FaultPlan::parse("", &format!("vpc:{max},web:{max}")).unwrap();
        assert!(!plan.is_empty());
        assert_eq!(plan.pending_flaky(), 2 * u64::from(max));
    }

    #[test]
    fn test_empty_plan() {
        assert!(FaultPlan::parse("", " , ").unwrap().is_empty());
        assert!(FaultPlan::none().check("anything", "delete").is_ok());
    }
}
