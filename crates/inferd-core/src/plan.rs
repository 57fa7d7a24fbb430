//! Budget planner
//!
//! Computes the validated GPU memory plan for one orchestration run. Planning
//! is a pure function over the manifest: it never touches processes or the
//! GPU, so an overcommitted manifest is rejected before anything launches.

use crate::{Error, Result, ServiceSpec};
use serde::Serialize;
use std::collections::BTreeMap;

/// The validated, resolved mapping from service name to GPU memory fraction.
/// Immutable: a rebalance produces a new plan.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetPlan {
    fractions: BTreeMap<String, f64>,
    safety_margin: f64,
    headroom: f64,
}

/// Validate the declared fractions against the whole-GPU budget.
///
/// Fails with [`Error::Overcommit`] when `sum(fractions) + safety_margin`
/// exceeds 1.0. The returned plan carries the input fractions unmodified; the
/// planner never rounds or clamps an operator-declared budget.
pub fn plan(specs: &[ServiceSpec], safety_margin: f64) -> Result<BudgetPlan> {
    if specs.is_empty() {
        return Err(Error::Manifest(
            "Cannot plan a budget for zero services".to_string(),
        ));
    }

    let mut fractions = BTreeMap::new();
    let mut declared = 0.0f64;

    for spec in specs {
        if !(spec.memory_fraction > 0.0 && spec.memory_fraction <= 1.0) {
            return Err(Error::InvalidFraction {
                service: spec.name.clone(),
                fraction: spec.memory_fraction,
            });
        }
        if fractions
            .insert(spec.name.clone(), spec.memory_fraction)
            .is_some()
        {
            return Err(Error::Manifest(format!(
                "Duplicate service name: {}",
                spec.name
            )));
        }
        declared += spec.memory_fraction;
    }

    let allowed = 1.0 - safety_margin;
    if declared + safety_margin > 1.0 {
        return Err(Error::Overcommit {
            declared,
            headroom: allowed,
        });
    }

    Ok(BudgetPlan {
        fractions,
        safety_margin,
        headroom: allowed - declared,
    })
}

impl BudgetPlan {
    /// The fraction resolved for one service
    pub fn fraction_of(&self, name: &str) -> Option<f64> {
        self.fractions.get(name).copied()
    }

    /// All resolved fractions, keyed by service name
    pub fn fractions(&self) -> &BTreeMap<String, f64> {
        &self.fractions
    }

    /// The safety margin this plan was computed with
    pub fn safety_margin(&self) -> f64 {
        self.safety_margin
    }

    /// Budget left over after all fractions and the margin
    pub fn headroom(&self) -> f64 {
        self.headroom
    }

    /// The service holding the largest fraction; first candidate for a
    /// reduction when memory pressure is high
    pub fn largest(&self) -> Option<(&str, f64)> {
        self.fractions
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, fraction)| (name.as_str(), *fraction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use url::Url;

    fn spec(name: &str, fraction: f64) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            command: "sleep".to_string(),
            args: vec!["30".to_string()],
            env: HashMap::new(),
            working_dir: None,
            port: 8000,
            readiness_url: Url::parse("http://127.0.0.1:8000/health").unwrap(),
            memory_fraction: fraction,
            min_fraction: 0.0,
            max_fraction: 1.0,
            start_order: 0,
            depends_on: None,
        }
    }

    #[test]
    fn test_plan_accepts_fitting_budget() {
        let specs = vec![spec("a", 0.4), spec("b", 0.4)];
        let budget = plan(&specs, 0.1).unwrap();

        assert_eq!(budget.fraction_of("a"), Some(0.4));
        assert_eq!(budget.fraction_of("b"), Some(0.4));
        assert!((budget.headroom() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_plan_rejects_overcommit() {
        // sum 1.0 + margin 0.05 > 1.0
        let specs = vec![spec("a", 0.5), spec("b", 0.5)];
        let err = plan(&specs, 0.05).unwrap_err();

        match err {
            Error::Overcommit { declared, headroom } => {
                assert!((declared - 1.0).abs() < 1e-9);
                assert!((headroom - 0.95).abs() < 1e-9);
            }
            other => panic!("expected Overcommit, got {}", other),
        }
    }

    #[test]
    fn test_plan_boundary_exact_fit() {
        // sum + margin == 1.0 exactly is allowed
        let specs = vec![spec("a", 0.5), spec("b", 0.25)];
        let budget = plan(&specs, 0.25).unwrap();
        assert!(budget.headroom().abs() < 1e-9);
    }

    #[test]
    fn test_plan_rejects_empty_set() {
        assert!(matches!(plan(&[], 0.05), Err(Error::Manifest(_))));
    }

    #[test]
    fn test_plan_rejects_invalid_fraction() {
        let specs = vec![spec("a", 0.0)];
        assert!(matches!(
            plan(&specs, 0.05),
            Err(Error::InvalidFraction { .. })
        ));

        let specs = vec![spec("a", 1.01)];
        assert!(matches!(
            plan(&specs, 0.05),
            Err(Error::InvalidFraction { .. })
        ));
    }

    #[test]
    fn test_plan_fractions_are_exactly_the_input() {
        // No rounding games: the same bit pattern comes back out.
        let fraction = 0.30000000000000004f64;
        let specs = vec![spec("a", fraction)];
        let budget = plan(&specs, 0.05).unwrap();
        assert_eq!(budget.fraction_of("a").unwrap().to_bits(), fraction.to_bits());
    }

    #[test]
    fn test_plan_rejects_duplicate_names() {
        let specs = vec![spec("a", 0.2), spec("a", 0.2)];
        let err = plan(&specs, 0.05).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_largest() {
        let specs = vec![spec("small", 0.1), spec("big", 0.6)];
        let budget = plan(&specs, 0.05).unwrap();
        assert_eq!(budget.largest(), Some(("big", 0.6)));
    }
}
