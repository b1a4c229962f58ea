//! Levenberg-Marquardt refinement on top of the `levenberg_marquardt` crate.
//!
//! Problems expose residuals and an analytic Jacobian through [`NllsProblem`];
//! [`levenberg_marquardt`] adapts them to the crate's `LeastSquaresProblem`
//! and folds its `MinimizationReport` into a [`SolveReport`].

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::{debug, warn};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Non-linear least-squares problem with dense parameter and residual vectors.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Residuals and Jacobian in one pass; override when they share work.
    fn residuals_and_jacobian(&self, x: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
        (self.residuals(x), self.jacobian(x))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Evaluation budget: the run stops after `patience * (params + 1)`
    /// residual evaluations.
    pub patience: usize,
    /// Relative tolerance on the cost decrease.
    pub ftol: f64,
    /// Relative tolerance on the step size.
    pub xtol: f64,
    /// Tolerance on the cosine between the residuals and the Jacobian columns.
    pub gtol: f64,
    /// Initial trust-region bound, as a factor of the scaled parameter norm.
    pub stepbound: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            patience: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            stepbound: 100.0,
        }
    }
}

/// Why the iteration stopped. The estimate is returned in every case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Residuals are exactly zero.
    ResidualsZero,
    CostConverged,
    StepConverged,
    /// Residuals are orthogonal to the Jacobian columns.
    GradientConverged,
    /// A tolerance is below machine precision; no further progress is possible.
    NoImprovement,
    /// The evaluation budget ran out.
    MaxEvaluations,
    /// Residuals or Jacobian are not finite.
    NonFinite,
    /// Nothing to optimise: no free parameters or no residuals.
    Empty,
}

impl Termination {
    /// Stopped at a (local) minimum rather than on a budget or a failure.
    pub fn converged(self) -> bool {
        matches!(
            self,
            Self::ResidualsZero | Self::CostConverged | Self::StepConverged | Self::GradientConverged
        )
    }
}

impl From<&TerminationReason> for Termination {
    fn from(reason: &TerminationReason) -> Self {
        match reason {
            TerminationReason::ResidualsZero => Self::ResidualsZero,
            TerminationReason::Converged { ftol: true, .. } => Self::CostConverged,
            TerminationReason::Converged { .. } => Self::StepConverged,
            TerminationReason::Orthogonal => Self::GradientConverged,
            TerminationReason::NoImprovementPossible(_) => Self::NoImprovement,
            TerminationReason::LostPatience => Self::MaxEvaluations,
            TerminationReason::Numerical(_) | TerminationReason::User(_) => Self::NonFinite,
            _ => Self::Empty,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Residual evaluations spent.
    pub evaluations: usize,
    /// Sum of squared residuals at the starting point.
    pub initial_cost: f64,
    /// Sum of squared residuals at the returned point.
    pub final_cost: f64,
    pub termination: Termination,
}

struct LmAdapter<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmAdapter<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.problem.jacobian(&self.params))
    }
}

/// Minimise `‖r(x)‖²` from `x0`.
///
/// Only cost-reducing steps are accepted, so `final_cost <= initial_cost`.
/// A starting point with non-finite residuals is returned untouched with
/// [`Termination::NonFinite`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(problem, x0, opts), fields(params = x0.len(), residuals = problem.num_residuals()))
)]
pub fn levenberg_marquardt<P: NllsProblem>(
    problem: &P,
    x0: DVector<f64>,
    opts: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let initial_cost = problem.residuals(&x0).norm_squared();
    let report = |evaluations, final_cost, termination| SolveReport {
        evaluations,
        initial_cost,
        final_cost,
        termination,
    };

    if !initial_cost.is_finite() {
        warn!("lm: residuals at the starting point are not finite");
        return (x0, report(1, initial_cost, Termination::NonFinite));
    }
    if x0.is_empty() || problem.num_residuals() == 0 {
        return (x0, report(1, initial_cost, Termination::Empty));
    }

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_stepbound(opts.stepbound)
        .with_patience(opts.patience.max(1));
    let start = x0.clone();
    let (adapter, minimization) = lm.minimize(LmAdapter { problem, params: x0 });

    let termination = Termination::from(&minimization.termination);
    let evaluations = minimization.number_of_evaluations;
    // `objective_function` is half the squared norm.
    let final_cost = 2.0 * minimization.objective_function;
    debug!(
        "lm: {termination:?} ({:?}) after {evaluations} evaluations, cost {initial_cost:.6e} -> {final_cost:.6e}",
        minimization.termination
    );
    if !final_cost.is_finite() || final_cost > initial_cost {
        // A numerical failure can leave the adapter on a rejected trial point.
        return (start, report(evaluations, initial_cost, termination));
    }
    (adapter.params, report(evaluations, final_cost, termination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Fit `y = a * exp(b * t)`.
    struct ExpFit {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl NllsProblem for ExpFit {
        fn num_params(&self) -> usize {
            2
        }

        fn num_residuals(&self) -> usize {
            self.t.len()
        }

        fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.t.len(),
                self.t.iter().zip(&self.y).map(|(t, y)| x[0] * (x[1] * t).exp() - y),
            )
        }

        fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            let mut j = DMatrix::zeros(self.t.len(), 2);
            for (i, t) in self.t.iter().enumerate() {
                let e = (x[1] * t).exp();
                j[(i, 0)] = e;
                j[(i, 1)] = x[0] * t * e;
            }
            j
        }
    }

    fn exp_fit() -> ExpFit {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|t| 2.5 * (-1.3 * t).exp()).collect();
        ExpFit { t, y }
    }

    #[test]
    fn fits_exponential() {
        let problem = exp_fit();
        let (x, report) =
            levenberg_marquardt(&problem, DVector::from_vec(vec![1.0, 0.0]), &SolveOptions::default());
        assert_relative_eq!(x[0], 2.5, epsilon = 1e-6);
        assert_relative_eq!(x[1], -1.3, epsilon = 1e-6);
        assert!(report.final_cost < 1e-12);
        assert!(report.termination.converged(), "{:?}", report.termination);
        assert!(report.evaluations > 0);
    }

    #[test]
    fn exhausted_budget_is_not_an_error() {
        let problem = exp_fit();
        let opts = SolveOptions {
            patience: 1,
            ..SolveOptions::default()
        };
        let (_, report) = levenberg_marquardt(&problem, DVector::from_vec(vec![1.0, 0.0]), &opts);
        assert_eq!(report.termination, Termination::MaxEvaluations);
        assert!(!report.termination.converged());
        assert!(report.final_cost <= report.initial_cost);
    }

    #[test]
    fn starting_at_optimum_stops_immediately() {
        let problem = exp_fit();
        let (x, report) = levenberg_marquardt(
            &problem,
            DVector::from_vec(vec![2.5, -1.3]),
            &SolveOptions::default(),
        );
        assert!(report.termination.converged(), "{:?}", report.termination);
        assert_eq!(report.final_cost, 0.0);
        assert_eq!(x, DVector::from_vec(vec![2.5, -1.3]));
    }

    #[test]
    fn non_finite_start_is_reported_as_such() {
        let problem = exp_fit();
        let x0 = DVector::from_vec(vec![f64::NAN, 0.0]);
        let (x, report) = levenberg_marquardt(&problem, x0, &SolveOptions::default());
        assert_eq!(report.termination, Termination::NonFinite);
        assert_ne!(report.termination, Termination::GradientConverged);
        assert!(!report.termination.converged());
        assert!(x[0].is_nan());
    }

    #[test]
    fn empty_parameter_vector_is_reported_as_empty() {
        struct Constant;
        impl NllsProblem for Constant {
            fn num_params(&self) -> usize {
                0
            }
            fn num_residuals(&self) -> usize {
                1
            }
            fn residuals(&self, _: &DVector<f64>) -> DVector<f64> {
                DVector::from_element(1, 2.0)
            }
            fn jacobian(&self, _: &DVector<f64>) -> DMatrix<f64> {
                DMatrix::zeros(1, 0)
            }
        }

        let (x, report) = levenberg_marquardt(&Constant, DVector::zeros(0), &SolveOptions::default());
        assert!(x.is_empty());
        assert_eq!(report.termination, Termination::Empty);
        assert_eq!((report.initial_cost, report.final_cost), (4.0, 4.0));
    }

    #[test]
    fn crate_reasons_map_onto_terminations() {
        let cases = [
            (TerminationReason::Converged { ftol: true, xtol: false }, Termination::CostConverged),
            (TerminationReason::Converged { ftol: false, xtol: true }, Termination::StepConverged),
            (TerminationReason::Orthogonal, Termination::GradientConverged),
            (TerminationReason::LostPatience, Termination::MaxEvaluations),
            (TerminationReason::Numerical("jacobian"), Termination::NonFinite),
            (TerminationReason::NoParameters, Termination::Empty),
        ];
        for (reason, expected) in cases {
            assert_eq!(Termination::from(&reason), expected, "{reason:?}");
        }
    }
}
