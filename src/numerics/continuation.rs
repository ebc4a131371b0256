//! Embedding continuation from the linear Poisson problem (λ1 = 0) to the
//! full nonlinear equilibrium (λ1 = 1).

use log::{debug, info, warn};
use nalgebra::DVector;
use thiserror::Error;

use super::solver::{NonlinearSolver, SolverControl, SolverError};
use super::timing::{record_step, report_step_timing, reset_step_timing};
use crate::physics::DeviceModel;

/// `0, 10^-steps, 10^-(steps-1), …, 10^0`, strictly increasing.
pub fn schedule(steps: usize) -> Vec<f64> {
    let steps = steps as i32;
    std::iter::once(0.0)
        .chain((-steps..=0).map(|k| 10f64.powi(k)))
        .collect()
}

#[derive(Debug, Error)]
#[error(
    "equilibrium continuation failed at step {step} (λ1 = {lambda:.1e}): {source}; \
     increase the number of continuation steps or relax the Newton tolerances"
)]
pub struct ConvergenceFailure {
    pub step: usize,
    pub lambda: f64,
    /// Solution of the last successful step, untouched by the failed one.
    pub last_solution: Option<DVector<f64>>,
    pub source: SolverError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContinuationState {
    Init,
    Stepping { step: usize, lambda: f64 },
    Converged { solution: DVector<f64> },
    Failed { step: usize, lambda: f64 },
}

/// Sequential driver over [`schedule`]. Each step sets λ1 on the model and
/// starts the external solve from the previous step's solution.
#[derive(Debug, Clone)]
pub struct EquilibriumContinuation {
    steps: usize,
    initial_guess: Option<DVector<f64>>,
    state: ContinuationState,
}

impl EquilibriumContinuation {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            initial_guess: None,
            state: ContinuationState::Init,
        }
    }

    /// Starts the first step from `guess` instead of the zero vector.
    pub fn with_initial_guess(mut self, guess: DVector<f64>) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    pub fn state(&self) -> &ContinuationState {
        &self.state
    }

    pub fn schedule(&self) -> Vec<f64> {
        schedule(self.steps)
    }

    pub fn run<S>(
        &mut self,
        model: &mut DeviceModel,
        solver: &mut S,
        control: &SolverControl,
    ) -> Result<DVector<f64>, ConvergenceFailure>
    where
        S: NonlinearSolver + ?Sized,
    {
        let lambdas = self.schedule();
        let mut last: Option<DVector<f64>> = None;
        reset_step_timing();

        for (step, &lambda) in lambdas.iter().enumerate() {
            self.state = ContinuationState::Stepping { step, lambda };
            model.set_lambda1(lambda);
            info!("continuation step {}/{}: λ1 = {lambda:.1e}", step + 1, lambdas.len());

            let guess = match (&last, &self.initial_guess) {
                (Some(previous), _) => previous.clone(),
                (None, Some(initial)) => initial.clone(),
                (None, None) => DVector::zeros(solver.num_unknowns()),
            };
            match record_step(step, lambda, || solver.solve(model, guess, control)) {
                Ok(result) => {
                    debug!(
                        "step {step} converged in {} iterations, residual {:.3e}",
                        result.iterations, result.final_residual
                    );
                    last = Some(result.solution);
                }
                Err(source) => {
                    warn!("continuation step {step} failed at λ1 = {lambda:.1e}: {source}");
                    self.state = ContinuationState::Failed { step, lambda };
                    return Err(ConvergenceFailure {
                        step,
                        lambda,
                        last_solution: last,
                        source,
                    });
                }
            }
        }

        report_step_timing();
        let solution = last.unwrap_or_else(|| DVector::zeros(solver.num_unknowns()));
        self.state = ContinuationState::Converged {
            solution: solution.clone(),
        };
        Ok(solution)
    }
}
