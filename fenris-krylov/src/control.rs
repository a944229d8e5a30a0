use nalgebra::Scalar;

use crate::Real;

/// Outcome of a single convergence check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlState {
    /// Neither converged nor out of iterations.
    Iterate,
    /// The residual dropped below the tolerance.
    Success,
    /// The iteration cap was reached, or the residual is not finite.
    Failure,
}

/// Iteration control for Krylov methods: an absolute tolerance on the residual
/// norm, an iteration cap and (optionally) the history of checked residuals.
///
/// A control is per-invocation state. Create a fresh one (or [`reset`](Self::reset)
/// it) for every solve.
#[derive(Debug, Clone)]
pub struct SolverControl<T: Scalar> {
    max_steps: usize,
    tolerance: T,
    record_history: bool,
    history: Vec<(usize, T)>,
    last_step: usize,
    last_value: Option<T>,
}

impl<T: Real> SolverControl<T> {
    pub fn new(max_steps: usize, tolerance: T) -> Self {
        Self {
            max_steps,
            tolerance,
            record_history: false,
            history: Vec::new(),
            last_step: 0,
            last_value: None,
        }
    }

    pub fn with_history(self) -> Self {
        Self {
            record_history: true,
            ..self
        }
    }

    pub fn check(&mut self, step: usize, value: T) -> ControlState {
        self.last_step = step;
        self.last_value = Some(value);
        if self.record_history {
            self.history.push((step, value));
        }

        if !value.is_finite() {
            ControlState::Failure
        } else if value <= self.tolerance {
            ControlState::Success
        } else if step >= self.max_steps {
            ControlState::Failure
        } else {
            ControlState::Iterate
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_step = 0;
        self.last_value = None;
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn tolerance(&self) -> T {
        self.tolerance
    }

    /// The step index passed to the most recent [`check`](Self::check).
    pub fn last_step(&self) -> usize {
        self.last_step
    }

    pub fn last_value(&self) -> Option<T> {
        self.last_value
    }

    /// `(step, residual)` pairs in the order they were checked. A step index repeats when a
    /// restarted method re-checks the true residual. Empty unless the control was created
    /// with [`with_history`](Self::with_history).
    pub fn history(&self) -> &[(usize, T)] {
        &self.history
    }
}
