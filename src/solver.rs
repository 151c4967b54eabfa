//! Initial value problem solvers for the rate equations.

use crate::errors::{HouseholdError, Result};

/// Right hand side `(t, y) -> dy/dt` of an ODE system.
pub type RightHandSide<'a> = dyn FnMut(f64, &[f64]) -> Result<Vec<f64>> + 'a;

/// Stored solution points of an integration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn push(&mut self, t: f64, y: Vec<f64>) {
        self.times.push(t);
        self.states.push(y);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn last(&self) -> Option<(f64, &[f64])> {
        self.times
            .last()
            .copied()
            .zip(self.states.last().map(Vec::as_slice))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> {
        self.times
            .iter()
            .copied()
            .zip(self.states.iter().map(Vec::as_slice))
    }
}

pub trait IvpSolver {
    /// Integrate from `y0` at `t_span.0` to `t_span.1`, calling `observer` with the time reached
    /// after every step. Errors of the right hand side abort the integration.
    fn solve_observed(
        &self,
        rhs: &mut RightHandSide,
        t_span: (f64, f64),
        y0: &[f64],
        observer: &mut dyn FnMut(f64),
    ) -> Result<Trajectory>;

    fn solve(
        &self,
        rhs: &mut RightHandSide,
        t_span: (f64, f64),
        y0: &[f64],
    ) -> Result<Trajectory> {
        self.solve_observed(rhs, t_span, y0, &mut |_| {})
    }
}

/// Classical fixed step Runge-Kutta method of order four.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rk4Solver {
    step: f64,
    output_every: usize,
}

impl Rk4Solver {
    /// Solver with step size `step` keeping every `output_every`-th step.
    pub fn new(step: f64, output_every: usize) -> Result<Self> {
        if !step.is_finite() || step <= 0. {
            return Err(HouseholdError::InitializationError(format!(
                "Step size must be positive, got {step}"
            )));
        }
        Ok(Self {
            step,
            output_every: output_every.max(1),
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Number of steps needed to cover `t_span`.
    pub fn n_steps(&self, t_span: (f64, f64)) -> usize {
        ((t_span.1 - t_span.0) / self.step).ceil().max(0.) as usize
    }
}

impl IvpSolver for Rk4Solver {
    fn solve_observed(
        &self,
        rhs: &mut RightHandSide,
        t_span: (f64, f64),
        y0: &[f64],
        observer: &mut dyn FnMut(f64),
    ) -> Result<Trajectory> {
        let (t0, t1) = t_span;
        if !(t1 >= t0) {
            return Err(HouseholdError::InitializationError(format!(
                "Invalid time span ({t0}, {t1})"
            )));
        }

        let n = y0.len();
        let mut y = y0.to_vec();
        let mut scratch = vec![0.; n];
        let mut trajectory = Trajectory::default();
        trajectory.push(t0, y.clone());

        let n_steps = self.n_steps(t_span);
        let mut t = t0;
        for step in 1..=n_steps {
            // the last step ends exactly at t1
            let dt = if step == n_steps { t1 - t } else { self.step };

            let k1 = check_length(rhs(t, &y)?, n)?;
            axpy(&mut scratch, &y, 0.5 * dt, &k1);
            let k2 = check_length(rhs(t + 0.5 * dt, &scratch)?, n)?;
            axpy(&mut scratch, &y, 0.5 * dt, &k2);
            let k3 = check_length(rhs(t + 0.5 * dt, &scratch)?, n)?;
            axpy(&mut scratch, &y, dt, &k3);
            let k4 = check_length(rhs(t + dt, &scratch)?, n)?;

            for i in 0..n {
                y[i] += dt / 6. * (k1[i] + 2. * k2[i] + 2. * k3[i] + k4[i]);
            }
            t = if step == n_steps { t1 } else { t + dt };
            observer(t);

            if step % self.output_every == 0 || step == n_steps {
                log::trace!("Storing solution at t={t}");
                trajectory.push(t, y.clone());
            }
        }
        Ok(trajectory)
    }
}

/// `out = y + a * k`
fn axpy(out: &mut [f64], y: &[f64], a: f64, k: &[f64]) {
    for ((out, y), k) in out.iter_mut().zip(y).zip(k) {
        *out = y + a * k;
    }
}

fn check_length(dy: Vec<f64>, n: usize) -> Result<Vec<f64>> {
    if dy.len() != n {
        return Err(HouseholdError::InvalidState(format!(
            "Right hand side returned {} entries for a system of size {n}",
            dy.len()
        )));
    }
    Ok(dy)
}
