//! Epidemic model on top of the household population.
//!
//! 1. `input`: rates, contact matrices and imports of a model run.
//! 2. `imports`: background infection pressure from outside the population.
//! 3. `transitions`: within-household transition rules of each model variant.
//! 4. `rate_equations`: the right hand side of the population ODE.
//! 5. `initial`: initial probability vectors.

pub mod imports;
pub mod initial;
pub mod input;
pub mod rate_equations;
pub mod transitions;

pub use imports::{ConstantImportModel, ExpressionImportModel, ImportModel, NoImportModel};
pub use initial::{make_initial_condition, make_initial_condition_with_recovereds};
pub use input::{dominant_eigenvalue, ModelInput};
pub use rate_equations::{ExternalForce, RateEquations};
pub use transitions::{
    transition_rule, InfectionEvents, SeirTransitions, SepirTransitions, Subsystem,
    TransitionRule,
};
