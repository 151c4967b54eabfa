//! Configuration data structures for model runs.

mod parameters;
mod settings;

pub use parameters::{ContactMatrices, Parameters};
pub use settings::{
    HouseholdSource, ImportSettings, InitialSettings, Settings, SettingsError, SolverSettings,
};
