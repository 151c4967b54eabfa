//! Summary statistics of household probability vectors

pub mod population;

pub use population::CompartmentSummary;
