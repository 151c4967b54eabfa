//! All errors that can occur in the households library.

use std::fmt;

pub type Result<T> = std::result::Result<T, HouseholdError>;

#[derive(Clone, Debug, PartialEq)]
pub enum HouseholdError {
    /// The probability vector handed to the rate equations contains NaN.
    InvalidState(String),
    /// A household state does not conserve the per-class occupancy of its composition.
    ConservationViolation(String),
    /// The composition list or distribution cannot be used to build a population.
    MalformedComposition(String),
    InitializationError(String),
    ReadError(String),
    WriteError(String),
}

impl fmt::Display for HouseholdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HouseholdError::InvalidState(message) => {
                write!(f, "InvalidStateError: {}", message)
            }
            HouseholdError::ConservationViolation(message) => {
                write!(f, "ConservationViolation: {}", message)
            }
            HouseholdError::MalformedComposition(message) => {
                write!(f, "MalformedCompositionError: {}", message)
            }
            HouseholdError::InitializationError(message) => {
                write!(f, "InitializationError: {}", message)
            }
            HouseholdError::ReadError(message) => {
                write!(f, "ReadError: {}", message)
            }
            HouseholdError::WriteError(message) => {
                write!(f, "WriteError: {}", message)
            }
        }
    }
}

impl std::error::Error for HouseholdError {}
