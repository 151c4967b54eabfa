//! Epidemiological compartment layouts.
//!
//! Every individual in a household occupies exactly one compartment. A household state stores,
//! for each class present, one block of counts with one entry per compartment in the order given
//! here.

use serde::{Deserialize, Serialize};

/// Compartment structure of the within-household model.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelVariant {
    /// Susceptible, Exposed, Prodromal, Infectious, Recovered.
    #[serde(rename = "SEPIR")]
    Sepir,
    /// Susceptible, Exposed, Infectious, Recovered.
    #[serde(rename = "SEIR")]
    Seir,
}

impl ModelVariant {
    pub const SUSCEPTIBLE: usize = 0;
    pub const EXPOSED: usize = 1;

    pub fn n_compartments(&self) -> usize {
        match self {
            ModelVariant::Sepir => 5,
            ModelVariant::Seir => 4,
        }
    }

    pub fn prodromal(&self) -> Option<usize> {
        match self {
            ModelVariant::Sepir => Some(2),
            ModelVariant::Seir => None,
        }
    }

    pub fn infectious(&self) -> usize {
        match self {
            ModelVariant::Sepir => 3,
            ModelVariant::Seir => 2,
        }
    }

    pub fn recovered(&self) -> usize {
        match self {
            ModelVariant::Sepir => 4,
            ModelVariant::Seir => 3,
        }
    }

    /// Short compartment labels in state order.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            ModelVariant::Sepir => &["S", "E", "P", "I", "R"],
            ModelVariant::Seir => &["S", "E", "I", "R"],
        }
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelVariant::Sepir => write!(f, "SEPIR"),
            ModelVariant::Seir => write!(f, "SEIR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts() {
        for variant in [ModelVariant::Sepir, ModelVariant::Seir] {
            assert_eq!(variant.labels().len(), variant.n_compartments());
            assert_eq!(variant.recovered(), variant.n_compartments() - 1);
            assert_eq!(variant.labels()[variant.infectious()], "I");
        }
        assert_eq!(ModelVariant::Sepir.prodromal(), Some(2));
        assert_eq!(ModelVariant::Seir.prodromal(), None);
    }
}
