//! Household state spaces and their assembly into a population.
//!
//! 1. `composition`: household archetypes and their population weights.
//! 2. `compartments`: compartment layouts of the supported model variants.
//! 3. `state_space`: enumeration and lookup of the states of one composition.
//! 4. `sparse`: compressed sparse row matrices used for Markov generators.
//! 5. `population`: the global state space of all compositions.

pub mod compartments;
pub mod composition;
pub mod population;
pub mod sparse;
pub mod state_space;

pub use compartments::ModelVariant;
pub use composition::{Composition, CompositionList};
pub use population::{AssemblyObserver, AssemblyProgress, HouseholdPopulation};
pub use sparse::{SparseMatrix, Triplets};
pub use state_space::StateSpace;
