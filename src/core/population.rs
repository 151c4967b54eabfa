//! Household population
//!
//! The `HouseholdPopulation` stacks the state spaces of all compositions into one global state
//! space. Global indices are contiguous per composition and follow the order of the composition
//! list, so the within-household generator is block diagonal and every global state knows its
//! composition through `which_composition`.
//!
//! Global states are stored with one block of compartments for every class, including classes
//! that are absent from a composition (their counts are zero). The counts of compartment `c` for
//! all classes are the columns `c, c + nc, c + 2 nc, ...` of `states`.

use ndarray::{s, Array2};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::compartments::ModelVariant;
use super::composition::{Composition, CompositionList};
use super::sparse::SparseMatrix;
use super::state_space::StateSpace;
use crate::errors::{HouseholdError, Result};
use crate::model::{InfectionEvents, ModelInput, Subsystem, TransitionRule};

/// Progress notification emitted after each composition has been assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssemblyProgress {
    pub composition: usize,
    pub n_compositions: usize,
    pub n_states: usize,
}

pub type AssemblyObserver<'a> = &'a (dyn Fn(AssemblyProgress) + Sync);

#[derive(Clone, Debug)]
pub struct HouseholdPopulation {
    variant: ModelVariant,
    compositions: CompositionList,
    state_spaces: Vec<StateSpace>,
    offsets: Vec<usize>,
    internal_generator: SparseMatrix,
    infection_events: InfectionEvents,
    which_composition: Vec<usize>,
    states: Array2<usize>,
    composition_by_state: Array2<f64>,
}

impl HouseholdPopulation {
    /// Assemble the population of all compositions with the given transition rule.
    pub fn build(
        compositions: CompositionList,
        input: &ModelInput,
        rule: &dyn TransitionRule,
        observer: Option<AssemblyObserver>,
    ) -> Result<Self> {
        let variant = rule.variant();
        input.validate(variant)?;
        if input.n_classes() != compositions.n_classes() {
            return Err(HouseholdError::InitializationError(format!(
                "Model input has {} classes, compositions have {}",
                input.n_classes(),
                compositions.n_classes()
            )));
        }

        let n_compositions = compositions.len();
        let build_one = |(idx, composition): (usize, &Composition)| -> Result<(StateSpace, Subsystem)> {
            let space = StateSpace::build(composition, variant.n_compartments())?;
            let subsystem = rule.build(&space, input)?;
            log::debug!(
                "Composition {composition}: {} states, {} generator entries, {} infection events",
                space.len(),
                subsystem.generator.nnz(),
                subsystem.infection_events.len()
            );
            if let Some(observer) = observer {
                observer(AssemblyProgress {
                    composition: idx,
                    n_compositions,
                    n_states: space.len(),
                });
            }
            Ok((space, subsystem))
        };

        #[cfg(feature = "parallel")]
        let built: Vec<(StateSpace, Subsystem)> = compositions
            .compositions()
            .par_iter()
            .enumerate()
            .map(build_one)
            .collect::<Result<_>>()?;

        #[cfg(not(feature = "parallel"))]
        let built: Vec<(StateSpace, Subsystem)> = compositions
            .compositions()
            .iter()
            .enumerate()
            .map(build_one)
            .collect::<Result<_>>()?;

        let mut offsets = Vec::with_capacity(n_compositions + 1);
        offsets.push(0);
        for (space, _) in built.iter() {
            offsets.push(offsets[offsets.len() - 1] + space.len());
        }
        let total = offsets[n_compositions];

        let mut infection_events = InfectionEvents::default();
        let mut which_composition = Vec::with_capacity(total);
        let mut generators = Vec::with_capacity(n_compositions);
        let mut state_spaces = Vec::with_capacity(n_compositions);

        let n_classes = compositions.n_classes();
        let nc = variant.n_compartments();
        let mut states = Array2::zeros((total, nc * n_classes));
        let mut composition_by_state = Array2::zeros((total, n_classes));

        for (idx, (space, subsystem)) in built.into_iter().enumerate() {
            let offset = offsets[idx];
            infection_events.extend_with_offset(&subsystem.infection_events, offset);
            which_composition.extend(std::iter::repeat_n(idx, space.len()));

            let rows = offset..offset + space.len();
            for (block, &class) in space.classes().iter().enumerate() {
                states
                    .slice_mut(s![rows.clone(), class * nc..(class + 1) * nc])
                    .assign(&space.states().slice(s![.., block * nc..(block + 1) * nc]));
            }
            for (class, &count) in compositions.get(idx).iter().enumerate() {
                composition_by_state
                    .slice_mut(s![rows.clone(), class])
                    .fill(count as f64);
            }

            generators.push(subsystem.generator);
            state_spaces.push(space);
        }

        let internal_generator = SparseMatrix::block_diagonal(&generators);

        log::info!(
            "Assembled {variant} household population: {n_compositions} compositions, {total} \
             states, {} generator entries, {} infection events",
            internal_generator.nnz(),
            infection_events.len()
        );

        Ok(Self {
            variant,
            compositions,
            state_spaces,
            offsets,
            internal_generator,
            infection_events,
            which_composition,
            states,
            composition_by_state,
        })
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// Total number of global states.
    pub fn len(&self) -> usize {
        self.which_composition.len()
    }

    pub fn is_empty(&self) -> bool {
        self.which_composition.is_empty()
    }

    pub fn n_classes(&self) -> usize {
        self.compositions.n_classes()
    }

    pub fn compositions(&self) -> &CompositionList {
        &self.compositions
    }

    pub fn composition_distribution(&self) -> &[f64] {
        self.compositions.distribution()
    }

    pub fn state_spaces(&self) -> &[StateSpace] {
        &self.state_spaces
    }

    /// Number of states of every composition.
    pub fn system_sizes(&self) -> Vec<usize> {
        self.state_spaces.iter().map(StateSpace::len).collect()
    }

    /// First global index of every composition, followed by the total number of states.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Global index of local state `state` of composition `composition`.
    pub fn global_index(&self, composition: usize, state: usize) -> usize {
        self.offsets[composition] + state
    }

    pub fn internal_generator(&self) -> &SparseMatrix {
        &self.internal_generator
    }

    pub fn infection_events(&self) -> &InfectionEvents {
        &self.infection_events
    }

    pub fn which_composition(&self) -> &[usize] {
        &self.which_composition
    }

    /// Counts per compartment and class of every global state.
    pub fn states(&self) -> &Array2<usize> {
        &self.states
    }

    /// Occupancy of every class in the composition of each global state.
    pub fn composition_by_state(&self) -> &Array2<f64> {
        &self.composition_by_state
    }

    /// Number of individuals of every class in `compartment`, for each global state.
    pub fn compartment_counts(&self, compartment: usize) -> Array2<f64> {
        let nc = self.variant.n_compartments();
        self.states
            .slice(s![.., compartment..;nc])
            .mapv(|count| count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContactMatrices, Parameters};
    use crate::model::transition_rule;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn contacts() -> ContactMatrices {
        ContactMatrices {
            k_home: vec![vec![1., 0.5], vec![0.5, 2.]],
            k_all: vec![vec![3., 1.5], vec![1., 4.]],
        }
    }

    fn example_list() -> CompositionList {
        CompositionList::from_counts(
            &[
                vec![0, 1],
                vec![0, 2],
                vec![1, 1],
                vec![1, 2],
                vec![2, 1],
                vec![2, 2],
            ],
            vec![0.1, 0.3, 0.1, 0.3, 0.1, 0.1],
        )
        .unwrap()
    }

    fn sepir_population() -> HouseholdPopulation {
        let input = ModelInput::sepir(&Parameters::default(), &contacts()).unwrap();
        HouseholdPopulation::build(
            example_list(),
            &input,
            transition_rule(ModelVariant::Sepir),
            None,
        )
        .unwrap()
    }

    #[test]
    fn global_state_space() {
        let population = sepir_population();
        let sizes = population.system_sizes();
        assert_eq!(sizes, vec![5, 15, 25, 75, 75, 225]);
        assert_eq!(population.len(), sizes.iter().sum::<usize>());
        assert_eq!(population.offsets(), &[0, 5, 20, 45, 120, 195, 420]);
        assert_eq!(population.states().dim(), (420, 10));
        assert_eq!(population.internal_generator().shape(), (420, 420));
        assert_eq!(population.global_index(2, 3), 23);
    }

    #[test]
    fn which_composition_is_contiguous() {
        let population = sepir_population();
        let which = population.which_composition();
        assert!(which.windows(2).all(|pair| pair[0] <= pair[1]));
        for (composition, window) in population.offsets().windows(2).enumerate() {
            assert!(which[window[0]..window[1]]
                .iter()
                .all(|&idx| idx == composition));
        }
    }

    #[test]
    fn internal_generator_is_block_diagonal() {
        let population = sepir_population();
        let generator = population.internal_generator();
        let which = population.which_composition();
        for row in 0..population.len() {
            for (col, _) in generator.row(row) {
                assert_eq!(which[row], which[col]);
            }
        }
        for sum in generator.row_sums() {
            assert!(sum.abs() < 1e-9);
        }
        for (row, col, _) in population.infection_events().iter() {
            assert_eq!(which[row], which[col]);
        }
    }

    #[test]
    fn states_conserve_composition() {
        let population = sepir_population();
        let nc = ModelVariant::Sepir.n_compartments();
        for (idx, state) in population.states().rows().into_iter().enumerate() {
            let composition = population.compositions().get(population.which_composition()[idx]);
            for (class, &count) in composition.iter().enumerate() {
                let block = state.slice(s![class * nc..(class + 1) * nc]);
                assert_eq!(block.sum(), count);
                assert_eq!(population.composition_by_state()[[idx, class]], count as f64);
            }
        }

        let susceptible = population.compartment_counts(ModelVariant::SUSCEPTIBLE);
        assert_eq!(susceptible.dim(), (420, 2));
        // first state of every composition is fully susceptible
        for (composition, &offset) in population.offsets()[..6].iter().enumerate() {
            let counts = population.compositions().get(composition);
            assert_eq!(susceptible[[offset, 0]], counts[0] as f64);
            assert_eq!(susceptible[[offset, 1]], counts[1] as f64);
        }
    }

    #[test]
    fn infection_events_move_one_susceptible() {
        let population = sepir_population();
        let nc = ModelVariant::Sepir.n_compartments();
        let states = population.states();
        for (row, col, class) in population.infection_events().iter() {
            let mut expected = states.row(row).to_owned();
            expected[class * nc + ModelVariant::SUSCEPTIBLE] -= 1;
            expected[class * nc + ModelVariant::EXPOSED] += 1;
            assert_eq!(states.row(col), expected);
        }

        let susceptible = population.compartment_counts(ModelVariant::SUSCEPTIBLE);
        let n_susceptible_pairs = susceptible.iter().filter(|&&count| count > 0.).count();
        assert_eq!(population.infection_events().len(), n_susceptible_pairs);
    }

    #[test]
    fn observer_sees_every_composition() {
        let input = ModelInput::seir(&Parameters::default(), &contacts()).unwrap();
        let calls = AtomicUsize::new(0);
        let observer = |progress: AssemblyProgress| {
            assert_eq!(progress.n_compositions, 6);
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let population = HouseholdPopulation::build(
            example_list(),
            &input,
            transition_rule(ModelVariant::Seir),
            Some(&observer as AssemblyObserver),
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(population.states().ncols(), 8);
    }

    #[test]
    fn reject_class_mismatch() {
        let input = ModelInput::seir(&Parameters::default(), &contacts()).unwrap();
        let list =
            CompositionList::new(vec![Composition::new(vec![1, 1, 1])], vec![1.]).unwrap();
        assert!(
            HouseholdPopulation::build(list, &input, transition_rule(ModelVariant::Seir), None)
                .is_err()
        );
    }
}
