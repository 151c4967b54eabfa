//! Within-household transition rules
//!
//! A transition rule turns the state space of one composition into the generator of the
//! within-household Markov chain. Every transition moves a single individual from one
//! compartment to the next, so the destination of each transition is found by adjusting two
//! entries of the source state and looking the result up in the state space.
//!
//! Besides the generator, a rule records every susceptible to exposed transition as an
//! infection event. Infection from outside the household uses the same transitions with a time
//! dependent rate, so the events are kept to rebuild that operator cheaply.

use ndarray::{Array1, Array2};
use smallvec::SmallVec;

use super::input::ModelInput;
use crate::core::{ModelVariant, SparseMatrix, StateSpace, Triplets};
use crate::errors::{HouseholdError, Result};

type StateBuffer = SmallVec<[usize; 20]>;

/// Origin state, destination state and infected class of every infection event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InfectionEvents {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub classes: Vec<usize>,
}

impl InfectionEvents {
    pub fn push(&mut self, row: usize, col: usize, class: usize) {
        self.rows.push(row);
        self.cols.push(col);
        self.classes.push(class);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over `(row, col, class)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.classes)
            .map(|((&row, &col), &class)| (row, col, class))
    }

    /// Append the events of `other`, shifting its state indices by `offset`.
    pub fn extend_with_offset(&mut self, other: &InfectionEvents, offset: usize) {
        self.rows.extend(other.rows.iter().map(|row| row + offset));
        self.cols.extend(other.cols.iter().map(|col| col + offset));
        self.classes.extend_from_slice(&other.classes);
    }
}

/// Generator and infection events of a single composition.
#[derive(Clone, Debug)]
pub struct Subsystem {
    pub generator: SparseMatrix,
    pub infection_events: InfectionEvents,
}

/// Strategy building the within-household dynamics of one composition.
pub trait TransitionRule: Sync {
    /// Compartment structure the rule operates on.
    fn variant(&self) -> ModelVariant;

    fn build(&self, space: &StateSpace, input: &ModelInput) -> Result<Subsystem>;
}

/// Susceptible, exposed, prodromal, infectious, recovered with frequency dependent mixing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SepirTransitions;

/// Susceptible, exposed, infectious, recovered with density exponent `ModelInput::density_exponent`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SeirTransitions;

/// Transition rule of a model variant.
pub fn transition_rule(variant: ModelVariant) -> &'static dyn TransitionRule {
    match variant {
        ModelVariant::Sepir => &SepirTransitions,
        ModelVariant::Seir => &SeirTransitions,
    }
}

impl TransitionRule for SepirTransitions {
    fn variant(&self) -> ModelVariant {
        ModelVariant::Sepir
    }

    fn build(&self, space: &StateSpace, input: &ModelInput) -> Result<Subsystem> {
        let variant = self.variant();
        check_layout(space, variant)?;
        let prodromal = variant.prodromal().ok_or_else(|| {
            HouseholdError::InitializationError(format!("{variant} has no prodromal compartment"))
        })?;
        let infectious = variant.infectious();
        let alpha_2 = input.alpha_2.ok_or_else(|| {
            HouseholdError::InitializationError("SEPIR needs a symptom onset rate".to_string())
        })?;
        let tau = restrict_vector(
            input.tau.as_ref().ok_or_else(|| {
                HouseholdError::InitializationError(
                    "SEPIR needs a prodromal scaling".to_string(),
                )
            })?,
            space.classes(),
        );
        let r_home = household_transmission(input, space.classes());
        let occupancy: Vec<f64> = space.occupancy().iter().map(|&n| n as f64).collect();

        let mut builder = GeneratorBuilder::new(space);
        for block in 0..space.classes().len() {
            builder.infections(block, |state| {
                (0..occupancy.len())
                    .map(|other| {
                        let p = state[builder_offset(space, other) + prodromal] as f64;
                        let i = state[builder_offset(space, other) + infectious] as f64;
                        r_home[[block, other]] * (i + tau[other] * p) / occupancy[other]
                    })
                    .sum()
            })?;
            builder.progression(block, ModelVariant::EXPOSED, prodromal, input.alpha_1)?;
            builder.progression(block, prodromal, infectious, alpha_2)?;
            builder.progression(block, infectious, variant.recovered(), input.gamma)?;
        }
        Ok(builder.finish())
    }
}

impl TransitionRule for SeirTransitions {
    fn variant(&self) -> ModelVariant {
        ModelVariant::Seir
    }

    fn build(&self, space: &StateSpace, input: &ModelInput) -> Result<Subsystem> {
        let variant = self.variant();
        check_layout(space, variant)?;
        let infectious = variant.infectious();
        let r_home = household_transmission(input, space.classes());
        let denominator: Vec<f64> = space
            .occupancy()
            .iter()
            .map(|&n| (n as f64).powf(input.density_exponent))
            .collect();

        let mut builder = GeneratorBuilder::new(space);
        for block in 0..space.classes().len() {
            builder.infections(block, |state| {
                (0..denominator.len())
                    .map(|other| {
                        let i = state[builder_offset(space, other) + infectious] as f64;
                        r_home[[block, other]] * i / denominator[other]
                    })
                    .sum()
            })?;
            builder.progression(block, ModelVariant::EXPOSED, infectious, input.alpha_1)?;
            builder.progression(block, infectious, variant.recovered(), input.gamma)?;
        }
        Ok(builder.finish())
    }
}

fn check_layout(space: &StateSpace, variant: ModelVariant) -> Result<()> {
    if space.n_compartments() != variant.n_compartments() {
        return Err(HouseholdError::InitializationError(format!(
            "{variant} transitions need {} compartments, state space has {}",
            variant.n_compartments(),
            space.n_compartments()
        )));
    }
    Ok(())
}

#[inline]
fn builder_offset(space: &StateSpace, block: usize) -> usize {
    block * space.n_compartments()
}

/// `diag(sus) · k_home` restricted to the classes present.
fn household_transmission(input: &ModelInput, classes: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((classes.len(), classes.len()), |(i, j)| {
        input.sus[classes[i]] * input.k_home[[classes[i], classes[j]]]
    })
}

fn restrict_vector(values: &Array1<f64>, classes: &[usize]) -> Vec<f64> {
    classes.iter().map(|&class| values[class]).collect()
}

/// Accumulates transition rates of one state space.
struct GeneratorBuilder<'a> {
    space: &'a StateSpace,
    triplets: Triplets,
    events: InfectionEvents,
    buffer: StateBuffer,
}

impl<'a> GeneratorBuilder<'a> {
    fn new(space: &'a StateSpace) -> Self {
        Self {
            space,
            triplets: Triplets::with_capacity(space.len(), space.len(), 4 * space.len()),
            events: InfectionEvents::default(),
            buffer: StateBuffer::new(),
        }
    }

    /// Index of the state reached by moving one individual of `block` from `from` to `to`.
    fn destination(
        &mut self,
        source: usize,
        block: usize,
        from: usize,
        to: usize,
    ) -> Result<usize> {
        let offset = builder_offset(self.space, block);
        self.buffer.clear();
        self.buffer.extend(self.space.state(source).iter().copied());
        self.buffer[offset + from] -= 1;
        self.buffer[offset + to] += 1;
        self.space.lookup(&self.buffer)
    }

    /// Susceptible to exposed transitions of `block` with household force of infection `foi`.
    ///
    /// An event is recorded for every state with a susceptible member, even if no one in the
    /// household is infectious.
    fn infections<F>(&mut self, block: usize, foi: F) -> Result<()>
    where
        F: Fn(&[usize]) -> f64,
    {
        let class = self.space.classes()[block];
        let column = builder_offset(self.space, block) + ModelVariant::SUSCEPTIBLE;
        for source in 0..self.space.len() {
            let susceptible = self.space.state(source)[column];
            if susceptible == 0 {
                continue;
            }
            let target =
                self.destination(source, block, ModelVariant::SUSCEPTIBLE, ModelVariant::EXPOSED)?;
            let state = self.space.state(source).to_vec();
            let rate = susceptible as f64 * foi(&state);
            if rate > 0. {
                self.triplets.push(source, target, rate);
            }
            self.events.push(source, target, class);
        }
        Ok(())
    }

    /// Transitions of `block` from `from` to `to` at `rate` per individual.
    fn progression(&mut self, block: usize, from: usize, to: usize, rate: f64) -> Result<()> {
        let column = builder_offset(self.space, block) + from;
        for source in 0..self.space.len() {
            let count = self.space.state(source)[column];
            if count == 0 {
                continue;
            }
            let target = self.destination(source, block, from, to)?;
            self.triplets.push(source, target, rate * count as f64);
        }
        Ok(())
    }

    fn finish(self) -> Subsystem {
        Subsystem {
            generator: self.triplets.into_generator(),
            infection_events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContactMatrices, Parameters};
    use crate::core::Composition;

    fn sepir_input() -> ModelInput {
        ModelInput::sepir(
            &Parameters::default(),
            &ContactMatrices {
                k_home: vec![vec![1., 0.5], vec![0.5, 2.]],
                k_all: vec![vec![3., 1.5], vec![1., 4.]],
            },
        )
        .unwrap()
    }

    fn seir_input() -> ModelInput {
        let parameters = Parameters {
            density_exponent: 0.5,
            ..Default::default()
        };
        ModelInput::seir(
            &parameters,
            &ContactMatrices {
                k_home: vec![vec![1., 0.5], vec![0.5, 2.]],
                k_all: vec![vec![3., 1.5], vec![1., 4.]],
            },
        )
        .unwrap()
    }

    fn example_compositions() -> Vec<Composition> {
        [[0, 1], [0, 2], [1, 1], [1, 2], [2, 1], [2, 2]]
            .iter()
            .map(|counts| Composition::new(counts.to_vec()))
            .collect()
    }

    #[test]
    fn generator_rows_sum_to_zero() {
        let sepir = sepir_input();
        let seir = seir_input();
        for composition in example_compositions() {
            for (rule, input) in [
                (transition_rule(ModelVariant::Sepir), &sepir),
                (transition_rule(ModelVariant::Seir), &seir),
            ] {
                let space =
                    StateSpace::build(&composition, rule.variant().n_compartments()).unwrap();
                let subsystem = rule.build(&space, input).unwrap();
                assert_eq!(subsystem.generator.shape(), (space.len(), space.len()));
                for sum in subsystem.generator.row_sums() {
                    assert!(sum.abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn off_diagonal_rates_are_non_negative() {
        let input = sepir_input();
        let space = StateSpace::build(&Composition::new(vec![2, 2]), 5).unwrap();
        let generator = SepirTransitions.build(&space, &input).unwrap().generator;
        for row in 0..space.len() {
            for (col, value) in generator.row(row) {
                if col != row {
                    assert!(value >= 0.);
                }
            }
        }
    }

    #[test]
    fn single_adult_progression() {
        let input = sepir_input();
        let space = StateSpace::build(&Composition::new(vec![0, 1]), 5).unwrap();
        let subsystem = SepirTransitions.build(&space, &input).unwrap();
        let generator = &subsystem.generator;

        // one member can only move along S -> E -> P -> I -> R
        let index = |state: [usize; 5]| space.index_of(&state).unwrap();
        let (s, e, p, i, r) = (
            index([1, 0, 0, 0, 0]),
            index([0, 1, 0, 0, 0]),
            index([0, 0, 1, 0, 0]),
            index([0, 0, 0, 1, 0]),
            index([0, 0, 0, 0, 1]),
        );
        assert_eq!(generator.get(s, e), 0.);
        assert_eq!(generator.get(e, p), input.alpha_1);
        assert_eq!(generator.get(p, i), input.alpha_2.unwrap());
        assert_eq!(generator.get(i, r), input.gamma);
        assert_eq!(generator.get(r, r), 0.);

        // the exposed member moves to the compartment the layout names prodromal
        let mut prodromal = [0; 5];
        prodromal[ModelVariant::Sepir.prodromal().unwrap()] = 1;
        assert_eq!(generator.get(e, index(prodromal)), input.alpha_1);

        assert_eq!(subsystem.infection_events.len(), 1);
        assert_eq!(subsystem.infection_events.iter().next(), Some((s, e, 1)));
    }

    #[test]
    fn household_infection_rate() {
        let input = sepir_input();
        let space = StateSpace::build(&Composition::new(vec![1, 2]), 5).unwrap();
        let generator = SepirTransitions.build(&space, &input).unwrap().generator;

        // child susceptible, one adult prodromal and one adult infectious
        let source = space.index_of(&[1, 0, 0, 0, 0, 0, 0, 1, 1, 0]).unwrap();
        let target = space.index_of(&[0, 1, 0, 0, 0, 0, 0, 1, 1, 0]).unwrap();
        let tau = input.tau.as_ref().unwrap();
        let expected =
            input.sus[0] * input.k_home[[0, 1]] * (1. / 2. + tau[1] * 1. / 2.);
        assert!((generator.get(source, target) - expected).abs() < 1e-12);
    }

    #[test]
    fn density_dependent_infection_rate() {
        let input = seir_input();
        let space = StateSpace::build(&Composition::new(vec![0, 2]), 4).unwrap();
        let generator = SeirTransitions.build(&space, &input).unwrap().generator;

        let source = space.index_of(&[1, 0, 1, 0]).unwrap();
        let target = space.index_of(&[0, 1, 1, 0]).unwrap();
        let expected = input.sus[1] * input.k_home[[1, 1]] / 2f64.powf(0.5);
        assert!((generator.get(source, target) - expected).abs() < 1e-12);
    }

    #[test]
    fn infection_events_cover_susceptible_states() {
        let input = seir_input();
        let space = StateSpace::build(&Composition::new(vec![1, 1]), 4).unwrap();
        let events = SeirTransitions.build(&space, &input).unwrap().infection_events;

        let expected: usize = (0..2)
            .map(|block| {
                space
                    .states()
                    .column(block * 4)
                    .iter()
                    .filter(|&&count| count > 0)
                    .count()
            })
            .sum();
        assert_eq!(events.len(), expected);
        for (row, col, class) in events.iter() {
            let source = space.state(row);
            let target = space.state(col);
            assert_eq!(source[class * 4] - 1, target[class * 4]);
            assert_eq!(source[class * 4 + 1] + 1, target[class * 4 + 1]);
        }
    }

    #[test]
    fn reject_mismatched_layout() {
        let input = seir_input();
        let space = StateSpace::build(&Composition::new(vec![1, 1]), 5).unwrap();
        assert!(SeirTransitions.build(&space, &input).is_err());
    }
}
