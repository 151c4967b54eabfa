//! Initial probability vectors.
//!
//! Both constructors seed a small amount of infection into an otherwise fully susceptible
//! population. Each composition keeps its population weight: whatever is seeded into the
//! infected (or previously infected) states of a composition is taken from its fully susceptible
//! state.

use ndarray::{Array1, Axis};

use crate::core::{HouseholdPopulation, ModelVariant};
use crate::errors::{HouseholdError, Result};

/// States with exactly one infectious member and everyone else susceptible receive
/// `prevalence` times the weight of their composition.
pub fn make_initial_condition(
    population: &HouseholdPopulation,
    prevalence: f64,
) -> Result<Array1<f64>> {
    check_fraction("prevalence", prevalence)?;
    let seeded = index_case_states(population);
    let distribution = population.composition_distribution();

    let mut h = Array1::zeros(population.len());
    for &state in seeded.iter() {
        h[state] = prevalence * distribution[population.which_composition()[state]];
    }
    fill_susceptible(population, h)
}

/// Like `make_initial_condition` with an additional share of households that went through an
/// outbreak already.
///
/// Previously visited states have `attack_ratio * size` recovered members, rounded half to even,
/// and everyone else susceptible. Households where this rounds to zero get no visited state. Index case states receive a total of `prevalence` and visited states a total of
/// `seroprevalence / attack_ratio`, both per individual, distributed in proportion to the weight
/// of their composition.
pub fn make_initial_condition_with_recovereds(
    population: &HouseholdPopulation,
    prevalence: f64,
    seroprevalence: f64,
    attack_ratio: f64,
) -> Result<Array1<f64>> {
    check_fraction("prevalence", prevalence)?;
    check_fraction("seroprevalence", seroprevalence)?;
    if !(attack_ratio > 0. && attack_ratio <= 1.) {
        return Err(HouseholdError::InitializationError(format!(
            "Attack ratio must be in (0, 1], got {attack_ratio}"
        )));
    }

    let variant = population.variant();
    let size = household_size(population);
    let susceptible = population
        .compartment_counts(ModelVariant::SUSCEPTIBLE)
        .sum_axis(Axis(1));
    let recovered = population
        .compartment_counts(variant.recovered())
        .sum_axis(Axis(1));
    let visited: Vec<usize> = (0..population.len())
        .filter(|&state| {
            recovered[state] > 0.
                && recovered[state] == (attack_ratio * size[state]).round_ties_even()
                && susceptible[state] + recovered[state] == size[state]
        })
        .collect();

    let average_size = population.compositions().average_household_size();
    let mut h = Array1::zeros(population.len());
    seed_proportionally(
        population,
        &mut h,
        &index_case_states(population),
        average_size * prevalence,
    );
    seed_proportionally(
        population,
        &mut h,
        &visited,
        average_size * seroprevalence / attack_ratio,
    );
    fill_susceptible(population, h)
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !(0. ..1.).contains(&value) {
        return Err(HouseholdError::InitializationError(format!(
            "{name} must be in [0, 1), got {value}"
        )));
    }
    Ok(())
}

fn household_size(population: &HouseholdPopulation) -> Array1<f64> {
    population.composition_by_state().sum_axis(Axis(1))
}

/// States with one infectious member and all other members susceptible.
fn index_case_states(population: &HouseholdPopulation) -> Vec<usize> {
    let size = household_size(population);
    let susceptible = population
        .compartment_counts(ModelVariant::SUSCEPTIBLE)
        .sum_axis(Axis(1));
    let infectious = population
        .compartment_counts(population.variant().infectious())
        .sum_axis(Axis(1));
    (0..population.len())
        .filter(|&state| infectious[state] == 1. && susceptible[state] + 1. == size[state])
        .collect()
}

/// Spread `total` over `states` in proportion to the weight of their composition.
fn seed_proportionally(
    population: &HouseholdPopulation,
    h: &mut Array1<f64>,
    states: &[usize],
    total: f64,
) {
    let distribution = population.composition_distribution();
    let which = population.which_composition();
    let norm: f64 = states.iter().map(|&state| distribution[which[state]]).sum();
    if norm <= 0. {
        return;
    }
    for &state in states {
        h[state] += total * distribution[which[state]] / norm;
    }
}

/// Give each fully susceptible state the weight its composition has left.
fn fill_susceptible(population: &HouseholdPopulation, mut h: Array1<f64>) -> Result<Array1<f64>> {
    for (composition, window) in population.offsets().windows(2).enumerate() {
        let weight = population.composition_distribution()[composition];
        let seeded: f64 = h.slice(ndarray::s![window[0]..window[1]]).sum();
        if seeded > weight {
            return Err(HouseholdError::InitializationError(format!(
                "Seeded weight {seeded} exceeds the weight {weight} of composition {}",
                population.compositions().get(composition)
            )));
        }
        // the first state of every composition is the fully susceptible one
        h[window[0]] = weight - seeded;
    }
    Ok(h)
}
