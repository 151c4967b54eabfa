//! Household state spaces
//!
//! A household state records, for each class present in a composition, how many of its members
//! are in each epidemiological compartment. The state space of a composition is the set of all
//! such records that conserve the occupancy of every class.
//!
//! States are enumerated class by class: every class distributes its members over the
//! compartments (the stars and bars construction), and the state space is the cartesian product
//! of these per-class blocks. Each state is assigned a stable index and can be looked up from its
//! raw counts through a mixed radix key (see `StateSpace::key`).

use itertools::Itertools;
use ndarray::{Array2, ArrayView1};
use std::collections::HashMap;

use super::composition::Composition;
use crate::errors::{HouseholdError, Result};

/// Enumerated states of a single household composition.
#[derive(Clone, Debug)]
pub struct StateSpace {
    composition: Composition,
    classes: Vec<usize>,
    occupancy: Vec<usize>,
    n_compartments: usize,
    states: Array2<usize>,
    reverse_prod: Vec<usize>,
    index: HashMap<usize, usize>,
}

impl StateSpace {
    /// Enumerate all states of `composition` with `n_compartments` compartments per class.
    pub fn build(composition: &Composition, n_compartments: usize) -> Result<Self> {
        if n_compartments == 0 {
            return Err(HouseholdError::InitializationError(
                "State spaces need at least one compartment".to_string(),
            ));
        }

        if composition.size() == 0 {
            return Err(HouseholdError::MalformedComposition(
                "Cannot enumerate the states of an empty household".to_string(),
            ));
        }

        let classes = composition.classes_present();
        let occupancy = composition.occupancy_present();
        let width = n_compartments * classes.len();
        let expected = count_states(&occupancy, n_compartments);

        let blocks: Vec<Vec<Vec<usize>>> = occupancy
            .iter()
            .map(|&total| distribute(total, n_compartments))
            .collect();

        let rows: Vec<usize> = blocks
            .iter()
            .map(|block| block.iter())
            .multi_cartesian_product()
            .flat_map(|combination| combination.into_iter().flatten().copied().collect_vec())
            .collect();

        let states = Array2::from_shape_vec((rows.len() / width, width), rows)
            .map_err(|err| HouseholdError::InitializationError(format!("{err}")))?;

        if states.nrows() != expected {
            return Err(HouseholdError::ConservationViolation(format!(
                "Composition {composition} enumerated {} states instead of {expected}",
                states.nrows()
            )));
        }

        let reverse_prod = reverse_product(&occupancy, n_compartments)?;

        let mut space = Self {
            composition: composition.clone(),
            classes,
            occupancy,
            n_compartments,
            states,
            reverse_prod,
            index: HashMap::with_capacity(expected),
        };

        for idx in 0..space.len() {
            let state = space.states.row(idx).to_vec();
            space.check_conservation(&state)?;
            if space.index.insert(space.key(&state), idx).is_some() {
                return Err(HouseholdError::ConservationViolation(format!(
                    "State {state:?} of composition {composition} collides with another state"
                )));
            }
        }

        Ok(space)
    }

    /// Fail if the class blocks of `state` do not sum to the class occupancy.
    pub fn check_conservation(&self, state: &[usize]) -> Result<()> {
        if state.len() != self.width() {
            return Err(HouseholdError::ConservationViolation(format!(
                "State {state:?} has {} entries instead of {}",
                state.len(),
                self.width()
            )));
        }
        for (block, &total) in state.chunks(self.n_compartments).zip(&self.occupancy) {
            if block.iter().sum::<usize>() != total {
                return Err(HouseholdError::ConservationViolation(format!(
                    "State {state:?} does not conserve occupancy {:?} of composition {}",
                    self.occupancy, self.composition
                )));
            }
        }
        Ok(())
    }

    /// Mixed radix key of a raw state vector.
    ///
    /// The key is `state · reverse_prod + state[last]`. It is injective over valid states because
    /// no entry can exceed the occupancy of its class.
    pub fn key(&self, state: &[usize]) -> usize {
        let weighted: usize = state
            .iter()
            .zip(&self.reverse_prod)
            .map(|(count, place)| count * place)
            .sum();
        weighted + state.last().copied().unwrap_or(0)
    }

    /// Index of a raw state vector in this state space.
    ///
    /// Vectors that are not valid states may share a key with a valid one, so the stored state is
    /// compared before the index is returned.
    pub fn index_of(&self, state: &[usize]) -> Option<usize> {
        self.index
            .get(&self.key(state))
            .copied()
            .filter(|&idx| self.states.row(idx).iter().eq(state.iter()))
    }

    /// Index of a state, failing if the state is not part of this space.
    pub fn lookup(&self, state: &[usize]) -> Result<usize> {
        self.index_of(state).ok_or_else(|| {
            HouseholdError::ConservationViolation(format!(
                "State {state:?} is not part of the state space of composition {}",
                self.composition
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.states.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.states.nrows() == 0
    }

    /// Number of entries per state.
    pub fn width(&self) -> usize {
        self.states.ncols()
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Global class indices of the classes present, in block order.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Occupancy of each class block.
    pub fn occupancy(&self) -> &[usize] {
        &self.occupancy
    }

    pub fn n_compartments(&self) -> usize {
        self.n_compartments
    }

    pub fn states(&self) -> &Array2<usize> {
        &self.states
    }

    pub fn state(&self, idx: usize) -> ArrayView1<'_, usize> {
        self.states.row(idx)
    }

    pub fn reverse_prod(&self) -> &[usize] {
        &self.reverse_prod
    }

    /// Map from state key to local state index.
    pub fn index_map(&self) -> &HashMap<usize, usize> {
        &self.index
    }
}

/// Place values of the state key.
///
/// Entry `j` is the number of value combinations of all entries after `j`, where an entry of a
/// class with occupancy `n` takes `n + 1` values. The last place value is zero; the key adds the
/// last entry separately.
fn reverse_product(occupancy: &[usize], n_compartments: usize) -> Result<Vec<usize>> {
    let sizes: Vec<usize> = occupancy
        .iter()
        .flat_map(|&total| std::iter::repeat_n(total + 1, n_compartments))
        .collect();

    let mut reverse_prod = vec![0; sizes.len()];
    let mut place: usize = 1;
    for j in (0..sizes.len().saturating_sub(1)).rev() {
        place = place.checked_mul(sizes[j + 1]).ok_or_else(|| {
            HouseholdError::InitializationError(format!(
                "State key overflows for occupancy {occupancy:?}"
            ))
        })?;
        reverse_prod[j] = place;
    }
    Ok(reverse_prod)
}

/// All ways to distribute `total` individuals over `n_compartments` compartments.
///
/// Earlier compartments are filled first, so the first entry is the all-in-first-compartment
/// block.
pub fn distribute(total: usize, n_compartments: usize) -> Vec<Vec<usize>> {
    if n_compartments <= 1 {
        return vec![vec![total; n_compartments]];
    }
    (0..=total)
        .rev()
        .flat_map(|first| {
            distribute(total - first, n_compartments - 1)
                .into_iter()
                .map(move |mut rest| {
                    rest.insert(0, first);
                    rest
                })
        })
        .collect()
}

/// Number of states of a household with the given class occupancies.
pub fn count_states(occupancy: &[usize], n_compartments: usize) -> usize {
    occupancy
        .iter()
        .map(|&total| binomial(total + n_compartments - 1, n_compartments - 1))
        .product()
}

fn binomial(n: usize, k: usize) -> usize {
    let k = k.min(n - k);
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn distribute_members() {
        assert_eq!(
            distribute(1, 3),
            vec![vec![1, 0, 0], vec![0, 1, 0], vec![0, 0, 1]]
        );
        assert_eq!(distribute(0, 5), vec![vec![0; 5]]);
        assert_eq!(distribute(3, 5).len(), 35);
        assert!(distribute(4, 4).iter().all(|block| block.iter().sum::<usize>() == 4));
    }

    #[test]
    fn state_counts() {
        let space = StateSpace::build(&Composition::new(vec![1, 1]), 5).unwrap();
        assert_eq!(space.len(), 25);
        assert_eq!(space.width(), 10);

        for counts in [vec![0, 1], vec![0, 2], vec![1, 1], vec![1, 2], vec![2, 1], vec![2, 2]] {
            let composition = Composition::new(counts);
            let space = StateSpace::build(&composition, 5).unwrap();
            assert_eq!(
                space.len(),
                count_states(&composition.occupancy_present(), 5)
            );
        }

        let space = StateSpace::build(&Composition::new(vec![3, 0, 2]), 4).unwrap();
        assert_eq!(space.len(), 20 * 10);
        assert_eq!(space.classes(), &[0, 2]);
    }

    #[test]
    fn first_state_is_fully_susceptible() {
        let space = StateSpace::build(&Composition::new(vec![2, 1]), 5).unwrap();
        assert_eq!(space.state(0).to_vec(), vec![2, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn key_is_injective() {
        let space = StateSpace::build(&Composition::new(vec![2, 3]), 5).unwrap();
        let keys: HashSet<usize> = space
            .states()
            .rows()
            .into_iter()
            .map(|state| space.key(state.as_slice().unwrap()))
            .collect();
        assert_eq!(keys.len(), space.len());
    }

    #[test]
    fn lookup_round_trip() {
        let space = StateSpace::build(&Composition::new(vec![1, 2]), 4).unwrap();
        for idx in 0..space.len() {
            let state = space.state(idx).to_vec();
            assert_eq!(space.index_of(&state), Some(idx));
        }
        assert!(space.lookup(&[1, 0, 0, 0, 3, 0, 0, 0]).is_err());
    }

    #[test]
    fn reverse_product_places() {
        assert_eq!(reverse_product(&[1], 3).unwrap(), vec![4, 2, 0]);
        assert_eq!(reverse_product(&[2, 1], 2).unwrap(), vec![12, 4, 2, 0]);
    }

    #[test]
    fn conservation_is_checked() {
        let space = StateSpace::build(&Composition::new(vec![1, 1]), 4).unwrap();
        assert!(space.check_conservation(&[1, 0, 0, 0, 0, 1, 0, 0]).is_ok());
        assert!(matches!(
            space.check_conservation(&[1, 1, 0, 0, 0, 1, 0, 0]),
            Err(HouseholdError::ConservationViolation(_))
        ));
    }
}
