//! Household compositions
//!
//! A composition is the number of individuals of each demographic class that live together in one
//! household archetype. The `CompositionList` collects all observed compositions together with the
//! fraction of households that have each composition, and guarantees that every composition is
//! unique, non-empty and of the same dimension.

use derive_more::Deref;
use itertools::Itertools;
use std::collections::HashSet;

use crate::errors::{HouseholdError, Result};

/// Tolerance on the sum of the composition distribution before it is renormalised.
const DISTRIBUTION_TOLERANCE: f64 = 1e-9;

/// Number of individuals of each class in one household archetype.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deref)]
pub struct Composition(Vec<usize>);

impl Composition {
    pub fn new(counts: Vec<usize>) -> Self {
        Self(counts)
    }

    /// Total number of individuals in the household.
    pub fn size(&self) -> usize {
        self.0.iter().sum()
    }

    /// Indices of the classes with at least one member.
    pub fn classes_present(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(class, _)| class)
            .collect()
    }

    /// Occupancy of the classes with at least one member, in class order.
    pub fn occupancy_present(&self) -> Vec<usize> {
        self.0.iter().copied().filter(|count| *count > 0).collect()
    }
}

impl std::fmt::Display for Composition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

/// All observed household compositions and their population weights.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionList {
    compositions: Vec<Composition>,
    distribution: Vec<f64>,
    n_classes: usize,
}

impl CompositionList {
    /// Construct a validated composition list.
    ///
    /// Compositions must share the same number of classes, contain at least one individual and be
    /// unique. The distribution needs one finite, non-negative weight per composition. If the
    /// weights do not sum to one they are rescaled.
    pub fn new(compositions: Vec<Composition>, distribution: Vec<f64>) -> Result<Self> {
        let n_classes = match compositions.first() {
            Some(first) => first.len(),
            None => {
                return Err(HouseholdError::MalformedComposition(
                    "Composition list is empty".to_string(),
                ));
            }
        };

        if n_classes == 0 {
            return Err(HouseholdError::MalformedComposition(
                "Compositions need at least one class".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(compositions.len());
        for (idx, composition) in compositions.iter().enumerate() {
            if composition.len() != n_classes {
                return Err(HouseholdError::MalformedComposition(format!(
                    "Composition {idx} has {} classes instead of {n_classes}",
                    composition.len()
                )));
            }
            if composition.size() == 0 {
                return Err(HouseholdError::MalformedComposition(format!(
                    "Composition {idx} describes an empty household"
                )));
            }
            if !seen.insert(composition) {
                return Err(HouseholdError::MalformedComposition(format!(
                    "Composition {composition} appears more than once"
                )));
            }
        }

        let distribution = Self::check_distribution(distribution, compositions.len())?;

        Ok(Self {
            compositions,
            distribution,
            n_classes,
        })
    }

    /// Construct a composition list from raw, possibly negative, class counts.
    pub fn from_counts(counts: &[Vec<i64>], distribution: Vec<f64>) -> Result<Self> {
        let compositions = counts
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                row.iter()
                    .map(|&count| {
                        usize::try_from(count).map_err(|_| {
                            HouseholdError::MalformedComposition(format!(
                                "Composition {idx} has negative count {count}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<usize>>>()
                    .map(Composition::new)
            })
            .collect::<Result<Vec<Composition>>>()?;
        Self::new(compositions, distribution)
    }

    fn check_distribution(distribution: Vec<f64>, n_compositions: usize) -> Result<Vec<f64>> {
        if distribution.len() != n_compositions {
            return Err(HouseholdError::MalformedComposition(format!(
                "Distribution has {} weights for {n_compositions} compositions",
                distribution.len()
            )));
        }
        if let Some(weight) = distribution.iter().find(|w| !w.is_finite() || **w < 0.) {
            return Err(HouseholdError::MalformedComposition(format!(
                "Invalid composition weight {weight}"
            )));
        }

        let total: f64 = distribution.iter().sum();
        if total <= 0. {
            return Err(HouseholdError::MalformedComposition(
                "Composition weights sum to zero".to_string(),
            ));
        }
        if (total - 1.).abs() > DISTRIBUTION_TOLERANCE {
            log::warn!("Composition weights sum to {total}, rescaling to one.");
            return Ok(distribution.into_iter().map(|w| w / total).collect());
        }
        Ok(distribution)
    }

    pub fn len(&self) -> usize {
        self.compositions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compositions.is_empty()
    }

    /// Number of demographic classes shared by all compositions.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn get(&self, idx: usize) -> &Composition {
        &self.compositions[idx]
    }

    pub fn weight(&self, idx: usize) -> f64 {
        self.distribution[idx]
    }

    pub fn compositions(&self) -> &[Composition] {
        &self.compositions
    }

    pub fn distribution(&self) -> &[f64] {
        &self.distribution
    }

    /// Iterate over compositions together with their weights.
    pub fn iter(&self) -> impl Iterator<Item = (&Composition, f64)> {
        self.compositions
            .iter()
            .zip(self.distribution.iter().copied())
    }

    /// Expected number of individuals in a randomly chosen household.
    pub fn average_household_size(&self) -> f64 {
        self.iter()
            .map(|(composition, weight)| weight * composition.size() as f64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_counts() -> Vec<Vec<i64>> {
        vec![
            vec![0, 1],
            vec![0, 2],
            vec![1, 1],
            vec![1, 2],
            vec![2, 1],
            vec![2, 2],
        ]
    }

    #[test]
    fn classes_present() {
        let composition = Composition::new(vec![0, 2, 0, 1]);
        assert_eq!(composition.classes_present(), vec![1, 3]);
        assert_eq!(composition.occupancy_present(), vec![2, 1]);
        assert_eq!(composition.size(), 3);
    }

    #[test]
    fn from_counts() {
        let list = CompositionList::from_counts(&example_counts(), vec![1. / 6.; 6]).unwrap();
        assert_eq!(list.len(), 6);
        assert_eq!(list.n_classes(), 2);
        assert_eq!(list.get(3).as_slice(), &[1, 2]);
    }

    #[test]
    fn rescale_distribution() {
        let list =
            CompositionList::from_counts(&example_counts(), vec![0.2, 0.2, 0.1, 0.1, 0.1, 0.1])
                .unwrap();
        let total: f64 = list.distribution().iter().sum();
        assert!((total - 1.).abs() < 1e-12);
        assert!((list.weight(0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn reject_duplicates() {
        let result = CompositionList::from_counts(&[vec![1, 1], vec![1, 1]], vec![0.5, 0.5]);
        assert!(matches!(
            result,
            Err(HouseholdError::MalformedComposition(_))
        ));
    }

    #[test]
    fn reject_negative_counts() {
        let result = CompositionList::from_counts(&[vec![1, -1], vec![0, 1]], vec![0.5, 0.5]);
        assert!(matches!(
            result,
            Err(HouseholdError::MalformedComposition(_))
        ));
    }

    #[test]
    fn reject_empty_household() {
        let result = CompositionList::from_counts(&[vec![0, 0], vec![0, 1]], vec![0.5, 0.5]);
        assert!(matches!(
            result,
            Err(HouseholdError::MalformedComposition(_))
        ));
    }

    #[test]
    fn reject_mismatched_dimensions() {
        let result = CompositionList::from_counts(&[vec![1, 1], vec![1]], vec![0.5, 0.5]);
        assert!(result.is_err());
        let result = CompositionList::from_counts(&[vec![1, 1], vec![0, 1]], vec![1.]);
        assert!(result.is_err());
        let result = CompositionList::from_counts(&[vec![1, 1], vec![0, 1]], vec![0.5, -0.5]);
        assert!(result.is_err());
    }

    #[test]
    fn average_household_size() {
        let list = CompositionList::from_counts(&[vec![0, 1], vec![1, 1]], vec![0.5, 0.5]).unwrap();
        assert!((list.average_household_size() - 1.5).abs() < 1e-12);
    }
}
