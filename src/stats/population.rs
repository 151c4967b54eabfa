use ndarray::{Array1, Array2, ArrayView1};

use crate::core::HouseholdPopulation;

/// Trait extension to summarise a probability vector by compartment and class
pub trait CompartmentSummary {
    /// Expected number of individuals per household in each compartment (rows) and class
    /// (columns).
    fn expected_counts(&self, h: &[f64]) -> Array2<f64>;

    /// Fraction of the individuals of each class that are in `compartment`.
    fn prevalence(&self, h: &[f64], compartment: usize) -> Array1<f64>;

    /// Total probability mass of every composition.
    fn composition_mass(&self, h: &[f64]) -> Vec<f64>;
}

impl CompartmentSummary for HouseholdPopulation {
    fn expected_counts(&self, h: &[f64]) -> Array2<f64> {
        let h = ArrayView1::from(h);
        let n_compartments = self.variant().n_compartments();
        let mut counts = Array2::zeros((n_compartments, self.n_classes()));
        for compartment in 0..n_compartments {
            counts
                .row_mut(compartment)
                .assign(&self.compartment_counts(compartment).t().dot(&h));
        }
        counts
    }

    /// Classes without any individuals have a prevalence of zero.
    fn prevalence(&self, h: &[f64], compartment: usize) -> Array1<f64> {
        let h = ArrayView1::from(h);
        let denom = self.composition_by_state().t().dot(&h);
        let counts = self.compartment_counts(compartment).t().dot(&h);
        Array1::from_shape_fn(denom.len(), |class| {
            if denom[class] > 0. {
                counts[class] / denom[class]
            } else {
                0.
            }
        })
    }

    fn composition_mass(&self, h: &[f64]) -> Vec<f64> {
        self.offsets()
            .windows(2)
            .map(|window| h[window[0]..window[1]].iter().sum())
            .collect()
    }
}
