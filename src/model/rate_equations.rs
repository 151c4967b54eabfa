//! Rate equations of the household population
//!
//! The probability vector `H` assigns every global household state the probability (or expected
//! number) of a household being in that state. Its time derivative is
//!
//! ```text
//! dH = Hᵗ · (Q_int + Q_ext(t, H))
//! ```
//!
//! where `Q_int` is the block diagonal within-household generator and `Q_ext` the generator of
//! infections from outside the household. `Q_ext` depends on the population average of the
//! prodromal and infectious fractions of every class and is rebuilt on every evaluation from the
//! recorded infection events.
//!
//! SEPIR populations have two external channels: prodromal contacts, scaled by `tau` and fed by
//! the detected imports, and infectious contacts fed by the undetected imports. SEIR populations
//! only have the infectious channel.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::sync::Arc;

use super::input::ModelInput;
use crate::core::{HouseholdPopulation, ModelVariant, SparseMatrix, Triplets};
use crate::errors::{HouseholdError, Result};

#[derive(Clone, Debug)]
pub struct RateEquations {
    input: ModelInput,
    population: Arc<HouseholdPopulation>,
    epsilon: f64,
    pro_trans: Option<Array2<f64>>,
    inf_trans: Array2<f64>,
    susceptible: Array2<f64>,
    prodromal: Option<Array2<f64>>,
    infectious: Array2<f64>,
}

/// Per-class force of infection of the external channels at one time.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalForce {
    pub prodromal: Option<Array1<f64>>,
    pub infectious: Array1<f64>,
}

impl RateEquations {
    /// `epsilon` scales the population average before it is combined with the imports.
    pub fn new(
        input: ModelInput,
        population: Arc<HouseholdPopulation>,
        epsilon: f64,
    ) -> Result<Self> {
        let variant = population.variant();
        input.validate(variant)?;
        if input.n_classes() != population.n_classes() {
            return Err(HouseholdError::InitializationError(format!(
                "Model input has {} classes, population has {}",
                input.n_classes(),
                population.n_classes()
            )));
        }
        if !epsilon.is_finite() || epsilon < 0. {
            return Err(HouseholdError::InitializationError(format!(
                "Invalid epsilon {epsilon}"
            )));
        }

        // diag(sus) · k_ext
        let inf_trans = &input.k_ext * &input.sus.view().insert_axis(Axis(1));
        let pro_trans = match (variant, &input.tau) {
            (ModelVariant::Sepir, Some(tau)) => Some(&inf_trans * &tau.view().insert_axis(Axis(0))),
            _ => None,
        };

        let susceptible = population.compartment_counts(ModelVariant::SUSCEPTIBLE);
        let prodromal = variant
            .prodromal()
            .map(|compartment| population.compartment_counts(compartment));
        let infectious = population.compartment_counts(variant.infectious());

        Ok(Self {
            input,
            population,
            epsilon,
            pro_trans,
            inf_trans,
            susceptible,
            prodromal,
            infectious,
        })
    }

    pub fn population(&self) -> &HouseholdPopulation {
        &self.population
    }

    pub fn input(&self) -> &ModelInput {
        &self.input
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Time derivative of the probability vector `h` at time `t`.
    ///
    /// Any NaN in `h` is an `InvalidState` error. Negative entries are treated as zero.
    pub fn evaluate(&self, t: f64, h: &[f64]) -> Result<Vec<f64>> {
        let h = self.sanitise(h)?;
        let (pro_operator, inf_operator) = self.external_operators(t, h.view())?;

        let weights = h.to_vec();
        let mut dh = self.population.internal_generator().left_mul(&weights);
        if let Some(pro_operator) = pro_operator {
            pro_operator.left_mul_add(&weights, &mut dh);
        }
        inf_operator.left_mul_add(&weights, &mut dh);
        Ok(dh)
    }

    /// Check `h` and return a copy with negative entries set to zero.
    fn sanitise(&self, h: &[f64]) -> Result<Array1<f64>> {
        if h.len() != self.population.len() {
            return Err(HouseholdError::InvalidState(format!(
                "State vector has {} entries, population has {} states",
                h.len(),
                self.population.len()
            )));
        }
        if let Some(idx) = h.iter().position(|value| value.is_nan()) {
            return Err(HouseholdError::InvalidState(format!(
                "State vector is NaN at index {idx}"
            )));
        }
        Ok(h.iter().map(|&value| value.max(0.)).collect())
    }

    /// Average number of individuals in each compartment per individual of each class.
    ///
    /// Classes without any probability weight have an average of zero.
    fn by_class(
        &self,
        counts: &Array2<f64>,
        h: ArrayView1<f64>,
        denom: &Array1<f64>,
    ) -> Array1<f64> {
        let totals = counts.t().dot(&h);
        Array1::from_shape_fn(totals.len(), |class| {
            if denom[class] > 0. {
                totals[class] / denom[class]
            } else {
                0.
            }
        })
    }

    /// Per-class force of infection from outside the household.
    pub fn external_force(&self, t: f64, h: ArrayView1<f64>) -> Result<ExternalForce> {
        let denom = self.population.composition_by_state().t().dot(&h);
        let import_model = &self.input.import_model;

        let infectious = self.inf_trans.dot(
            &(self.by_class(&self.infectious, h, &denom) * self.epsilon
                + import_model.undetected(t)?),
        );

        let prodromal = match (&self.pro_trans, &self.prodromal) {
            (Some(pro_trans), Some(counts)) => Some(pro_trans.dot(
                &(self.by_class(counts, h, &denom) * self.epsilon + import_model.detected(t)?),
            )),
            _ => None,
        };

        Ok(ExternalForce {
            prodromal,
            infectious,
        })
    }

    /// External infection generators of the prodromal and the infectious channel.
    ///
    /// The entry of every infection event is the number of susceptibles of the infected class in
    /// the origin state times the force of infection on that class.
    pub fn external_operators(
        &self,
        t: f64,
        h: ArrayView1<f64>,
    ) -> Result<(Option<SparseMatrix>, SparseMatrix)> {
        let force = self.external_force(t, h)?;
        let prodromal = force
            .prodromal
            .as_ref()
            .map(|force| self.infection_operator(force));
        let infectious = self.infection_operator(&force.infectious);
        Ok((prodromal, infectious))
    }

    fn infection_operator(&self, force: &Array1<f64>) -> SparseMatrix {
        let n = self.population.len();
        let events = self.population.infection_events();
        let mut triplets = Triplets::with_capacity(n, n, events.len() + n);
        for (row, col, class) in events.iter() {
            let rate = self.susceptible[[row, class]] * force[class];
            if rate != 0. {
                triplets.push(row, col, rate);
            }
        }
        triplets.into_generator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContactMatrices, Parameters};
    use crate::core::CompositionList;
    use crate::model::{transition_rule, ConstantImportModel};

    fn contacts() -> ContactMatrices {
        ContactMatrices {
            k_home: vec![vec![1., 0.5], vec![0.5, 2.]],
            k_all: vec![vec![3., 1.5], vec![1., 4.]],
        }
    }

    fn equations(variant: ModelVariant, input: ModelInput) -> RateEquations {
        let list = CompositionList::from_counts(&[vec![0, 1], vec![1, 1]], vec![0.5, 0.5]).unwrap();
        let population =
            HouseholdPopulation::build(list, &input, transition_rule(variant), None).unwrap();
        RateEquations::new(input, Arc::new(population), 1.).unwrap()
    }

    fn sepir() -> RateEquations {
        let input = ModelInput::sepir(&Parameters::default(), &contacts()).unwrap();
        equations(ModelVariant::Sepir, input)
    }

    fn fully_susceptible(equations: &RateEquations) -> Vec<f64> {
        let population = equations.population();
        let mut h = vec![0.; population.len()];
        for (composition, weight) in population.composition_distribution().iter().enumerate() {
            h[population.offsets()[composition]] = *weight;
        }
        h
    }

    /// Spread the weight of every composition over all of its states.
    fn spread(equations: &RateEquations) -> Vec<f64> {
        let population = equations.population();
        let mut h: Vec<f64> = (0..population.len()).map(|idx| (idx % 7 + 1) as f64).collect();
        for (composition, window) in population.offsets().windows(2).enumerate() {
            let total: f64 = h[window[0]..window[1]].iter().sum();
            let weight = population.composition_distribution()[composition];
            h[window[0]..window[1]]
                .iter_mut()
                .for_each(|value| *value *= weight / total);
        }
        h
    }

    #[test]
    fn fully_susceptible_population_is_stationary() {
        let equations = sepir();
        let dh = equations.evaluate(0., &fully_susceptible(&equations)).unwrap();
        assert!(dh.iter().sum::<f64>().abs() < 1e-12);
        assert!(dh.iter().all(|value| value.abs() < 1e-12));
    }

    #[test]
    fn mass_is_conserved() {
        let equations = sepir();
        let h = spread(&equations);
        for t in [0., 1., 10.] {
            let dh = equations.evaluate(t, &h).unwrap();
            assert!(dh.iter().any(|value| value.abs() > 1e-6));
            // mass is conserved within each composition
            for window in equations.population().offsets().windows(2) {
                assert!(dh[window[0]..window[1]].iter().sum::<f64>().abs() < 1e-12);
            }
        }
    }

    #[test]
    fn nan_is_rejected() {
        let equations = sepir();
        let mut h = spread(&equations);
        h[3] = f64::NAN;
        assert!(matches!(
            equations.evaluate(0., &h),
            Err(HouseholdError::InvalidState(_))
        ));
        assert!(matches!(
            equations.evaluate(0., &h[1..]),
            Err(HouseholdError::InvalidState(_))
        ));
    }

    #[test]
    fn negative_entries_are_clamped() {
        let equations = sepir();
        let mut h = spread(&equations);
        h[7] = 0.;
        let expected = equations.evaluate(2., &h).unwrap();
        h[7] = -1e-12;
        let negative = h.clone();
        assert_eq!(equations.evaluate(2., &negative).unwrap(), expected);
        // the caller's vector is left untouched
        assert_eq!(negative[7], -1e-12);
    }

    #[test]
    fn empty_classes_do_not_produce_nan() {
        let equations = sepir();
        let h = vec![0.; equations.population().len()];
        let dh = equations.evaluate(0., &h).unwrap();
        assert!(dh.iter().all(|value| *value == 0.));
    }

    #[test]
    fn seir_mass_is_conserved() {
        let parameters = Parameters {
            density_exponent: 0.8,
            ..Default::default()
        };
        let input = ModelInput::seir(&parameters, &contacts()).unwrap();
        let equations = equations(ModelVariant::Seir, input);
        let dh = equations.evaluate(0.5, &spread(&equations)).unwrap();
        assert!(dh.iter().sum::<f64>().abs() < 1e-12);

        let force = equations
            .external_force(0., ArrayView1::from(&spread(&equations)))
            .unwrap();
        assert!(force.prodromal.is_none());
    }

    #[test]
    fn imports_seed_infection() {
        let input = ModelInput::sepir(&Parameters::default(), &contacts())
            .unwrap()
            .with_import_model(Arc::new(
                ConstantImportModel::new(vec![0.01, 0.02], vec![0.03, 0.]).unwrap(),
            ))
            .unwrap();
        let equations = equations(ModelVariant::Sepir, input);
        let h = fully_susceptible(&equations);
        let dh = equations.evaluate(0., &h).unwrap();

        let population = equations.population();
        for (composition, &start) in population.offsets()[..2].iter().enumerate() {
            assert!(dh[start] < 0., "composition {composition} loses susceptibles");
        }
        assert!(dh.iter().sum::<f64>().abs() < 1e-12);
    }

    #[test]
    fn mass_is_conserved_along_trajectory() {
        use crate::model::make_initial_condition;
        use crate::solver::{IvpSolver, Rk4Solver};

        let equations = sepir();
        let h0 = make_initial_condition(equations.population(), 1e-2).unwrap().to_vec();
        let solver = Rk4Solver::new(0.25, 4).unwrap();
        let mut rhs = |t: f64, h: &[f64]| equations.evaluate(t, h);
        let trajectory = solver.solve(&mut rhs, (0., 20.), &h0).unwrap();

        assert_eq!(trajectory.len(), 21);
        for (_, h) in trajectory.iter() {
            for (window, weight) in equations
                .population()
                .offsets()
                .windows(2)
                .zip(equations.population().composition_distribution())
            {
                let mass: f64 = h[window[0]..window[1]].iter().sum();
                assert!((mass - weight).abs() < 1e-10);
            }
        }
        // the epidemic has started
        let (_, last) = trajectory.last().unwrap();
        assert!(last[0] < h0[0]);
    }

    #[test]
    fn external_force_scales_with_epsilon() {
        let input = ModelInput::sepir(&Parameters::default(), &contacts()).unwrap();
        let full = equations(ModelVariant::Sepir, input.clone());
        let population = Arc::new(full.population().clone());
        let half = RateEquations::new(input, population, 0.5).unwrap();

        let h = Array1::from(spread(&full));
        let full_force = full.external_force(0., h.view()).unwrap();
        let half_force = half.external_force(0., h.view()).unwrap();
        for (a, b) in full_force.infectious.iter().zip(half_force.infectious.iter()) {
            assert!((a * 0.5 - b).abs() < 1e-15);
        }
    }
}
