//! Model input
//!
//! `ModelInput` bundles everything the transition rules and the rate equations need to know about
//! the epidemic: contact intensities within and between households, per-class susceptibility and
//! prodromal infectiousness, the transition rates and the import model. Inputs are plain data;
//! the constructors below derive them from `Parameters` for each model variant.

use ndarray::{Array1, Array2};
use std::sync::Arc;

use super::imports::{ImportModel, NoImportModel};
use crate::config::{ContactMatrices, Parameters};
use crate::core::ModelVariant;
use crate::errors::{HouseholdError, Result};

const POWER_ITERATIONS: usize = 10_000;
const POWER_TOLERANCE: f64 = 1e-13;

#[derive(Clone, Debug)]
pub struct ModelInput {
    /// Contact intensities within the household.
    pub k_home: Array2<f64>,
    /// Contact intensities with the rest of the population.
    pub k_ext: Array2<f64>,
    /// Relative susceptibility per class.
    pub sus: Array1<f64>,
    /// Relative prodromal infectiousness per class (SEPIR only).
    pub tau: Option<Array1<f64>>,
    /// Exposed to prodromal (SEPIR) or exposed to infectious (SEIR) rate.
    pub alpha_1: f64,
    /// Prodromal to infectious rate (SEPIR only).
    pub alpha_2: Option<f64>,
    /// Recovery rate.
    pub gamma: f64,
    /// Exponent of the class occupancy in the within-household denominator (SEIR only).
    pub density_exponent: f64,
    pub import_model: Arc<dyn ImportModel>,
}

impl ModelInput {
    /// Multi-class SEPIR input.
    ///
    /// The household contact matrix is rescaled so the household next generation matrix has
    /// spectral radius `r_int`. External contacts are `k_all - k_home`, rescaled to spectral
    /// radius `r_int * external_trans_scaling`.
    pub fn sepir(parameters: &Parameters, contacts: &ContactMatrices) -> Result<Self> {
        let (k_home, k_all) = contact_arrays(contacts)?;
        check_length("sus", &parameters.sus, k_home.nrows())?;
        check_length(
            "prodromal_trans_scaling",
            prodromal_scaling(parameters)?,
            k_home.nrows(),
        )?;
        let k_ext = external_contacts(&k_home, &k_all);
        let sus = Array1::from(parameters.sus.clone());
        let tau = Array1::from(prodromal_scaling(parameters)?.clone());
        let alpha_2 = symptom_onset_rate(parameters)?;
        let gamma = parameters.recovery_rate;

        // expected infectious time per case, by class of the case
        let exposure = tau.mapv(|tau| tau / alpha_2 + 1. / gamma);
        let home_eig = dominant_eigenvalue(&next_generation(&sus, &k_home, &exposure));
        let ext_eig = dominant_eigenvalue(&next_generation(&sus, &k_ext, &exposure));

        let input = Self {
            k_home: rescale(k_home, parameters.r_int, home_eig),
            k_ext: rescale(
                k_ext,
                parameters.r_int * parameters.external_trans_scaling,
                ext_eig,
            ),
            import_model: Arc::new(NoImportModel::new(sus.len())),
            sus,
            tau: Some(tau),
            alpha_1: parameters.incubation_rate,
            alpha_2: Some(alpha_2),
            gamma,
            density_exponent: 1.,
        };
        input.validate(ModelVariant::Sepir)?;
        Ok(input)
    }

    /// Multi-class SEIR input, normalised like `ModelInput::sepir` without the prodromal period.
    pub fn seir(parameters: &Parameters, contacts: &ContactMatrices) -> Result<Self> {
        let (k_home, k_all) = contact_arrays(contacts)?;
        check_length("sus", &parameters.sus, k_home.nrows())?;
        let k_ext = external_contacts(&k_home, &k_all);
        let sus = Array1::from(parameters.sus.clone());
        let exposure = Array1::from_elem(sus.len(), 1. / parameters.recovery_rate);
        let home_eig = dominant_eigenvalue(&next_generation(&sus, &k_home, &exposure));
        let ext_eig = dominant_eigenvalue(&next_generation(&sus, &k_ext, &exposure));

        let input = Self {
            k_home: rescale(k_home, parameters.r_int, home_eig),
            k_ext: rescale(
                k_ext,
                parameters.r_int * parameters.external_trans_scaling,
                ext_eig,
            ),
            import_model: Arc::new(NoImportModel::new(sus.len())),
            sus,
            tau: None,
            alpha_1: parameters.incubation_rate,
            alpha_2: None,
            gamma: parameters.recovery_rate,
            density_exponent: parameters.density_exponent,
        };
        input.validate(ModelVariant::Seir)?;
        Ok(input)
    }

    /// Single class SEPIR input with `k_home = r_int` and `k_ext = r_int * external_trans_scaling`.
    pub fn single_class_sepir(parameters: &Parameters) -> Result<Self> {
        let tau = prodromal_scaling(parameters)?;
        let input = Self {
            k_home: Array2::from_elem((1, 1), parameters.r_int),
            k_ext: Array2::from_elem(
                (1, 1),
                parameters.r_int * parameters.external_trans_scaling,
            ),
            sus: Array1::from(parameters.sus.clone()),
            tau: Some(Array1::from(tau.clone())),
            alpha_1: parameters.incubation_rate,
            alpha_2: Some(symptom_onset_rate(parameters)?),
            gamma: parameters.recovery_rate,
            density_exponent: 1.,
            import_model: Arc::new(NoImportModel::new(1)),
        };
        input.validate(ModelVariant::Sepir)?;
        Ok(input)
    }

    /// Single class SEIR input splitting `r_int * recovery_rate` between household and external
    /// contacts according to `external_trans_scaling`.
    pub fn single_class_seir(parameters: &Parameters) -> Result<Self> {
        let beta = parameters.r_int * parameters.recovery_rate;
        let input = Self {
            k_home: Array2::from_elem((1, 1), beta * (1. - parameters.external_trans_scaling)),
            k_ext: Array2::from_elem((1, 1), beta * parameters.external_trans_scaling),
            sus: Array1::from(parameters.sus.clone()),
            tau: None,
            alpha_1: parameters.incubation_rate,
            alpha_2: None,
            gamma: parameters.recovery_rate,
            density_exponent: parameters.density_exponent,
            import_model: Arc::new(NoImportModel::new(1)),
        };
        input.validate(ModelVariant::Seir)?;
        Ok(input)
    }

    /// Build the input for `variant`, using single class contacts when `contacts` is `None`.
    pub fn from_parameters(
        variant: ModelVariant,
        parameters: &Parameters,
        contacts: Option<&ContactMatrices>,
    ) -> Result<Self> {
        match (variant, contacts) {
            (ModelVariant::Sepir, Some(contacts)) => Self::sepir(parameters, contacts),
            (ModelVariant::Seir, Some(contacts)) => Self::seir(parameters, contacts),
            (ModelVariant::Sepir, None) => Self::single_class_sepir(parameters),
            (ModelVariant::Seir, None) => Self::single_class_seir(parameters),
        }
    }

    /// Replace the import model.
    pub fn with_import_model(mut self, import_model: Arc<dyn ImportModel>) -> Result<Self> {
        if import_model.n_classes() != self.n_classes() {
            return Err(HouseholdError::InitializationError(format!(
                "Import model covers {} classes instead of {}",
                import_model.n_classes(),
                self.n_classes()
            )));
        }
        self.import_model = import_model;
        Ok(self)
    }

    pub fn n_classes(&self) -> usize {
        self.sus.len()
    }

    /// Check that every field is consistent with the number of classes and `variant`.
    pub fn validate(&self, variant: ModelVariant) -> Result<()> {
        let n_classes = self.n_classes();
        let square = (n_classes, n_classes);
        if self.k_home.dim() != square || self.k_ext.dim() != square {
            return Err(HouseholdError::InitializationError(format!(
                "Contact matrices have shapes {:?} and {:?} for {n_classes} classes",
                self.k_home.dim(),
                self.k_ext.dim()
            )));
        }
        if self
            .k_home
            .iter()
            .chain(self.k_ext.iter())
            .chain(self.sus.iter())
            .any(|v| !v.is_finite() || *v < 0.)
        {
            return Err(HouseholdError::InitializationError(
                "Contact intensities and susceptibilities must be finite and non-negative"
                    .to_string(),
            ));
        }
        if self.import_model.n_classes() != n_classes {
            return Err(HouseholdError::InitializationError(format!(
                "Import model covers {} classes instead of {n_classes}",
                self.import_model.n_classes()
            )));
        }
        for (name, rate) in [("alpha_1", self.alpha_1), ("gamma", self.gamma)] {
            check_rate(name, rate)?;
        }
        if !self.density_exponent.is_finite() {
            return Err(HouseholdError::InitializationError(format!(
                "Invalid density exponent {}",
                self.density_exponent
            )));
        }

        if variant == ModelVariant::Sepir {
            match (&self.tau, self.alpha_2) {
                (Some(tau), Some(alpha_2)) if tau.len() == n_classes => {
                    check_rate("alpha_2", alpha_2)?;
                }
                (Some(tau), Some(_)) => {
                    return Err(HouseholdError::InitializationError(format!(
                        "Prodromal scaling has {} entries for {n_classes} classes",
                        tau.len()
                    )));
                }
                _ => {
                    return Err(HouseholdError::InitializationError(
                        "SEPIR input needs a prodromal scaling and a symptom onset rate"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn check_rate(name: &str, rate: f64) -> Result<()> {
    if !rate.is_finite() || rate <= 0. {
        return Err(HouseholdError::InitializationError(format!(
            "Rate {name} must be positive, got {rate}"
        )));
    }
    Ok(())
}

fn check_length(name: &str, values: &[f64], n_classes: usize) -> Result<()> {
    if values.len() != n_classes {
        return Err(HouseholdError::InitializationError(format!(
            "{name} has {} entries for {n_classes} classes",
            values.len()
        )));
    }
    Ok(())
}

fn prodromal_scaling(parameters: &Parameters) -> Result<&Vec<f64>> {
    parameters.prodromal_trans_scaling.as_ref().ok_or_else(|| {
        HouseholdError::InitializationError("Missing prodromal_trans_scaling".to_string())
    })
}

fn symptom_onset_rate(parameters: &Parameters) -> Result<f64> {
    parameters
        .symp_onset_rate
        .ok_or_else(|| HouseholdError::InitializationError("Missing symp_onset_rate".to_string()))
}

fn contact_arrays(contacts: &ContactMatrices) -> Result<(Array2<f64>, Array2<f64>)> {
    let k_home = to_array(&contacts.k_home)?;
    let k_all = to_array(&contacts.k_all)?;
    if k_home.dim() != k_all.dim() {
        return Err(HouseholdError::InitializationError(format!(
            "Household contacts {:?} and total contacts {:?} differ in shape",
            k_home.dim(),
            k_all.dim()
        )));
    }
    Ok((k_home, k_all))
}

fn to_array(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let n = rows.len();
    if rows.iter().any(|row| row.len() != n) {
        return Err(HouseholdError::InitializationError(
            "Contact matrices must be square".to_string(),
        ));
    }
    if rows.iter().flatten().any(|v| !v.is_finite() || *v < 0.) {
        return Err(HouseholdError::InitializationError(
            "Contact intensities must be finite and non-negative".to_string(),
        ));
    }
    Array2::from_shape_vec((n, n), rows.concat())
        .map_err(|err| HouseholdError::InitializationError(format!("{err}")))
}

/// Contacts outside the household. Negative differences are truncated.
fn external_contacts(k_home: &Array2<f64>, k_all: &Array2<f64>) -> Array2<f64> {
    (k_all - k_home).mapv(|v| v.max(0.))
}

/// `diag(sus) · k · diag(exposure)`
fn next_generation(sus: &Array1<f64>, k: &Array2<f64>, exposure: &Array1<f64>) -> Array2<f64> {
    let mut ngm = k.clone();
    for ((i, j), value) in ngm.indexed_iter_mut() {
        *value *= sus[i] * exposure[j];
    }
    ngm
}

fn rescale(k: Array2<f64>, target: f64, eigenvalue: f64) -> Array2<f64> {
    if eigenvalue > 0. {
        k * (target / eigenvalue)
    } else {
        k
    }
}

/// Spectral radius of a non-negative square matrix by power iteration.
///
/// Iterates on `A + I`, which has the same dominant eigenvector and does not oscillate on
/// periodic matrices.
pub fn dominant_eigenvalue(matrix: &Array2<f64>) -> f64 {
    let n = matrix.nrows();
    if n == 0 {
        return 0.;
    }
    let shifted = matrix + &Array2::<f64>::eye(n);
    let mut vector = Array1::from_elem(n, 1. / n as f64);
    let mut eigenvalue = 0.;

    for _ in 0..POWER_ITERATIONS {
        let next = shifted.dot(&vector);
        let norm: f64 = next.iter().map(|v| v.abs()).sum();
        let estimate = norm / vector.iter().map(|v| v.abs()).sum::<f64>();
        vector = next / norm;
        if (estimate - eigenvalue).abs() <= POWER_TOLERANCE * estimate.abs() {
            eigenvalue = estimate;
            break;
        }
        eigenvalue = estimate;
    }
    (eigenvalue - 1.).max(0.)
}
