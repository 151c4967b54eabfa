use serde::{Deserialize, Serialize};

/// Epidemiological parameters of the household model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Within-household reproduction ratio used to normalise the household contact matrix.
    pub r_int: f64,

    /// Rate of leaving the infectious compartment.
    pub recovery_rate: f64,

    /// Rate of leaving the exposed compartment.
    pub incubation_rate: f64,

    /// Rate of moving from prodromal to infectious. Only used by the SEPIR model.
    #[serde(default)]
    pub symp_onset_rate: Option<f64>,

    /// Infectiousness of prodromal relative to infectious individuals, per class. Only used by
    /// the SEPIR model.
    #[serde(default)]
    pub prodromal_trans_scaling: Option<Vec<f64>>,

    /// Relative susceptibility of each class.
    pub sus: Vec<f64>,

    /// Intensity of contacts outside the household relative to contacts within.
    pub external_trans_scaling: f64,

    /// Exponent of the household size in the within-household transmission denominator. Only
    /// used by the SEIR model; `1` is frequency dependent mixing.
    #[serde(default = "default_density_exponent")]
    pub density_exponent: f64,
}

fn default_density_exponent() -> f64 {
    1.
}

impl Default for Parameters {
    /// Two class parameters with a 1 day prodrome and a 4 day symptomatic period.
    fn default() -> Self {
        Self {
            r_int: 1.1,
            recovery_rate: 1. / 4.,
            incubation_rate: 1. / 5.,
            symp_onset_rate: Some(1.),
            prodromal_trans_scaling: Some(vec![0.5, 0.5]),
            sus: vec![1., 1.],
            external_trans_scaling: 1.5,
            density_exponent: default_density_exponent(),
        }
    }
}

/// Contact intensities between classes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContactMatrices {
    /// Contacts within the household.
    pub k_home: Vec<Vec<f64>>,
    /// All contacts, within and outside the household.
    pub k_all: Vec<Vec<f64>>,
}
