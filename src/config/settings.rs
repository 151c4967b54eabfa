//! Settings module.

use super::parameters::{ContactMatrices, Parameters};

use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;

use crate::core::{CompositionList, ModelVariant};
use crate::errors::Result as HouseholdResult;
use crate::model::{ConstantImportModel, ExpressionImportModel, ImportModel, NoImportModel};
use crate::readwrite::CompositionIO;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: ModelVariant,
    pub parameters: Parameters,
    /// Contact matrices between classes. Single class models leave this out.
    #[serde(default)]
    pub contacts: Option<ContactMatrices>,
    pub households: HouseholdSource,
    #[serde(default)]
    pub imports: ImportSettings,
    /// Scaling of the population average before it drives infection between households.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    pub initial: InitialSettings,
    pub solver: SolverSettings,
}

fn default_epsilon() -> f64 {
    1.
}

/// Where the household compositions come from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum HouseholdSource {
    /// Class counts per composition. Negative counts are reported as malformed compositions.
    Inline {
        compositions: Vec<Vec<i64>>,
        distribution: Vec<f64>,
    },
    File {
        path: String,
    },
}

impl HouseholdSource {
    pub fn load(&self) -> HouseholdResult<CompositionList> {
        match self {
            HouseholdSource::Inline {
                compositions,
                distribution,
            } => CompositionList::from_counts(compositions, distribution.clone()),
            HouseholdSource::File { path } => CompositionList::read(path),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "type")]
pub enum ImportSettings {
    #[default]
    None,
    Constant {
        detected: Vec<f64>,
        undetected: Vec<f64>,
    },
    /// One expression in `t` per class.
    Expression {
        detected: Vec<String>,
        undetected: Vec<String>,
    },
}

impl ImportSettings {
    pub fn build(&self, n_classes: usize) -> HouseholdResult<Arc<dyn ImportModel>> {
        Ok(match self {
            ImportSettings::None => Arc::new(NoImportModel::new(n_classes)),
            ImportSettings::Constant {
                detected,
                undetected,
            } => Arc::new(ConstantImportModel::new(
                detected.clone(),
                undetected.clone(),
            )?),
            ImportSettings::Expression {
                detected,
                undetected,
            } => Arc::new(ExpressionImportModel::new(
                detected.clone(),
                undetected.clone(),
            )?),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InitialSettings {
    pub prevalence: f64,
    /// Seeds households that went through an outbreak already, together with `attack_ratio`.
    #[serde(default)]
    pub seroprevalence: Option<f64>,
    #[serde(default)]
    pub attack_ratio: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SolverSettings {
    pub t_end: f64,
    pub step: f64,
    #[serde(default = "default_output_every")]
    pub output_every: usize,
}

fn default_output_every() -> usize {
    1
}

#[derive(Debug)]
pub enum SettingsError {
    IoError(std::io::Error),
    YamlError(serde_yaml::Error),
}

impl std::error::Error for SettingsError {}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::IoError(error) => write!(formatter, "IO error: {}", error),
            SettingsError::YamlError(error) => write!(formatter, "YAML error: {}", error),
        }
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut output = vec![];
        self.write(&mut output).map_err(|_| std::fmt::Error)?;
        write!(
            formatter,
            "{}",
            String::from_utf8(output).map_err(|_| std::fmt::Error)?
        )
    }
}

impl Settings {
    pub fn write(&self, writer: &mut dyn std::io::Write) -> Result<(), SettingsError> {
        serde_yaml::to_writer(writer, self).map_err(SettingsError::YamlError)
    }

    pub fn read(reader: &mut dyn std::io::Read) -> Result<Settings, SettingsError> {
        serde_yaml::from_reader(reader).map_err(SettingsError::YamlError)
    }

    pub fn write_to_file(&self, filename: &str) -> Result<(), SettingsError> {
        let file = fs::File::create(filename).map_err(SettingsError::IoError)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write(&mut writer)
    }

    pub fn read_from_file(filename: &str) -> Result<Settings, SettingsError> {
        let file = fs::File::open(filename).map_err(SettingsError::IoError)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read(&mut reader)
    }
}
