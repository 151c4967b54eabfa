//! Background infection pressure from outside the modelled population.
//!
//! An import model supplies, at every time, a per-class force of infection that is added to the
//! population average before contacts are applied. `detected` feeds the prodromal channel and
//! `undetected` the infectious channel of the rate equations.

use evalexpr::{ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, Node, Value};
use ndarray::Array1;
use std::fmt;

use crate::errors::{HouseholdError, Result};

pub trait ImportModel: Send + Sync + fmt::Debug {
    /// Number of classes of the returned vectors.
    fn n_classes(&self) -> usize;

    /// Imported pressure acting through the prodromal channel.
    fn detected(&self, t: f64) -> Result<Array1<f64>>;

    /// Imported pressure acting through the infectious channel.
    fn undetected(&self, t: f64) -> Result<Array1<f64>>;
}

/// No infection from outside the population.
#[derive(Clone, Debug, PartialEq)]
pub struct NoImportModel {
    n_classes: usize,
}

impl NoImportModel {
    pub fn new(n_classes: usize) -> Self {
        Self { n_classes }
    }
}

impl ImportModel for NoImportModel {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn detected(&self, _t: f64) -> Result<Array1<f64>> {
        Ok(Array1::zeros(self.n_classes))
    }

    fn undetected(&self, _t: f64) -> Result<Array1<f64>> {
        Ok(Array1::zeros(self.n_classes))
    }
}

/// Time independent import pressure.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantImportModel {
    detected: Array1<f64>,
    undetected: Array1<f64>,
}

impl ConstantImportModel {
    pub fn new(detected: Vec<f64>, undetected: Vec<f64>) -> Result<Self> {
        if detected.len() != undetected.len() {
            return Err(HouseholdError::InitializationError(format!(
                "Import pressure has {} detected and {} undetected classes",
                detected.len(),
                undetected.len()
            )));
        }
        if let Some(value) = detected
            .iter()
            .chain(undetected.iter())
            .find(|v| !v.is_finite() || **v < 0.)
        {
            return Err(HouseholdError::InitializationError(format!(
                "Invalid import pressure {value}"
            )));
        }
        Ok(Self {
            detected: Array1::from(detected),
            undetected: Array1::from(undetected),
        })
    }
}

impl ImportModel for ConstantImportModel {
    fn n_classes(&self) -> usize {
        self.detected.len()
    }

    fn detected(&self, _t: f64) -> Result<Array1<f64>> {
        Ok(self.detected.clone())
    }

    fn undetected(&self, _t: f64) -> Result<Array1<f64>> {
        Ok(self.undetected.clone())
    }
}

/// Import pressure given by one arithmetic expression in `t` per class.
///
/// Expressions are parsed once on construction and may only read the variable `t`. Their values
/// are checked at evaluation time, so `1 / t` is accepted and fails only when evaluated at zero.
#[derive(Clone)]
pub struct ExpressionImportModel {
    sources: (Vec<String>, Vec<String>),
    detected: Vec<Node>,
    undetected: Vec<Node>,
}

impl fmt::Debug for ExpressionImportModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionImportModel")
            .field("detected", &self.sources.0)
            .field("undetected", &self.sources.1)
            .finish()
    }
}

impl ExpressionImportModel {
    pub fn new(detected: Vec<String>, undetected: Vec<String>) -> Result<Self> {
        if detected.len() != undetected.len() {
            return Err(HouseholdError::InitializationError(format!(
                "Import expressions cover {} detected and {} undetected classes",
                detected.len(),
                undetected.len()
            )));
        }
        let model = Self {
            detected: parse_expressions(&detected)?,
            undetected: parse_expressions(&undetected)?,
            sources: (detected, undetected),
        };
        Ok(model)
    }

    fn evaluate(nodes: &[Node], t: f64) -> Result<Array1<f64>> {
        let mut context = HashMapContext::<DefaultNumericTypes>::new();
        context
            .set_value("t".to_string(), Value::Float(t))
            .map_err(|err| HouseholdError::InitializationError(format!("{err}")))?;

        nodes
            .iter()
            .map(|node| {
                let value = node.eval_number_with_context(&context).map_err(|err| {
                    HouseholdError::InitializationError(format!(
                        "Unable to evaluate import expression at t={t}: {err}"
                    ))
                })?;
                if !value.is_finite() || value < 0. {
                    return Err(HouseholdError::InitializationError(format!(
                        "Import expression evaluates to {value} at t={t}"
                    )));
                }
                Ok(value)
            })
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from)
    }
}

fn parse_expressions(expressions: &[String]) -> Result<Vec<Node>> {
    expressions
        .iter()
        .map(|expression| {
            let node = evalexpr::build_operator_tree::<DefaultNumericTypes>(expression)
                .map_err(|err| {
                    HouseholdError::InitializationError(format!(
                        "Invalid import expression `{expression}`: {err}"
                    ))
                })?;
            if let Some(identifier) = node.iter_variable_identifiers().find(|&id| id != "t") {
                return Err(HouseholdError::InitializationError(format!(
                    "Import expression `{expression}` reads unknown variable `{identifier}`"
                )));
            }
            Ok(node)
        })
        .collect()
}

impl ImportModel for ExpressionImportModel {
    fn n_classes(&self) -> usize {
        self.detected.len()
    }

    fn detected(&self, t: f64) -> Result<Array1<f64>> {
        Self::evaluate(&self.detected, t)
    }

    fn undetected(&self, t: f64) -> Result<Array1<f64>> {
        Self::evaluate(&self.undetected, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_imports() {
        let model = NoImportModel::new(3);
        assert_eq!(model.detected(4.).unwrap(), Array1::<f64>::zeros(3));
        assert_eq!(model.undetected(0.).unwrap(), Array1::<f64>::zeros(3));
    }

    #[test]
    fn constant_imports() {
        let model = ConstantImportModel::new(vec![0.1, 0.2], vec![0.3, 0.]).unwrap();
        assert_eq!(model.n_classes(), 2);
        assert_eq!(model.undetected(10.).unwrap().to_vec(), vec![0.3, 0.]);
        assert!(ConstantImportModel::new(vec![0.1], vec![0.3, 0.]).is_err());
        assert!(ConstantImportModel::new(vec![-0.1], vec![0.3]).is_err());
    }

    #[test]
    fn expression_imports() {
        let model = ExpressionImportModel::new(
            vec!["0.001 * t".to_string(), "0".to_string()],
            vec!["2 * 0.5".to_string(), "t / 4".to_string()],
        )
        .unwrap();
        let detected = model.detected(2.).unwrap();
        assert!((detected[0] - 0.002).abs() < 1e-15);
        assert_eq!(detected[1], 0.);
        assert_eq!(model.undetected(2.).unwrap().to_vec(), vec![1., 0.5]);
    }

    #[test]
    fn invalid_expressions() {
        assert!(ExpressionImportModel::new(vec!["0.1 *".to_string()], vec!["0".to_string()])
            .is_err());
        assert!(ExpressionImportModel::new(vec!["s".to_string()], vec!["0".to_string()])
            .is_err());

        // negative values are reported when evaluated
        let negative =
            ExpressionImportModel::new(vec!["-1".to_string()], vec!["0".to_string()]).unwrap();
        assert!(negative.detected(0.).is_err());
    }

    #[test]
    fn expressions_singular_at_zero() {
        let model = ExpressionImportModel::new(
            vec!["1 / t".to_string()],
            vec!["max(t - 5, 0)".to_string()],
        )
        .unwrap();
        assert_eq!(model.detected(2.).unwrap().to_vec(), vec![0.5]);
        assert!(model.detected(0.).is_err());
        assert_eq!(model.undetected(3.).unwrap().to_vec(), vec![0.]);
        assert_eq!(model.undetected(7.).unwrap().to_vec(), vec![2.]);
    }
}
