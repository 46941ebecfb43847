//! Feed-forward network inference
//!
//! Layers run in file order. Batch normalisation uses the stored running
//! statistics (evaluation mode) and dropout is not represented at all. The
//! network predicts a rating in 0..1 which is scaled by `output_scale`
//! (100 by default) for reporting.

use serde::{Deserialize, Serialize};

use super::{Features, RegressionModel};
use crate::error::{AnalysisError, Result};

fn default_epsilon() -> f64 {
    1e-5
}

fn default_output_scale() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// `y = W x + b`, `weights` is row-major with one row per output
    Dense { weights: Vec<Vec<f64>>, bias: Vec<f64> },
    BatchNorm {
        mean: Vec<f64>,
        variance: Vec<f64>,
        gamma: Vec<f64>,
        beta: Vec<f64>,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
    Relu,
    Sigmoid,
    Identity,
}

impl Layer {
    /// Output width for an input of `width`, or why the layer cannot take it
    fn output_width(&self, width: usize) -> std::result::Result<usize, String> {
        match self {
            Layer::Dense { weights, bias } => {
                if weights.len() != bias.len() {
                    return Err(format!(
                        "dense layer has {} rows but {} biases",
                        weights.len(),
                        bias.len()
                    ));
                }
                if let Some(row) = weights.iter().find(|r| r.len() != width) {
                    return Err(format!(
                        "dense row of width {} cannot take {} inputs",
                        row.len(),
                        width
                    ));
                }
                Ok(weights.len())
            }
            Layer::BatchNorm {
                mean,
                variance,
                gamma,
                beta,
                ..
            } => {
                if [mean.len(), variance.len(), gamma.len(), beta.len()]
                    .iter()
                    .any(|&n| n != width)
                {
                    return Err(format!("batch norm statistics do not match width {}", width));
                }
                Ok(width)
            }
            Layer::Relu | Layer::Sigmoid | Layer::Identity => Ok(width),
        }
    }

    fn forward(&self, x: Vec<f64>) -> Vec<f64> {
        match self {
            Layer::Dense { weights, bias } => weights
                .iter()
                .zip(bias)
                .map(|(row, b)| row.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>() + b)
                .collect(),
            Layer::BatchNorm {
                mean,
                variance,
                gamma,
                beta,
                epsilon,
            } => x
                .iter()
                .enumerate()
                .map(|(i, v)| (v - mean[i]) / (variance[i] + epsilon).sqrt() * gamma[i] + beta[i])
                .collect(),
            Layer::Relu => x.into_iter().map(|v| v.max(0.0)).collect(),
            Layer::Sigmoid => x.into_iter().map(|v| 1.0 / (1.0 + (-v).exp())).collect(),
            Layer::Identity => x,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpModel {
    /// Feature names in network input order
    pub inputs: Vec<String>,
    pub layers: Vec<Layer>,
    #[serde(default = "default_output_scale")]
    pub output_scale: f64,
}

impl MlpModel {
    /// Check that layer widths chain from the inputs to a single output
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(AnalysisError::config("network has no inputs"));
        }
        let mut width = self.inputs.len();
        for (i, layer) in self.layers.iter().enumerate() {
            width = layer
                .output_width(width)
                .map_err(|e| AnalysisError::config(format!("layer {}: {}", i, e)))?;
        }
        if width != 1 {
            return Err(AnalysisError::config(format!(
                "network must end in one output, ends in {}",
                width
            )));
        }
        Ok(())
    }

    /// Raw network output for an input vector
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.inputs.len() {
            return Err(AnalysisError::invalid(format!(
                "network takes {} inputs, got {}",
                self.inputs.len(),
                input.len()
            )));
        }
        self.validate()?;
        Ok(self
            .layers
            .iter()
            .fold(input.to_vec(), |x, layer| layer.forward(x)))
    }
}

impl RegressionModel for MlpModel {
    fn predict(&self, features: &Features) -> Result<f64> {
        let input = features.select(&self.inputs)?;
        let output = self.forward(&input)?;
        output
            .first()
            .map(|y| y * self.output_scale)
            .ok_or_else(|| AnalysisError::config("network produced no output"))
    }
}
