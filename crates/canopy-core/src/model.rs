//! Built-in decision functions.
//!
//! [`DenseModel`] evaluates a small feed-forward network exported as JSON
//! weights. [`ComfortBand`] is the labelling rule such a network is trained
//! to approximate and serves when no weights are available.

use crate::classifier::{ClassifierError, DecisionFunction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Number of inputs every model takes: temperature and humidity.
pub const INPUT_DIM: usize = 2;

/// Model loading errors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The weights file could not be read.
    #[error("Failed to read model file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The weights file is not valid JSON for a model.
    #[error("Failed to parse model: {0}")]
    Parse(#[from] serde_json::Error),

    /// Layer dimensions do not chain from 2 inputs to 1 output.
    #[error("Invalid model shape: {0}")]
    Shape(String),
}

/// Layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// `max(0, x)`.
    Relu,
    /// Logistic function.
    Sigmoid,
    /// Identity.
    Linear,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Linear => x,
        }
    }
}

/// Standard-score normalisation applied to the inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct Scaler {
    /// Per-input mean subtracted first.
    pub mean: [f64; INPUT_DIM],
    /// Per-input divisor applied after centering.
    pub scale: [f64; INPUT_DIM],
}

/// One fully connected layer.
///
/// `weights` is indexed `[input][output]`.
#[derive(Debug, Clone, Deserialize)]
pub struct DenseLayer {
    /// Weight matrix, one row per input.
    pub weights: Vec<Vec<f64>>,
    /// Bias per output.
    pub bias: Vec<f64>,
    /// Activation applied to every output.
    pub activation: Activation,
}

impl DenseLayer {
    fn input_dim(&self) -> usize {
        self.weights.len()
    }

    fn output_dim(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut output = self.bias.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (out, w) in output.iter_mut().zip(row) {
                *out += x * w;
            }
        }
        for out in &mut output {
            *out = self.activation.apply(*out);
        }
        output
    }
}

/// A feed-forward network with a single sigmoid-style output.
#[derive(Debug, Clone, Deserialize)]
pub struct DenseModel {
    #[serde(default)]
    scaler: Option<Scaler>,
    layers: Vec<DenseLayer>,
}

impl DenseModel {
    /// Load a model from a JSON weights file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json(&contents)?;
        info!(path = %path.display(), layers = model.layers.len(), "Loaded dense model");
        Ok(model)
    }

    /// Parse and validate a model from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the shapes do not chain.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: DenseModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::Shape("model has no layers".into()));
        }

        let mut expected = INPUT_DIM;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.input_dim() != expected {
                return Err(ModelError::Shape(format!(
                    "layer {i} expects {} inputs, previous layer produces {expected}",
                    layer.input_dim()
                )));
            }
            if let Some(row) = layer.weights.iter().find(|r| r.len() != layer.output_dim()) {
                return Err(ModelError::Shape(format!(
                    "layer {i} has a weight row of width {}, bias has {}",
                    row.len(),
                    layer.output_dim()
                )));
            }
            expected = layer.output_dim();
        }

        if expected != 1 {
            return Err(ModelError::Shape(format!(
                "final layer produces {expected} outputs, expected 1"
            )));
        }
        Ok(())
    }

    /// Run the network on one input vector.
    #[must_use]
    pub fn evaluate(&self, input: [f64; INPUT_DIM]) -> f64 {
        let mut activations: Vec<f64> = match &self.scaler {
            Some(scaler) => input
                .iter()
                .zip(scaler.mean.iter().zip(&scaler.scale))
                .map(|(x, (mean, scale))| (x - mean) / scale)
                .collect(),
            None => input.to_vec(),
        };

        for layer in &self.layers {
            activations = layer.forward(&activations);
        }
        activations.first().copied().unwrap_or(f64::NAN)
    }
}

#[async_trait]
impl DecisionFunction for DenseModel {
    async fn score(&self, input: [f64; 2]) -> Result<f64, ClassifierError> {
        let score = self.evaluate(input);
        if score.is_nan() {
            return Err(ClassifierError::Evaluation("network produced NaN".into()));
        }
        Ok(score)
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}

/// Rule-based decision function: good inside a temperature and humidity band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComfortBand {
    #[serde(default = "default_min_temperature")]
    pub min_temperature: f64,
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f64,
    #[serde(default = "default_min_humidity")]
    pub min_humidity: f64,
    #[serde(default = "default_max_humidity")]
    pub max_humidity: f64,
}

fn default_min_temperature() -> f64 {
    20.0
}

fn default_max_temperature() -> f64 {
    25.0
}

fn default_min_humidity() -> f64 {
    30.0
}

fn default_max_humidity() -> f64 {
    50.0
}

impl Default for ComfortBand {
    fn default() -> Self {
        Self {
            min_temperature: default_min_temperature(),
            max_temperature: default_max_temperature(),
            min_humidity: default_min_humidity(),
            max_humidity: default_max_humidity(),
        }
    }
}

impl ComfortBand {
    /// Check whether a reading pair falls inside the band.
    #[must_use]
    pub fn contains(&self, temperature: f64, humidity: f64) -> bool {
        (self.min_temperature..=self.max_temperature).contains(&temperature)
            && (self.min_humidity..=self.max_humidity).contains(&humidity)
    }
}

#[async_trait]
impl DecisionFunction for ComfortBand {
    async fn score(&self, input: [f64; 2]) -> Result<f64, ClassifierError> {
        let [temperature, humidity] = input;
        Ok(if self.contains(temperature, humidity) {
            1.0
        } else {
            0.0
        })
    }

    fn name(&self) -> &'static str {
        "comfort-band"
    }
}
