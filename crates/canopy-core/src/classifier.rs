//! Classifier adapter.
//!
//! Wraps an externally supplied decision function. The adapter is stateless:
//! it neither retries nor caches, and it turns any failure of the decision
//! function into a [`ClassifierError`] for the caller to handle.

use crate::observation::{PairedObservation, Verdict};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Scores at or above this value are classified as good.
pub const GOOD_THRESHOLD: f64 = 0.5;

/// Classifier errors.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The decision function failed to evaluate.
    #[error("Decision function failed: {0}")]
    Evaluation(String),

    /// The decision function returned a score outside [0, 1].
    #[error("Invalid score: {0}")]
    InvalidScore(f64),
}

/// An opaque binary decision function.
///
/// Takes `[temperature, humidity]` and returns a score in [0, 1].
#[async_trait]
pub trait DecisionFunction: Send + Sync {
    /// Score one input vector.
    async fn score(&self, input: [f64; 2]) -> Result<f64, ClassifierError>;

    /// Name of the decision function, for logs.
    fn name(&self) -> &'static str;
}

/// Stateless adapter around a [`DecisionFunction`].
#[derive(Clone)]
pub struct Classifier {
    model: Arc<dyn DecisionFunction>,
}

impl Classifier {
    /// Create a classifier around a decision function.
    #[must_use]
    pub fn new(model: Arc<dyn DecisionFunction>) -> Self {
        debug!(model = model.name(), "Creating classifier");
        Self { model }
    }

    /// Name of the wrapped decision function.
    #[must_use]
    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Classify one observation.
    ///
    /// # Errors
    ///
    /// Returns an error if the decision function fails or returns a score
    /// that is not a finite value in [0, 1].
    pub async fn classify(&self, obs: &PairedObservation) -> Result<Verdict, ClassifierError> {
        let score = self.model.score(obs.features()).await.map_err(|e| {
            warn!(location = %obs.location, model = self.model.name(), error = %e, "Classification failed");
            e
        })?;

        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            warn!(location = %obs.location, score, "Decision function returned invalid score");
            return Err(ClassifierError::InvalidScore(score));
        }

        let verdict = Verdict {
            good: score >= GOOD_THRESHOLD,
            score,
        };
        debug!(location = %obs.location, score, good = verdict.good, "Classified observation");
        Ok(verdict)
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("model", &self.model.name())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Decision function returning a fixed score.
    pub struct FixedScore(pub f64);

    #[async_trait]
    impl DecisionFunction for FixedScore {
        async fn score(&self, _input: [f64; 2]) -> Result<f64, ClassifierError> {
            Ok(self.0)
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Decision function that always fails.
    pub struct Broken;

    #[async_trait]
    impl DecisionFunction for Broken {
        async fn score(&self, _input: [f64; 2]) -> Result<f64, ClassifierError> {
            Err(ClassifierError::Evaluation("tensor allocation failed".into()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Broken, FixedScore};
    use super::*;

    fn obs() -> PairedObservation {
        PairedObservation::new("kitchen", 22.0, 40.0)
    }

    #[tokio::test]
    async fn test_classify_good_and_bad() {
        let good = Classifier::new(Arc::new(FixedScore(0.9)));
        assert!(good.classify(&obs()).await.unwrap().good);

        let bad = Classifier::new(Arc::new(FixedScore(0.2)));
        let verdict = bad.classify(&obs()).await.unwrap();
        assert!(!verdict.good);
        assert_eq!(verdict.score, 0.2);
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let classifier = Classifier::new(Arc::new(FixedScore(GOOD_THRESHOLD)));
        assert!(classifier.classify(&obs()).await.unwrap().good);
    }

    #[tokio::test]
    async fn test_invalid_score() {
        for score in [1.5, -0.1, f64::NAN] {
            let classifier = Classifier::new(Arc::new(FixedScore(score)));
            assert!(matches!(
                classifier.classify(&obs()).await,
                Err(ClassifierError::InvalidScore(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_evaluation_failure() {
        let classifier = Classifier::new(Arc::new(Broken));
        assert_eq!(classifier.model_name(), "broken");
        assert!(matches!(
            classifier.classify(&obs()).await,
            Err(ClassifierError::Evaluation(_))
        ));
    }
}
