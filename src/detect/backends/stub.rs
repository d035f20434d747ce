use anyhow::{anyhow, Result};

use crate::batch::Batch;
use crate::detect::backend::{DetectorBackend, InputSpec};
use crate::detect::result::RawDetection;

/// Stub backend for testing and dry runs.
///
/// Every slot of every batch gets the same fixed detection list (empty by
/// default), so runs through it exercise the whole pipeline without a model.
pub struct StubBackend {
    input: InputSpec,
    detections: Vec<RawDetection>,
    batches_seen: u64,
}

impl StubBackend {
    pub fn new(input: InputSpec) -> Self {
        Self {
            input,
            detections: Vec::new(),
            batches_seen: 0,
        }
    }

    /// Return `detections` for every frame.
    pub fn with_detections(mut self, detections: Vec<RawDetection>) -> Self {
        self.detections = detections;
        self
    }

    pub fn batches_seen(&self) -> u64 {
        self.batches_seen
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(InputSpec::default())
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_spec(&self) -> InputSpec {
        self.input
    }

    fn infer(&mut self, batch: &Batch) -> Result<Vec<Vec<RawDetection>>> {
        let expected = self.input.tensor_len();
        if let Some(bad) = batch.tensors().iter().find(|t| t.len() != expected) {
            return Err(anyhow!(
                "tensor has {} values, model input needs {}",
                bad.len(),
                expected
            ));
        }
        self.batches_seen += 1;
        Ok(vec![self.detections.clone(); batch.len()])
    }
}
