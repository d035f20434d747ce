use anyhow::Result;

use crate::batch::Batch;
use crate::detect::result::RawDetection;

/// Channel order a backend expects in its input tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Model input geometry. Tensors are `(batch, 3, height, width)` f32 in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub channel_order: ChannelOrder,
}

impl InputSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channel_order: ChannelOrder::Rgb,
        }
    }

    /// Number of f32 values in one preprocessed frame.
    pub fn tensor_len(&self) -> usize {
        3 * self.width as usize * self.height as usize
    }
}

impl Default for InputSpec {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

/// Detector backend trait.
///
/// A backend consumes a full batch and returns one detection list per slot,
/// padding slots included, in input order. Execution provider choice and
/// model loading are the backend's own business; the pipeline only sees this
/// trait.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Input geometry the backend was built for.
    fn input_spec(&self) -> InputSpec;

    /// Run inference on a batch.
    fn infer(&mut self, batch: &Batch) -> Result<Vec<Vec<RawDetection>>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
