#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::batch::Batch;
use crate::detect::backend::{DetectorBackend, InputSpec};
use crate::detect::result::RawDetection;

/// Tract-based backend for ONNX detectors exported with fixed batch size.
///
/// The model must take `(batch, 3, H, W)` f32 input and produce
/// `(batch, N, 5|6)` rows of `x1, y1, x2, y2, conf[, class]` in input pixels.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input: InputSpec,
    batch_size: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for a fixed batch size.
    pub fn new<P: AsRef<Path>>(model_path: P, input: InputSpec, batch_size: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(batch_size, 3, input.height as usize, input.width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract backend loaded {} (batch {}, input {}x{})",
            model_path.display(),
            batch_size,
            input.width,
            input.height
        );

        Ok(Self {
            model,
            input,
            batch_size,
        })
    }

    fn build_input(&self, batch: &Batch) -> Result<Tensor> {
        if batch.len() != self.batch_size {
            return Err(anyhow!(
                "batch has {} slots, model was built for {}",
                batch.len(),
                self.batch_size
            ));
        }
        let per_frame = self.input.tensor_len();
        let mut flat = Vec::with_capacity(per_frame * batch.len());
        for tensor in batch.tensors() {
            if tensor.len() != per_frame {
                return Err(anyhow!(
                    "expected {} tensor values per frame, received {}",
                    per_frame,
                    tensor.len()
                ));
            }
            flat.extend_from_slice(tensor);
        }
        let input = tract_ndarray::Array4::from_shape_vec(
            (
                batch.len(),
                3,
                self.input.height as usize,
                self.input.width as usize,
            ),
            flat,
        )
        .context("reshape batch tensor")?;
        Ok(input.into_tensor())
    }

    fn parse_output(&self, outputs: TVec<TValue>) -> Result<Vec<Vec<RawDetection>>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        parse_detections(view, self.batch_size)
    }
}

/// Split a `[B, N, C]` (or `[N, C]` when `B == 1`) output into per-frame rows.
fn parse_detections(
    view: tract_ndarray::ArrayViewD<'_, f32>,
    batch_size: usize,
) -> Result<Vec<Vec<RawDetection>>> {
    let shape = view.shape().to_vec();
    let view = match shape.as_slice() {
        [b, _, _] if *b == batch_size => view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("output rank")?,
        [_, _] if batch_size == 1 => view
            .insert_axis(tract_ndarray::Axis(0))
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("output rank")?,
        _ => return Err(anyhow!("unexpected output shape {:?}", shape)),
    };
    let columns = view.shape()[2];
    if columns < 5 {
        return Err(anyhow!(
            "output rows have {} values, need at least 5 (x1, y1, x2, y2, conf); shape {:?}",
            columns,
            shape
        ));
    }

    let mut per_frame = Vec::with_capacity(batch_size);
    for frame in view.outer_iter() {
        let detections = frame
            .outer_iter()
            .filter_map(|row| {
                let row: Vec<f32> = row.iter().copied().collect();
                RawDetection::from_row(&row)
            })
            .collect();
        per_frame.push(detections);
    }
    Ok(per_frame)
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_spec(&self) -> InputSpec {
        self.input
    }

    fn infer(&mut self, batch: &Batch) -> Result<Vec<Vec<RawDetection>>> {
        let input = self.build_input(batch)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.parse_output(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_per_frame() -> Result<()> {
        let data: Vec<f32> = vec![
            1.0, 2.0, 3.0, 4.0, 0.9, 2.0, //
            5.0, 6.0, 7.0, 8.0, 0.4, 0.0, //
        ];
        let array = tract_ndarray::Array3::from_shape_vec((2, 1, 6), data)?;
        let frames = parse_detections(array.view().into_dyn(), 2)?;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0].class_id, 2);
        assert_eq!(frames[1][0].confidence, 0.4);
        Ok(())
    }

    #[test]
    fn rejects_rows_too_short_for_a_box() -> Result<()> {
        // A [B, 4, N] layout would otherwise parse as zero detections.
        let array = tract_ndarray::Array3::<f32>::zeros((1, 4, 8400));
        let err = parse_detections(array.view().into_dyn(), 1).unwrap_err();
        assert!(err.to_string().contains("need at least 5"));
        Ok(())
    }

    #[test]
    fn rejects_batch_size_mismatch() {
        let array = tract_ndarray::Array3::<f32>::zeros((3, 2, 6));
        assert!(parse_detections(array.view().into_dyn(), 2).is_err());
    }
}
