use crate::common::{Config, FacesError, Result};
use crate::core::onnx::OnnxSession;
use crate::core::types::{FaceEncoding, FacePatch};
use ndarray::{Array2, Array4, ArrayView4, Axis, CowArray, Ix2};
use ort::Value;

/// Encode face patches into fixed-length descriptors.
pub trait Encoder {
    /// Encode an `(N, C, H, W)` batch into an `(N, D)` matrix, one row per patch.
    fn encode_batch(&self, patches: ArrayView4<'_, f32>) -> Result<Array2<f32>>;

    /// Encode a single patch.
    fn encode(&self, patch: &FacePatch) -> Result<FaceEncoding> {
        let encodings = self.encode_batch(patch.view().insert_axis(Axis(0)))?;
        if encodings.nrows() != 1 {
            return Err(FacesError::Model(format!(
                "Encoder returned {} rows for a single patch", encodings.nrows()
            )));
        }
        Ok(encodings.row(0).to_owned())
    }
}

/// Stack patches of identical shape into one `(N, C, H, W)` batch.
pub fn stack_patches(patches: &[&FacePatch]) -> Result<Array4<f32>> {
    let views: Vec<_> = patches.iter().map(|patch| patch.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| {
        FacesError::InvalidOperation(format!("Face patches cannot be batched: {}", e))
    })
}

/// Embedding network run through ONNX Runtime.
pub struct OnnxEncoder {
    onnx: OnnxSession,
}

impl OnnxEncoder {
    pub fn new(config: &Config) -> Result<Self> {
        let onnx = OnnxSession::load(
            "face_encoder",
            &config.encoder.model_path,
            config.performance.optimization_level,
        )?;
        Ok(Self { onnx })
    }
}

impl Encoder for OnnxEncoder {
    fn encode_batch(&self, patches: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        let batch_size = patches.len_of(Axis(0));
        let cow_array = CowArray::from(patches.view().into_dyn());
        let input_tensor = Value::from_array(self.onnx.session.allocator(), &cow_array)?;

        let outputs = self.onnx.session.run(vec![input_tensor])?;
        let output = outputs
            .first()
            .ok_or_else(|| FacesError::Model("Encoder produced no output".into()))?;

        let encodings = output
            .try_extract::<f32>()?
            .view()
            .to_owned()
            .into_dimensionality::<Ix2>()
            .map_err(|e| FacesError::Model(format!("Unexpected encoder output shape: {}", e)))?;

        if encodings.nrows() != batch_size {
            return Err(FacesError::Model(format!(
                "Encoder returned {} rows for {} patches", encodings.nrows(), batch_size
            )));
        }
        Ok(encodings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3};

    /// Uses the flattened patch as its own encoding.
    struct FlattenEncoder;

    impl Encoder for FlattenEncoder {
        fn encode_batch(&self, patches: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
            let n = patches.len_of(Axis(0));
            let d = patches.len() / n.max(1);
            Ok(patches.to_owned().into_shape((n, d)).unwrap())
        }
    }

    #[test]
    fn single_encode_goes_through_batch_of_one() {
        let patch = FacePatch::new(Array3::from_shape_vec((1, 1, 3), vec![1.0, 2.0, 3.0]).unwrap());
        let encoding = FlattenEncoder.encode(&patch).unwrap();
        assert_eq!(encoding, Array1::from(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn stacking_requires_matching_shapes() {
        let a = FacePatch::new(Array3::zeros((3, 4, 4)));
        let b = FacePatch::new(Array3::ones((3, 4, 4)));
        let c = FacePatch::new(Array3::zeros((3, 2, 2)));

        let batch = stack_patches(&[&a, &b]).unwrap();
        assert_eq!(batch.dim(), (2, 3, 4, 4));
        assert_eq!(batch[[1, 0, 0, 0]], 1.0);

        let err = stack_patches(&[&a, &c]).unwrap_err();
        assert!(matches!(err, FacesError::InvalidOperation(_)));
    }
}
