pub mod annotate;
pub mod detector;
pub mod encoder;
pub mod identifier;
mod onnx;
pub mod types;

pub use annotate::{Annotate, ImageAnnotator};
pub use detector::{Detector, OnnxDetector};
pub use encoder::{Encoder, OnnxEncoder};
pub use identifier::{Identifier, NearestNeighbourIdentifier};
pub use types::{BoundingBox, FaceEncoding, FacePatch, FaceProbability, Identity};
