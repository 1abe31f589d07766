// Core modules
pub mod builder;
pub mod cli;
pub mod common;
pub mod core;
pub mod storage;

// Re-export commonly used types
pub use builder::{Builder, ComponentFactory, OnnxComponents};
pub use common::{Config, FacesError, Result};
pub use core::{
    Annotate, BoundingBox, Detector, Encoder, FaceEncoding, FacePatch, FaceProbability,
    Identifier, Identity, ImageAnnotator, NearestNeighbourIdentifier,
};
pub use storage::{FileRegistry, InMemoryRegistry, Registry};
