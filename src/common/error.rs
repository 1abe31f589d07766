use crate::core::types::Identity;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacesError {
    #[error("Face patch already known as {}", format_identities(.known_as))]
    Conflict { known_as: BTreeSet<Identity> },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

fn format_identities(identities: &BTreeSet<Identity>) -> String {
    let names: Vec<&str> = identities.iter().map(Identity::as_str).collect();
    format!("{{{}}}", names.join(", "))
}

pub type Result<T> = std::result::Result<T, FacesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_known_identities() {
        let known_as: BTreeSet<Identity> = ["bob", "alice"].into_iter().map(Identity::from).collect();
        let err = FacesError::Conflict { known_as };
        assert_eq!(err.to_string(), "Face patch already known as {alice, bob}");
    }
}
