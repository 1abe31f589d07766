pub mod config;
pub mod error;
pub mod paths;

pub use config::Config;
pub use error::{FacesError, Result};
pub use paths::{default_registry_path, expand_home};
