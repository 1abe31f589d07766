pub mod registry;

pub use registry::{FileRegistry, InMemoryRegistry, Registry};
