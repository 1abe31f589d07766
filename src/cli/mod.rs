pub mod commands;
pub mod loader;

pub use commands::AddReport;
pub use loader::{load_image, ImageOptions};
