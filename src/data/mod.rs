pub mod loader;
pub mod manifest;
pub mod visual;

pub use loader::{Dataset, Sample};
pub use manifest::{read_manifest, ManifestRow};
pub use visual::save_visuals;
