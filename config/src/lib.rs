// Arena Configuration System
// Layered configuration management

pub mod layered;
pub mod loader;
pub mod types;

pub use layered::{ConfigLayer, ConfigLayerSource, LayeredConfig};
pub use loader::{CONFIG_DIR_NAME, ConfigLoader};
pub use types::*;
