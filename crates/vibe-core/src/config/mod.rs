//! Configuration for Vibe
//!
//! - Generic YAML config loading/saving
//! - Standard config paths
//! - Engine configuration
//!
//! ```ignore
//! use vibe_core::config::{default_config_path, load_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path("engine.yaml"));
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{EngineConfig, StretchProfile};
pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
