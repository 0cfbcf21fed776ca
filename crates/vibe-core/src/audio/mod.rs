//! Audio output through CPAL
//!
//! The [`RenderLoop`](crate::engine::RenderLoop) is moved into the output
//! stream callback; the orchestrator stays on the control thread.
//!
//! ```ignore
//! use vibe_core::audio::{start_output, AudioConfig};
//! use vibe_core::player::create_player;
//!
//! let (mut player, render) = create_player(&engine_config, library);
//! let output = start_output(&AudioConfig::default(), source.sample_rate, render)?;
//! player.load(source)?;
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use cpal_backend::{start_output, OutputHandle};
pub use device::{default_output_device, find_device_by_id, list_output_devices, OutputDevice};
pub use error::{AudioError, AudioResult};
