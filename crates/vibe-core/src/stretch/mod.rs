//! Time-stretch library binding
//!
//! `abi` is the raw surface of the foreign stretcher the engine drives;
//! `signalsmith` is the library shipped with Vibe, built on signalsmith-stretch.

pub mod abi;
mod signalsmith;

pub use abi::{
    RawStretcher, StretchLibrary, StretchOptions, OPTION_ENGINE_CHEAPER, OPTION_PROCESS_REALTIME,
    STATUS_INVALID, STATUS_OK, STATUS_OVERFLOW,
};
pub use signalsmith::SignalsmithLibrary;
