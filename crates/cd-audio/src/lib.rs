//! Audio device backends for the cadence sequencer.

mod cpal_input;
mod cpal_runtime;

pub use cpal_input::CpalInput;
pub use cpal_runtime::CpalRuntime;
