//! Audio Probe Adapters

mod wav_probe;

pub use wav_probe::*;
