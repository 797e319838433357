pub mod bus;
pub mod file;
pub mod live;
pub mod silent;
pub mod synth;

pub use bus::{AudioBus, SharedAudioBuffer};
