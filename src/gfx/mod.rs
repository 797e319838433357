pub mod blit;
pub mod buffer;
pub mod channel;
pub mod context;
pub mod fullscreen;
pub mod pass;
pub mod scene;
pub mod translator;
pub mod uniforms;
