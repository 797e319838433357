//! The media fetch/cache collaborator (spec §1 "out of scope"; spec §6
//! ADDED). The remote shader-metadata fetch itself isn't this crate's
//! concern, but the interface it presents to the rest of the engine is, so
//! it's modeled as a trait with a single local-filesystem implementation.

use crate::error::Result;
use crate::shaderdef::ShaderDefinition;

pub mod fs;

pub trait MediaSource: Send + Sync {
    fn fetch_shader(&self, id: &str) -> Result<ShaderDefinition>;
    fn fetch_asset(&self, reference: &str) -> Result<Vec<u8>>;
}
