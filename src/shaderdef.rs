//! Shader definition document shape (spec §6). The remote fetch that produces
//! this document is out of scope; this module only owns the shape and the
//! small amount of parsing logic that turns it into a buffer-name/order
//! decision for `gfx::scene::Scene::compile`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ShaderInfo {
    pub id: String,
    pub name: String,
    pub author: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassType {
    Image,
    Common,
    Buffer,
    Sound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Texture,
    Cubemap,
    Volume,
    Buffer,
    Mic,
    Music,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    Repeat,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Nearest,
    Linear,
    Mipmap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerDef {
    #[serde(default = "default_filter")]
    pub filter: FilterMode,
    #[serde(default = "default_wrap")]
    pub wrap: WrapMode,
    #[serde(default)]
    pub vflip: bool,
    #[serde(default)]
    pub srgb: bool,
    /// "float" selects a 16-bit-float-per-channel upload; anything else is u8.
    #[serde(default)]
    pub internal: Option<String>,
}

fn default_filter() -> FilterMode {
    FilterMode::Linear
}
fn default_wrap() -> WrapMode {
    WrapMode::Clamp
}

impl SamplerDef {
    pub fn wants_float16(&self) -> bool {
        self.internal.as_deref() == Some("float")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputDef {
    pub channel: u32,
    pub ctype: ChannelType,
    /// Opaque reference resolved by the media collaborator for texture/cubemap/
    /// volume channels, or the buffer letter (e.g. "A") for `ctype = buffer`.
    pub source: String,
    #[serde(default)]
    pub sampler: Option<SamplerDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderPassDef {
    #[serde(rename = "type")]
    pub pass_type: PassType,
    /// Present for buffer passes; trailing character (A..D) identifies the buffer.
    pub name: Option<String>,
    pub code: String,
    #[serde(default)]
    pub inputs: Vec<InputDef>,
}

impl RenderPassDef {
    /// The buffer letter this pass writes to, if it is a buffer pass.
    ///
    /// Per the Open Questions in spec §9, a buffer pass whose name does not
    /// end in A..D is treated as unparseable and the pass is dropped with a
    /// `DataIncomplete` marker rather than guessed at; see DESIGN.md.
    pub fn buffer_letter(&self) -> Option<char> {
        if self.pass_type != PassType::Buffer {
            return None;
        }
        self.name
            .as_ref()
            .and_then(|n| n.chars().last())
            .filter(|c| matches!(c, 'A' | 'B' | 'C' | 'D'))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShaderDefinition {
    pub info: ShaderInfo,
    pub renderpass: Vec<RenderPassDef>,
}

impl ShaderDefinition {
    pub fn common_source(&self) -> &str {
        self.renderpass
            .iter()
            .find(|p| p.pass_type == PassType::Common)
            .map(|p| p.code.as_str())
            .unwrap_or("")
    }

    pub fn image_pass(&self) -> Option<&RenderPassDef> {
        self.renderpass.iter().find(|p| p.pass_type == PassType::Image)
    }

    pub fn sound_pass(&self) -> Option<&RenderPassDef> {
        self.renderpass.iter().find(|p| p.pass_type == PassType::Sound)
    }

    /// Buffer passes in canonical A, B, C, D order, regardless of document order.
    pub fn buffer_passes(&self) -> Vec<&RenderPassDef> {
        let mut passes: Vec<&RenderPassDef> = self
            .renderpass
            .iter()
            .filter(|p| p.pass_type == PassType::Buffer && p.buffer_letter().is_some())
            .collect();
        passes.sort_by_key(|p| p.buffer_letter().unwrap());
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_passes_sort_into_canonical_order() {
        let json = r#"{
            "info": {"id": "x", "name": "n", "author": "a"},
            "renderpass": [
                {"type": "buffer", "name": "Buf C", "code": "", "inputs": []},
                {"type": "buffer", "name": "Buf A", "code": "", "inputs": []},
                {"type": "image", "name": null, "code": "", "inputs": []}
            ]
        }"#;
        let def: ShaderDefinition = serde_json::from_str(json).unwrap();
        let order: Vec<char> = def.buffer_passes().iter().map(|p| p.buffer_letter().unwrap()).collect();
        assert_eq!(order, vec!['A', 'C']);
    }

    #[test]
    fn ambiguous_buffer_name_is_dropped() {
        let json = r#"{
            "info": {"id": "x", "name": "n", "author": "a"},
            "renderpass": [
                {"type": "buffer", "name": "Noise", "code": "", "inputs": []}
            ]
        }"#;
        let def: ShaderDefinition = serde_json::from_str(json).unwrap();
        assert!(def.buffer_passes().is_empty());
    }
}
