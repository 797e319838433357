//! The external translator collaborator (spec §6): given a shader source, its
//! stage, a source dialect, and a target dialect, returns the translated
//! program plus a uniform-variable name mapping. Translation itself
//! (WebGL2 GLSL -> WGSL) is explicitly out of scope (spec §1); this module
//! only owns the interface contract and a pass-through implementation
//! suitable for shaders already authored in the target dialect.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    WebGl2,
    Wgsl,
}

#[derive(Debug, Clone)]
pub struct UniformMapping {
    pub mapped_name: String,
}

#[derive(Debug, Clone)]
pub struct TranslationOutput {
    pub code: String,
    pub variables: HashMap<String, UniformMapping>,
}

pub trait Translator {
    fn translate(
        &self,
        source: &str,
        stage: ShaderStage,
        source_dialect: Dialect,
        target_dialect: Dialect,
    ) -> Result<TranslationOutput, String>;
}

/// Identity translator for sources already expressed in the target dialect.
/// The standard uniform names (`iResolution`, `iTime`, ...) map to themselves
/// verbatim, which is the behavior a real translator converges to once a
/// shader uses the target dialect's native spelling.
pub struct PassthroughTranslator;

const STANDARD_UNIFORMS: &[&str] = &[
    "iResolution",
    "iTime",
    "iTimeDelta",
    "iFrameRate",
    "iFrame",
    "iMouse",
    "iDate",
    "iSampleRate",
    "iChannelTime",
    "iChannelResolution",
    "iChannel0",
    "iChannel1",
    "iChannel2",
    "iChannel3",
];

impl Translator for PassthroughTranslator {
    fn translate(
        &self,
        source: &str,
        _stage: ShaderStage,
        _source_dialect: Dialect,
        _target_dialect: Dialect,
    ) -> Result<TranslationOutput, String> {
        if source.trim().is_empty() {
            return Err("empty shader source".to_string());
        }
        let variables = STANDARD_UNIFORMS
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    UniformMapping { mapped_name: name.to_string() },
                )
            })
            .collect();
        Ok(TranslationOutput { code: source.to_string(), variables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_rejects_empty_source() {
        let t = PassthroughTranslator;
        assert!(t.translate("", ShaderStage::Fragment, Dialect::WebGl2, Dialect::Wgsl).is_err());
    }

    #[test]
    fn passthrough_maps_standard_uniforms() {
        let t = PassthroughTranslator;
        let out = t
            .translate("fn main() {}", ShaderStage::Fragment, Dialect::WebGl2, Dialect::Wgsl)
            .unwrap();
        assert_eq!(out.variables["iTime"].mapped_name, "iTime");
        assert_eq!(out.variables.len(), STANDARD_UNIFORMS.len());
    }
}
