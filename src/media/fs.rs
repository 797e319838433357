//! Local-filesystem `MediaSource`: a shader definition JSON plus sibling
//! asset files under one directory, no network I/O. Enough to exercise the
//! rest of the engine without the remote fetch this interface stands in for.

use crate::error::{EngineError, Result};
use crate::media::MediaSource;
use crate::shaderdef::ShaderDefinition;
use std::path::PathBuf;

pub struct FsMediaSource {
    root: PathBuf,
}

impl FsMediaSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MediaSource for FsMediaSource {
    fn fetch_shader(&self, id: &str) -> Result<ShaderDefinition> {
        let path = self.root.join(id).with_extension("json");
        let text = std::fs::read_to_string(&path)
            .map_err(|e| EngineError::DataIncomplete(format!("shader '{id}' at {path:?}: {e}")))?;
        serde_json::from_str(&text).map_err(|e| EngineError::DataIncomplete(format!("parsing shader '{id}': {e}")))
    }

    fn fetch_asset(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.root.join(reference);
        std::fs::read(&path).map_err(|e| EngineError::DataIncomplete(format!("asset '{reference}' at {path:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fetch_shader_reports_data_incomplete_for_missing_file() {
        let dir = std::env::temp_dir().join("shaderrunner_fs_media_test");
        std::fs::create_dir_all(&dir).unwrap();
        let source = FsMediaSource::new(&dir);
        let err = source.fetch_shader("does-not-exist").unwrap_err();
        assert!(matches!(err, EngineError::DataIncomplete(_)));
    }

    #[test]
    fn fetch_asset_reads_sibling_file() {
        let dir = std::env::temp_dir().join("shaderrunner_fs_media_test_asset");
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = std::fs::File::create(dir.join("noise.bin")).unwrap();
        f.write_all(&[1, 2, 3]).unwrap();
        let source = FsMediaSource::new(&dir);
        assert_eq!(source.fetch_asset("noise.bin").unwrap(), vec![1, 2, 3]);
    }
}
