//! Closed set of runtime configuration options (spec §6).
//!
//! Built from CLI arguments by hand, the way cuneus's demo binaries build
//! their shader params from struct literals rather than a CLI-parsing crate.
//! A `Config` can also be loaded from a JSON file via `serde` for scripted
//! runs (record/stream jobs are usually driven by a config file rather than
//! a long argv).

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Live,
    Record,
    Stream,
}

impl std::str::FromStr for RunMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(RunMode::Live),
            "record" => Ok(RunMode::Record),
            "stream" => Ok(RunMode::Stream),
            other => Err(EngineError::Config(format!("unknown mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    Hevc,
}

impl std::str::FromStr for Codec {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "h264" => Ok(Codec::H264),
            "hevc" => Ok(Codec::Hevc),
            other => Err(EngineError::Config(format!("unknown codec '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    Eight,
    Ten,
    Twelve,
}

impl BitDepth {
    pub fn from_u32(v: u32) -> Result<Self> {
        match v {
            8 => Ok(BitDepth::Eight),
            10 => Ok(BitDepth::Ten),
            12 => Ok(BitDepth::Twelve),
            other => Err(EngineError::Config(format!("unsupported bit depth {other}"))),
        }
    }

    /// Whether the capture pipeline should treat the source as float-linear (HDR).
    pub fn is_hdr(self) -> bool {
        !matches!(self, BitDepth::Eight)
    }

    /// Bytes used per sample in each YUV plane (1 for 8-bit, 2 for 10/12-bit).
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Ten | BitDepth::Twelve => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioSource {
    LiveDevice,
    File { path: PathBuf },
    Shader,
    Silent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mode: RunMode,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Valid only in `Record` mode.
    pub duration: Option<f32>,
    pub bit_depth: BitDepth,
    pub codec: Codec,
    pub output: Option<PathBuf>,
    pub num_pbos: u32,
    pub prewarm: bool,
    pub shader_id: String,
    pub audio_source: AudioSource,
    pub audio_sink: Option<String>,
    /// Directory the `FsMediaSource` resolves shader definitions and assets
    /// against.
    pub media_root: PathBuf,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.num_pbos < 2 {
            return Err(EngineError::Config("numPBOs must be >= 2".into()));
        }
        if self.mode == RunMode::Record && self.duration.is_none() {
            return Err(EngineError::Config("record mode requires duration".into()));
        }
        if self.mode != RunMode::Record && self.duration.is_some() {
            return Err(EngineError::Config("duration is only valid in record mode".into()));
        }
        if self.fps == 0 {
            return Err(EngineError::Config("fps must be > 0".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::Config("width and height must be > 0".into()));
        }
        Ok(())
    }

    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("reading {path:?}: {e}")))?;
        let cfg: Config = serde_json::from_str(&text)
            .map_err(|e| EngineError::Config(format!("parsing {path:?}: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses a minimal `--key=value` argv, matching the options table in spec §6.
    /// Unknown keys are rejected; this is a closed set.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut mode = RunMode::Live;
        let mut width = 1280u32;
        let mut height = 720u32;
        let mut fps = 30u32;
        let mut duration: Option<f32> = None;
        let mut bit_depth = BitDepth::Eight;
        let mut codec = Codec::H264;
        let mut output: Option<PathBuf> = None;
        let mut num_pbos = 3u32;
        let mut prewarm = false;
        let mut shader_id = String::new();
        let mut audio_source = AudioSource::Silent;
        let mut audio_sink: Option<String> = None;
        let mut media_root = PathBuf::from(".");

        for arg in args {
            let (key, value) = arg
                .strip_prefix("--")
                .and_then(|rest| rest.split_once('='))
                .ok_or_else(|| EngineError::Config(format!("malformed argument '{arg}'")))?;
            match key {
                "mode" => mode = value.parse()?,
                "width" => width = value.parse().map_err(|_| EngineError::Config("bad width".into()))?,
                "height" => height = value.parse().map_err(|_| EngineError::Config("bad height".into()))?,
                "fps" => fps = value.parse().map_err(|_| EngineError::Config("bad fps".into()))?,
                "duration" => duration = Some(value.parse().map_err(|_| EngineError::Config("bad duration".into()))?),
                "bitDepth" => bit_depth = BitDepth::from_u32(value.parse().map_err(|_| EngineError::Config("bad bitDepth".into()))?)?,
                "codec" => codec = value.parse()?,
                "output" => output = Some(PathBuf::from(value)),
                "numPBOs" => num_pbos = value.parse().map_err(|_| EngineError::Config("bad numPBOs".into()))?,
                "prewarm" => prewarm = value.parse().unwrap_or(false),
                "shaderId" => shader_id = value.to_string(),
                "audioSource" => {
                    audio_source = match value {
                        "live" => AudioSource::LiveDevice,
                        "shader" => AudioSource::Shader,
                        "silent" => AudioSource::Silent,
                        path => AudioSource::File { path: PathBuf::from(path) },
                    };
                }
                "audioSink" => audio_sink = Some(value.to_string()),
                "mediaRoot" => media_root = PathBuf::from(value),
                other => return Err(EngineError::Config(format!("unknown option '{other}'"))),
            }
        }

        let cfg = Config {
            mode,
            width,
            height,
            fps,
            duration,
            bit_depth,
            codec,
            output,
            num_pbos,
            prewarm,
            shader_id,
            audio_source,
            audio_sink,
            media_root,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_num_pbos_below_two() {
        let err = Config::from_args(args(&["--mode=live", "--numPBOs=1"])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn record_mode_requires_duration() {
        let err = Config::from_args(args(&["--mode=record"])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn live_mode_rejects_duration() {
        let err = Config::from_args(args(&["--mode=live", "--duration=5"])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn accepts_minimal_record_config() {
        let cfg = Config::from_args(args(&[
            "--mode=record",
            "--duration=3",
            "--fps=24",
            "--width=4",
            "--height=4",
        ]))
        .unwrap();
        assert_eq!(cfg.fps, 24);
        assert_eq!(cfg.duration, Some(3.0));
    }
}
