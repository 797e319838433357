//! Capture Pipeline handoff to the external encoder (spec §4.6): a
//! `memmap2`-backed shared-memory region for pixel planes plus a Unix FIFO
//! carrying a one-time header and per-frame framed records.

use crate::error::{EngineError, Result};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv444P8,
    Yuv444P10Le,
}

impl PixelFormat {
    fn tag(self) -> i32 {
        match self {
            PixelFormat::Yuv444P8 => 0,
            PixelFormat::Yuv444P10Le => 1,
        }
    }
}

/// Fixed SHM-name field width (spec §4.6/§6); longer names are rejected
/// rather than silently truncated.
pub const SHM_NAME_LEN: usize = 512;

/// Three zeroed `i32` fields (sample_rate, channels, bits_per_sample) the
/// sidecar contract reserves for an audio track; always zero here since this
/// header only ever describes a video plane ring.
const RESERVED_AUDIO_LEN: usize = 12;

const SHM_HEADER_LEN: usize = SHM_NAME_LEN + 4 + 4 + 4 + 4 + RESERVED_AUDIO_LEN;

/// Sent once, before any frame record.
pub struct ShmHeader {
    pub shm_name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
}

impl ShmHeader {
    fn to_bytes(&self) -> Result<[u8; SHM_HEADER_LEN]> {
        let name_bytes = self.shm_name.as_bytes();
        if name_bytes.len() > SHM_NAME_LEN {
            return Err(EngineError::EncoderPipe(format!(
                "shm name '{}' is {} bytes, exceeds the {SHM_NAME_LEN}-byte field",
                self.shm_name,
                name_bytes.len()
            )));
        }

        let mut out = [0u8; SHM_HEADER_LEN];
        out[0..name_bytes.len()].copy_from_slice(name_bytes);

        let mut offset = SHM_NAME_LEN;
        out[offset..offset + 4].copy_from_slice(&self.width.to_le_bytes());
        offset += 4;
        out[offset..offset + 4].copy_from_slice(&self.height.to_le_bytes());
        offset += 4;
        out[offset..offset + 4].copy_from_slice(&self.fps.to_le_bytes());
        offset += 4;
        out[offset..offset + 4].copy_from_slice(&self.pixel_format.tag().to_le_bytes());
        // Remaining RESERVED_AUDIO_LEN bytes stay zeroed.

        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCommand {
    Data = 0,
    Eof = 2,
}

const FRAME_RECORD_LEN: usize = 4 + 4 + 8;

/// Per-frame framed record: command tag, payload size, presentation timestamp.
struct FrameRecord {
    command: FrameCommand,
    payload_size: u32,
    pts: i64,
}

impl FrameRecord {
    fn to_bytes(&self) -> [u8; FRAME_RECORD_LEN] {
        let mut out = [0u8; FRAME_RECORD_LEN];
        out[0..4].copy_from_slice(&(self.command as u32).to_le_bytes());
        out[4..8].copy_from_slice(&self.payload_size.to_le_bytes());
        out[8..16].copy_from_slice(&self.pts.to_le_bytes());
        out
    }
}

/// Owns the shared-memory region (write side) and the control-pipe writer.
/// `eof_sent` enforces "EOF is emitted exactly once" (spec §4.6).
pub struct EncoderSink {
    shm: MmapMut,
    _shm_file: File,
    control_pipe: File,
    plane_size: usize,
    eof_sent: bool,
}

impl EncoderSink {
    pub fn new(shm_path: &Path, control_pipe_path: &Path, header: ShmHeader, bytes_per_plane: u32) -> Result<Self> {
        let plane_size = (header.width as usize) * (header.height as usize) * (bytes_per_plane as usize);
        let region_size = plane_size * 3;

        let shm_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(shm_path)
            .map_err(|e| EngineError::EncoderPipe(format!("opening shm file {shm_path:?}: {e}")))?;
        shm_file
            .set_len(region_size as u64)
            .map_err(|e| EngineError::EncoderPipe(format!("sizing shm file {shm_path:?}: {e}")))?;
        let shm = unsafe {
            MmapMut::map_mut(&shm_file).map_err(|e| EngineError::EncoderPipe(format!("mmap {shm_path:?}: {e}")))?
        };

        let mut control_pipe = OpenOptions::new()
            .write(true)
            .open(control_pipe_path)
            .map_err(|e| EngineError::EncoderPipe(format!("opening control pipe {control_pipe_path:?}: {e}")))?;

        control_pipe
            .write_all(&header.to_bytes()?)
            .map_err(|e| EngineError::EncoderPipe(format!("writing shm header: {e}")))?;

        Ok(Self { shm, _shm_file: shm_file, control_pipe, plane_size, eof_sent: false })
    }

    /// Writes the three planes into shared memory, then emits a data record
    /// on the control pipe. A data record is only ever sent after the pixel
    /// bytes land in shared memory, per §4.6.
    pub fn send_frame(&mut self, y: &[u8], u: &[u8], v: &[u8], pts: u64) -> Result<()> {
        if self.eof_sent {
            return Err(EngineError::EncoderPipe("send_frame called after EOF".into()));
        }
        if y.len() != self.plane_size || u.len() != self.plane_size || v.len() != self.plane_size {
            return Err(EngineError::EncoderPipe("plane size mismatch writing to shared memory".into()));
        }

        self.shm[0..self.plane_size].copy_from_slice(y);
        self.shm[self.plane_size..2 * self.plane_size].copy_from_slice(u);
        self.shm[2 * self.plane_size..3 * self.plane_size].copy_from_slice(v);

        let record = FrameRecord { command: FrameCommand::Data, payload_size: (self.plane_size * 3) as u32, pts: pts as i64 };
        self.control_pipe
            .write_all(&record.to_bytes())
            .map_err(|e| EngineError::EncoderPipe(format!("writing data record: {e}")))?;
        Ok(())
    }

    /// Emits EOF exactly once and closes the pipe.
    pub fn send_eof(&mut self) -> Result<()> {
        if self.eof_sent {
            return Ok(());
        }
        let record = FrameRecord { command: FrameCommand::Eof, payload_size: 0, pts: 0 };
        self.control_pipe
            .write_all(&record.to_bytes())
            .map_err(|e| EngineError::EncoderPipe(format!("writing EOF record: {e}")))?;
        self.eof_sent = true;
        Ok(())
    }
}

/// Creates the control-pipe path as a Unix FIFO (`mkfifo`), matching the
/// "control pipe" of spec §4.6.
pub fn create_control_fifo(path: &Path) -> Result<PathBuf> {
    use std::ffi::CString;
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|e| EngineError::EncoderPipe(format!("invalid fifo path: {e}")))?;
    let ret = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if ret != 0 && std::io::Error::last_os_error().kind() != std::io::ErrorKind::AlreadyExists {
        return Err(EngineError::EncoderPipe(format!("mkfifo {path:?} failed: {}", std::io::Error::last_os_error())));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_record_encodes_command_size_and_pts_at_spec_offsets() {
        let record = FrameRecord { command: FrameCommand::Data, payload_size: 1024, pts: 7 };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1024);
        assert_eq!(i64::from_le_bytes(bytes[8..16].try_into().unwrap()), 7);
    }

    #[test]
    fn eof_record_uses_tag_two() {
        let record = FrameRecord { command: FrameCommand::Eof, payload_size: 0, pts: 0 };
        assert_eq!(u32::from_le_bytes(record.to_bytes()[0..4].try_into().unwrap()), 2);
    }

    #[test]
    fn shm_header_places_fields_at_spec_byte_offsets() {
        let header = ShmHeader { shm_name: "shaderrunner_capture_0".into(), width: 64, height: 32, fps: 30, pixel_format: PixelFormat::Yuv444P10Le };
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), SHM_HEADER_LEN);
        assert_eq!(&bytes[0..header.shm_name.len()], header.shm_name.as_bytes());
        assert!(bytes[header.shm_name.len()..SHM_NAME_LEN].iter().all(|&b| b == 0));

        let mut offset = SHM_NAME_LEN;
        assert_eq!(u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()), 64);
        offset += 4;
        assert_eq!(u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()), 32);
        offset += 4;
        assert_eq!(u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()), 30);
        offset += 4;
        assert_eq!(i32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()), 1);
        offset += 4;
        assert!(bytes[offset..].iter().all(|&b| b == 0));
    }

    #[test]
    fn shm_header_rejects_a_name_longer_than_the_fixed_field() {
        let header = ShmHeader { shm_name: "x".repeat(SHM_NAME_LEN + 1), width: 1, height: 1, fps: 1, pixel_format: PixelFormat::Yuv444P8 };
        assert!(header.to_bytes().is_err());
    }
}
