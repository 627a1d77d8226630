use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::media::{FormatDescription, PcmEncoding};
use crate::models::sample::Sample;
use crate::storage::wav_format;

/// Largest file a WAV header can describe: the RIFF size field holds
/// everything after the first 8 bytes.
const MAX_FILE_SIZE: u64 = u32::MAX as u64 + 8;

#[derive(Debug, Clone, Copy, PartialEq)]
struct AudioLayout {
    sample_rate: f64,
    channels: u16,
    encoding: PcmEncoding,
}

/// Streaming WAV writer used by system-audio-only captures.
///
/// The file is created lazily with the format of the first sample written,
/// so a capture that never produced audio leaves nothing on disk. Sizes in
/// the header are patched on `close`. An existing file at the path is never
/// overwritten, and writes past the 4 GiB WAV limit are refused.
///
/// ```text
/// [44-byte WAV header]
/// [sample payloads, in arrival order...]
/// ```
pub struct AudioFileWriter {
    file_path: PathBuf,
    file: Option<File>,
    layout: Option<AudioLayout>,
    total_bytes_written: u64,
}

impl AudioFileWriter {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            file: None,
            layout: None,
            total_bytes_written: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Append the payload of an audio sample, opening the file on first use.
    pub fn write_sample(&mut self, sample: &Sample) -> Result<(), CaptureError> {
        let layout = match sample.format() {
            Some(FormatDescription::Audio {
                sample_rate,
                channels,
                encoding,
            }) => AudioLayout {
                sample_rate: *sample_rate,
                channels: *channels,
                encoding: *encoding,
            },
            Some(FormatDescription::Video { .. }) => {
                return Err(CaptureError::StorageError("audio file cannot store video samples".into()))
            }
            None => return Err(CaptureError::NoFormatDescription),
        };

        match self.layout {
            None => self.open(layout)?,
            Some(existing) if existing != layout => {
                return Err(CaptureError::StorageError(format!(
                    "audio format changed mid-recording: {:?} -> {:?}",
                    existing, layout
                )))
            }
            Some(_) => {}
        }

        self.write_raw(sample.payload())
    }

    /// Patch header sizes and close the file.
    ///
    /// Returns whether a file was produced.
    pub fn close(&mut self) -> Result<bool, CaptureError> {
        let Some(mut file) = self.file.take() else {
            return Ok(false);
        };

        let too_large = |_: std::num::TryFromIntError| CaptureError::StorageError("audio file exceeds the 4 GiB WAV limit".into());
        let data_size =
            u32::try_from(self.total_bytes_written - wav_format::WAV_HEADER_SIZE as u64).map_err(too_large)?;
        let riff_size = u32::try_from(self.total_bytes_written - 8).map_err(too_large)?;

        file.seek(SeekFrom::Start(wav_format::RIFF_SIZE_OFFSET))
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.write_all(&riff_size.to_le_bytes())
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;

        file.seek(SeekFrom::Start(wav_format::DATA_SIZE_OFFSET))
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.write_all(&data_size.to_le_bytes())
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;

        file.flush().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.sync_all()
            .map_err(|e| CaptureError::StorageError(format!("failed to sync audio file: {}", e)))?;
        Ok(true)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn open(&mut self, layout: AudioLayout) -> Result<(), CaptureError> {
        let header = wav_format::generate_wav_header(layout.sample_rate as u32, layout.channels, layout.encoding, 0)?;

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.file_path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;
        self.file = Some(file);
        self.layout = Some(layout);
        self.total_bytes_written = 0;

        log::debug!(
            "opened audio file {} ({} Hz, {} ch, {:?})",
            self.file_path.display(),
            layout.sample_rate,
            layout.channels,
            layout.encoding
        );

        self.write_raw(&header)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        if self.total_bytes_written + data.len() as u64 > MAX_FILE_SIZE {
            return Err(CaptureError::StorageError("audio file reached the 4 GiB WAV limit".into()));
        }
        file.write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}
