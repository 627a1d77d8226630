//! RIFF/WAVE header layout for the system-audio-only output file.

use crate::models::error::CaptureError;
use crate::models::media::PcmEncoding;

/// Size of the canonical WAV header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Byte offset of the RIFF chunk size field.
pub const RIFF_SIZE_OFFSET: u64 = 4;

/// Byte offset of the data chunk size field.
pub const DATA_SIZE_OFFSET: u64 = 40;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

/// Generate a 44-byte WAV header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16
/// [20-21]  format code (1 = PCM, 3 = IEEE float)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate
/// [32-33]  block_align
/// [34-35]  bits per sample
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(
    sample_rate: u32,
    channels: u16,
    encoding: PcmEncoding,
    data_size: u32,
) -> Result<[u8; WAV_HEADER_SIZE], CaptureError> {
    let bits = encoding.bits_per_sample();
    let bytes_per_sample = bits / 8;
    let format_code = match encoding {
        PcmEncoding::Int16 => FORMAT_PCM,
        PcmEncoding::Float32 => FORMAT_IEEE_FLOAT,
    };
    let block_align = channels
        .checked_mul(bytes_per_sample)
        .ok_or_else(|| CaptureError::StorageError(format!("{} channels do not fit a WAV header", channels)))?;
    let byte_rate = sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or_else(|| CaptureError::StorageError(format!("byte rate overflows at {} Hz", sample_rate)))?;
    let riff_size = data_size
        .checked_add(36)
        .ok_or_else(|| CaptureError::StorageError("WAV data exceeds 4 GiB".into()))?;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&format_code.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    Ok(header)
}
