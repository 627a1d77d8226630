pub mod audio_file;
pub mod checksum;
pub mod metadata;
pub mod sample_container;
pub mod wav_format;
