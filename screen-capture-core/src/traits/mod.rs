pub mod audio_input;
pub mod capture_delegate;
pub mod capture_source;
pub mod container_writer;
