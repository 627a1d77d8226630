pub mod config;
pub mod error;
pub mod media;
pub mod recording_result;
pub mod sample;
pub mod state;
