pub mod api;
pub mod app;
pub mod compiler;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod init;
pub mod logging;
pub mod prompts;
pub mod providers;
pub mod queue;
pub mod rotation;
pub mod scheduler;
pub mod studio;
pub mod title;
pub mod trends;
pub mod voiceover;

pub use error::{Error, Result};
