pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod messages;
pub mod speech;
pub mod transcript;
pub mod transcription;

#[cfg(feature = "gui")]
pub mod gui;

pub use config::Config;
pub use engine::ChatEngine;
pub use error::BanterError;
pub use generation::GenerationClient;
pub use speech::SpeechSynthesizer;
pub use transcript::Transcript;
pub use transcription::Transcriber;
