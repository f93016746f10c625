use thiserror::Error;

/// Error taxonomy for the chat assistant. The capture/recognition variants
/// carry the exact status-line text shown to the user when a voice action
/// fails.
#[derive(Error, Debug)]
pub enum BanterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model download error: {0}")]
    ModelDownload(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// No speech started within the listening window.
    #[error("Listening timeout.")]
    CaptureTimeout,

    /// Audio was captured but the recognizer produced no text.
    #[error("Could not understand audio.")]
    NoSpeech,

    #[error("Speech recognition error: {0}")]
    Recognition(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Speech playback error: {0}")]
    Playback(String),
}
