use crate::transcript::Sender;

/// Requests from the window to the chat engine.
#[derive(Debug, Clone)]
pub enum UiMsg {
    Submit(String),
    ToggleVoice,
    ClearChat,
    Quit,
}

/// Updates from the chat engine, drained on the GTK main thread. This is the
/// only path by which background work reaches the widgets.
#[derive(Debug, Clone)]
pub enum EngineMsg {
    Append(Sender, String),
    Status(String),
    Listening(bool),
    Cleared,
}
