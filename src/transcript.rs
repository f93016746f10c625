/// Greeting shown when the application starts.
pub const STARTUP_GREETING: &str =
    "Hello! I'm your offline AI assistant. You can type or speak to me!";

/// Greeting left behind after the user clears the chat.
pub const CLEAR_GREETING: &str = "Chat cleared! How can I help you?";

/// Who produced a transcript entry. Labels match what the chat view renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    You,
    Voice,
    Bot,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::You => "You",
            Sender::Voice => "You (Voice)",
            Sender::Bot => "Bot",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub sender: Sender,
    pub text: String,
}

impl Entry {
    /// Render one entry the way the chat view shows it.
    pub fn render(&self) -> String {
        format!("{}: {}", self.sender.label(), self.text)
    }
}

/// Ordered, append-only log of displayed messages. Clearing it is the only
/// destructive operation and is irrecoverable.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sender: Sender, text: impl Into<String>) {
        self.entries.push(Entry {
            sender,
            text: text.into(),
        });
    }

    /// Drop every entry and leave only the post-clear greeting.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.push(Sender::Bot, CLEAR_GREETING);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
