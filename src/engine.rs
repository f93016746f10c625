use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::audio::PhraseRecorder;
use crate::config::Config;
use crate::error::BanterError;
use crate::generation::{strip_prompt_echo, GenerationClient};
use crate::messages::{EngineMsg, UiMsg};
use crate::speech::SpeechSynthesizer;
use crate::transcript::{Sender, Transcript, CLEAR_GREETING, STARTUP_GREETING};
use crate::transcription::Transcriber;

pub const STATUS_INITIAL: &str = "Ready to chat! Type or use voice input.";
pub const STATUS_READY: &str = "Ready to chat!";
pub const STATUS_LISTENING: &str = "Listening... Speak now!";
pub const STATUS_THINKING: &str = "AI is thinking...";

/// Completions reported back by spawned tasks. They funnel through one
/// channel so the transcript and the listening flag are only ever touched
/// from the engine loop.
enum TaskEvent {
    CaptureDone(Result<String, BanterError>),
    GenerationDone(String),
}

/// The chat controller. Owns the transcript, the listening flag and the
/// three collaborators; consumes window requests and emits render updates.
///
/// Every user action spawns its own task; nothing is queued, capped or
/// cancelled. Toggling voice input off while a capture is in flight only
/// changes the displayed state, the capture still runs to its own timeout.
pub struct ChatEngine {
    transcript: Transcript,
    listening: bool,
    recorder: Arc<PhraseRecorder>,
    transcriber: Arc<Mutex<Transcriber>>,
    generator: Arc<GenerationClient>,
    synthesizer: Arc<SpeechSynthesizer>,
    ui_rx: async_channel::Receiver<UiMsg>,
    engine_tx: async_channel::Sender<EngineMsg>,
    task_tx: mpsc::Sender<TaskEvent>,
    task_rx: mpsc::Receiver<TaskEvent>,
}

impl ChatEngine {
    pub fn new(
        config: &Config,
        ui_rx: async_channel::Receiver<UiMsg>,
        engine_tx: async_channel::Sender<EngineMsg>,
    ) -> Result<Self, BanterError> {
        let recorder = Arc::new(PhraseRecorder::new(&config.audio, &config.capture));
        let transcriber = Arc::new(Mutex::new(Transcriber::new(&config.transcription)?));
        let generator = Arc::new(GenerationClient::new(&config.generation)?);
        let synthesizer = Arc::new(SpeechSynthesizer::new(
            &config.speech,
            config.audio.temp_dir.clone(),
        ));

        let (task_tx, task_rx) = mpsc::channel(32);

        Ok(Self {
            transcript: Transcript::new(),
            listening: false,
            recorder,
            transcriber,
            generator,
            synthesizer,
            ui_rx,
            engine_tx,
            task_tx,
            task_rx,
        })
    }

    pub async fn run(mut self) {
        info!("Chat engine running");

        self.transcript.push(Sender::Bot, STARTUP_GREETING);
        self.emit(EngineMsg::Append(Sender::Bot, STARTUP_GREETING.to_string()))
            .await;
        self.emit(EngineMsg::Status(STATUS_INITIAL.to_string())).await;
        self.emit(EngineMsg::Listening(false)).await;

        loop {
            tokio::select! {
                msg = self.ui_rx.recv() => {
                    match msg {
                        Ok(UiMsg::Submit(text)) => self.handle_submit(text).await,
                        Ok(UiMsg::ToggleVoice) => self.handle_toggle_voice().await,
                        Ok(UiMsg::ClearChat) => self.handle_clear().await,
                        Ok(UiMsg::Quit) => {
                            info!("Quit requested from window");
                            break;
                        }
                        Err(_) => {
                            info!("Window channel closed, shutting down");
                            break;
                        }
                    }
                }
                Some(event) = self.task_rx.recv() => {
                    self.handle_task_event(event).await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn emit(&self, msg: EngineMsg) {
        let _ = self.engine_tx.send(msg).await;
    }

    /// Typed submission. Whitespace-only input is a complete no-op: no
    /// transcript entry, no task.
    async fn handle_submit(&mut self, text: String) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let message = trimmed.to_string();
        self.transcript.push(Sender::You, message.clone());
        self.emit(EngineMsg::Append(Sender::You, message.clone())).await;
        self.spawn_generation(message);
    }

    async fn handle_toggle_voice(&mut self) {
        if self.listening {
            // Cosmetic only: the in-flight capture keeps running until its
            // own timeout, there is no cancellation path.
            self.listening = false;
            self.emit(EngineMsg::Listening(false)).await;
            self.emit(EngineMsg::Status(STATUS_READY.to_string())).await;
            return;
        }

        self.listening = true;
        self.emit(EngineMsg::Listening(true)).await;
        self.emit(EngineMsg::Status(STATUS_LISTENING.to_string())).await;
        self.spawn_capture();
    }

    async fn handle_clear(&mut self) {
        self.transcript.clear();
        self.emit(EngineMsg::Cleared).await;
        self.emit(EngineMsg::Append(Sender::Bot, CLEAR_GREETING.to_string()))
            .await;
    }

    async fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::CaptureDone(result) => {
                // Success or failure, the capture always lands back in idle.
                self.listening = false;
                self.emit(EngineMsg::Listening(false)).await;

                match result {
                    Ok(text) => {
                        self.transcript.push(Sender::Voice, text.clone());
                        self.emit(EngineMsg::Append(Sender::Voice, text.clone())).await;
                        self.spawn_generation(text);
                    }
                    Err(e) => {
                        warn!("Voice capture failed: {}", e);
                        self.emit(EngineMsg::Status(e.to_string())).await;
                    }
                }
            }
            TaskEvent::GenerationDone(reply) => {
                self.transcript.push(Sender::Bot, reply.clone());
                self.emit(EngineMsg::Append(Sender::Bot, reply.clone())).await;
                self.emit(EngineMsg::Status(STATUS_READY.to_string())).await;
                self.spawn_playback(reply);
            }
        }
    }

    /// One generation task per submission; overlapping submissions race and
    /// append in completion order.
    fn spawn_generation(&self, prompt: String) {
        let generator = self.generator.clone();
        let engine_tx = self.engine_tx.clone();
        let task_tx = self.task_tx.clone();

        tokio::spawn(async move {
            let _ = engine_tx
                .send(EngineMsg::Status(STATUS_THINKING.to_string()))
                .await;

            let reply = match generator.generate(&prompt).await {
                Ok(raw) => strip_prompt_echo(&prompt, &raw),
                Err(e) => format!("Error: {}", e),
            };

            let _ = task_tx.send(TaskEvent::GenerationDone(reply)).await;
        });
    }

    fn spawn_capture(&self) {
        let recorder = self.recorder.clone();
        let transcriber = self.transcriber.clone();
        let task_tx = self.task_tx.clone();

        tokio::spawn(async move {
            let result = capture_and_transcribe(recorder, transcriber).await;
            let _ = task_tx.send(TaskEvent::CaptureDone(result)).await;
        });
    }

    /// Playback failures never reach the window, they are logged and dropped.
    fn spawn_playback(&self, text: String) {
        let synthesizer = self.synthesizer.clone();

        tokio::spawn(async move {
            if let Err(e) = synthesizer.speak(&text).await {
                warn!("Speech playback failed: {}", e);
            }
        });
    }

    async fn shutdown(mut self) {
        self.transcriber.lock().await.unload_model();
        info!("Chat engine shut down");
    }
}

async fn capture_and_transcribe(
    recorder: Arc<PhraseRecorder>,
    transcriber: Arc<Mutex<Transcriber>>,
) -> Result<String, BanterError> {
    let wav_path = tokio::task::spawn_blocking(move || recorder.capture_phrase())
        .await
        .map_err(|e| BanterError::Recognition(format!("capture task failed: {}", e)))??;

    let result = transcriber.lock().await.transcribe(&wav_path).await;

    let _ = tokio::fs::remove_file(&wav_path).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn test_config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        // An uncreatable capture dir makes any spawned capture task fail
        // immediately instead of opening a real microphone stream.
        config.audio.temp_dir = "/dev/null/banter-test".to_string();
        config.transcription.models_dir =
            temp.path().join("models").to_string_lossy().to_string();
        // Port 1 is never listening; generation fails fast with a
        // connection error instead of touching the network.
        config.generation.endpoint = "http://127.0.0.1:1/v1/completions".to_string();
        config.speech.enabled = false;
        config
    }

    struct Harness {
        ui_tx: async_channel::Sender<UiMsg>,
        engine_rx: async_channel::Receiver<EngineMsg>,
        _temp: TempDir,
    }

    async fn start_engine() -> Harness {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);

        let (ui_tx, ui_rx) = async_channel::bounded(64);
        let (engine_tx, engine_rx) = async_channel::bounded(64);

        let engine = ChatEngine::new(&config, ui_rx, engine_tx).unwrap();
        tokio::spawn(engine.run());

        let harness = Harness {
            ui_tx,
            engine_rx,
            _temp: temp,
        };
        harness.drain_startup().await;
        harness
    }

    impl Harness {
        async fn recv(&self) -> EngineMsg {
            timeout(Duration::from_secs(10), self.engine_rx.recv())
                .await
                .expect("timed out waiting for engine message")
                .expect("engine channel closed")
        }

        async fn drain_startup(&self) {
            // Greeting, initial status, initial listening state.
            match self.recv().await {
                EngineMsg::Append(Sender::Bot, text) => assert_eq!(text, STARTUP_GREETING),
                other => panic!("expected startup greeting, got {:?}", other),
            }
            match self.recv().await {
                EngineMsg::Status(s) => assert_eq!(s, STATUS_INITIAL),
                other => panic!("expected initial status, got {:?}", other),
            }
            match self.recv().await {
                EngineMsg::Listening(false) => {}
                other => panic!("expected initial listening state, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_submit_is_a_noop() {
        let h = start_engine().await;

        h.ui_tx.send(UiMsg::Submit("   ".to_string())).await.unwrap();
        // A clear right after; if the empty submit had produced anything it
        // would arrive before the clear acknowledgement.
        h.ui_tx.send(UiMsg::ClearChat).await.unwrap();

        match h.recv().await {
            EngineMsg::Cleared => {}
            other => panic!("empty submit leaked a message: {:?}", other),
        }
        match h.recv().await {
            EngineMsg::Append(Sender::Bot, text) => assert_eq!(text, CLEAR_GREETING),
            other => panic!("expected clear greeting, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_appends_user_then_bot_reply() {
        let h = start_engine().await;

        h.ui_tx
            .send(UiMsg::Submit("Hello".to_string()))
            .await
            .unwrap();

        match h.recv().await {
            EngineMsg::Append(Sender::You, text) => assert_eq!(text, "Hello"),
            other => panic!("expected user entry, got {:?}", other),
        }
        match h.recv().await {
            EngineMsg::Status(s) => assert_eq!(s, STATUS_THINKING),
            other => panic!("expected thinking status, got {:?}", other),
        }
        // The generation endpoint is unreachable, so the reply is the error
        // string, appended as a Bot entry like any other reply.
        match h.recv().await {
            EngineMsg::Append(Sender::Bot, text) => {
                assert!(text.starts_with("Error: "), "unexpected reply: {}", text);
            }
            other => panic!("expected bot entry, got {:?}", other),
        }
        match h.recv().await {
            EngineMsg::Status(s) => assert_eq!(s, STATUS_READY),
            other => panic!("expected ready status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_trims_whitespace() {
        let h = start_engine().await;

        h.ui_tx
            .send(UiMsg::Submit("  hi there  ".to_string()))
            .await
            .unwrap();

        match h.recv().await {
            EngineMsg::Append(Sender::You, text) => assert_eq!(text, "hi there"),
            other => panic!("expected trimmed entry, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_emits_cleared_then_greeting() {
        let h = start_engine().await;

        h.ui_tx.send(UiMsg::ClearChat).await.unwrap();

        match h.recv().await {
            EngineMsg::Cleared => {}
            other => panic!("expected cleared, got {:?}", other),
        }
        match h.recv().await {
            EngineMsg::Append(Sender::Bot, text) => assert_eq!(text, CLEAR_GREETING),
            other => panic!("expected clear greeting, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_voice_toggle_enters_listening_state() {
        let h = start_engine().await;

        h.ui_tx.send(UiMsg::ToggleVoice).await.unwrap();

        // Emitted synchronously by the handler before the capture task can
        // report anything.
        match h.recv().await {
            EngineMsg::Listening(true) => {}
            other => panic!("expected listening on, got {:?}", other),
        }
        match h.recv().await {
            EngineMsg::Status(s) => assert_eq!(s, STATUS_LISTENING),
            other => panic!("expected listening status, got {:?}", other),
        }

        // Toggle off: cosmetic idle. The capture task (which fails in this
        // environment) may interleave its own failure status, but a capture
        // failure never appends a transcript entry, and the toggle-off
        // always produces the ready status.
        h.ui_tx.send(UiMsg::ToggleVoice).await.unwrap();

        let mut saw_listening_off = false;
        loop {
            match h.recv().await {
                EngineMsg::Listening(false) => saw_listening_off = true,
                EngineMsg::Status(s) if s == STATUS_READY => break,
                EngineMsg::Status(_) => {}
                other => panic!("unexpected message during voice toggle: {:?}", other),
            }
        }
        assert!(saw_listening_off);
    }
}
