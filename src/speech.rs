use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{SpeechConfig, SpeechEngine};
use crate::error::BanterError;

/// Speech synthesis through helper binaries. Piper renders to a temp WAV and
/// a player plays it; espeak-ng speaks directly. `speak` blocks until
/// playback finishes.
pub struct SpeechSynthesizer {
    config: SpeechConfig,
    piper: Option<PathBuf>,
    espeak: Option<PathBuf>,
    player: Option<PathBuf>,
    temp_dir: PathBuf,
}

impl SpeechSynthesizer {
    pub fn new(config: &SpeechConfig, temp_dir: impl Into<PathBuf>) -> Self {
        let piper = which::which("piper").ok();
        let espeak = which::which("espeak-ng")
            .or_else(|_| which::which("espeak"))
            .ok();
        let player = ["pw-play", "paplay", "aplay"]
            .iter()
            .find_map(|name| which::which(name).ok());

        debug!(
            "Speech capabilities: piper={}, espeak={}, player={}",
            piper.is_some(),
            espeak.is_some(),
            player.is_some()
        );

        Self {
            config: config.clone(),
            piper,
            espeak,
            player,
            temp_dir: temp_dir.into(),
        }
    }

    /// Which engine `speak` will use, or None if synthesis is unavailable.
    fn resolve_engine(&self) -> Option<SpeechEngine> {
        let piper_ready =
            self.piper.is_some() && self.player.is_some() && self.config.piper_voice.is_some();
        match self.config.engine {
            SpeechEngine::Piper => piper_ready.then_some(SpeechEngine::Piper),
            SpeechEngine::Espeak => self.espeak.is_some().then_some(SpeechEngine::Espeak),
            SpeechEngine::Auto => {
                if piper_ready {
                    Some(SpeechEngine::Piper)
                } else if self.espeak.is_some() {
                    Some(SpeechEngine::Espeak)
                } else {
                    None
                }
            }
        }
    }

    pub async fn speak(&self, text: &str) -> Result<(), BanterError> {
        if !self.config.enabled {
            debug!("Speech synthesis disabled, skipping playback");
            return Ok(());
        }
        if text.trim().is_empty() {
            return Ok(());
        }

        match self.resolve_engine() {
            Some(SpeechEngine::Piper) => self.speak_piper(text).await,
            Some(SpeechEngine::Espeak) => self.speak_espeak(text).await,
            Some(SpeechEngine::Auto) | None => Err(BanterError::Playback(format!(
                "no speech engine available (engine = {})",
                self.config.engine
            ))),
        }
    }

    async fn speak_piper(&self, text: &str) -> Result<(), BanterError> {
        let piper = self
            .piper
            .as_ref()
            .ok_or_else(|| BanterError::Playback("piper not found".to_string()))?;
        let player = self
            .player
            .as_ref()
            .ok_or_else(|| BanterError::Playback("no audio player found".to_string()))?;
        let voice = self
            .config
            .piper_voice
            .as_ref()
            .ok_or_else(|| BanterError::Playback("piper voice not configured".to_string()))?;

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| BanterError::Playback(format!("temp dir: {}", e)))?;
        let wav_path = self
            .temp_dir
            .join(format!("speech_{}.wav", Uuid::new_v4()));

        let mut child = Command::new(piper)
            .arg("--model")
            .arg(voice)
            .arg("--output_file")
            .arg(&wav_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| BanterError::Playback(format!("failed to start piper: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| BanterError::Playback(format!("failed to feed piper: {}", e)))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| BanterError::Playback(format!("piper failed: {}", e)))?;
        if !status.success() {
            let _ = tokio::fs::remove_file(&wav_path).await;
            return Err(BanterError::Playback(format!(
                "piper exited with {}",
                status
            )));
        }

        let result = Command::new(player)
            .arg(&wav_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        let _ = tokio::fs::remove_file(&wav_path).await;

        let status =
            result.map_err(|e| BanterError::Playback(format!("failed to start player: {}", e)))?;
        if !status.success() {
            return Err(BanterError::Playback(format!(
                "player exited with {}",
                status
            )));
        }

        info!("Spoke {} chars via piper", text.len());
        Ok(())
    }

    async fn speak_espeak(&self, text: &str) -> Result<(), BanterError> {
        let espeak = self
            .espeak
            .as_ref()
            .ok_or_else(|| BanterError::Playback("espeak-ng not found".to_string()))?;

        let status = Command::new(espeak)
            .arg("-s")
            .arg(self.config.rate.to_string())
            .arg(text)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| BanterError::Playback(format!("failed to start espeak-ng: {}", e)))?;

        if !status.success() {
            return Err(BanterError::Playback(format!(
                "espeak-ng exited with {}",
                status
            )));
        }

        info!("Spoke {} chars via espeak-ng", text.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(engine: SpeechEngine, enabled: bool) -> SpeechConfig {
        SpeechConfig {
            enabled,
            engine,
            piper_voice: None,
            rate: 150,
        }
    }

    #[tokio::test]
    async fn test_speak_disabled_is_ok() {
        let synth = SpeechSynthesizer::new(&config(SpeechEngine::Auto, false), "/tmp/banter-test");
        assert!(synth.speak("hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_speak_empty_text_is_ok() {
        let synth = SpeechSynthesizer::new(&config(SpeechEngine::Auto, true), "/tmp/banter-test");
        assert!(synth.speak("   ").await.is_ok());
    }

    #[test]
    fn test_piper_engine_unresolved_without_voice() {
        // Forcing piper with no voice model configured can never resolve,
        // regardless of which binaries are installed.
        let synth = SpeechSynthesizer::new(&config(SpeechEngine::Piper, true), "/tmp/banter-test");
        assert!(synth.resolve_engine().is_none());
    }

    #[tokio::test]
    async fn test_speak_piper_without_voice_is_playback_error() {
        let synth = SpeechSynthesizer::new(&config(SpeechEngine::Piper, true), "/tmp/banter-test");
        let err = synth.speak("hello").await.unwrap_err();
        assert!(matches!(err, BanterError::Playback(_)));
    }
}
