use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::TranscriptionConfig;
use crate::error::BanterError;

const HF_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Whisper model names known to exist upstream.
const KNOWN_MODELS: &[&str] = &["tiny", "base", "small", "medium", "large-v3-turbo"];

/// Speech-to-text collaborator: loads a whisper model (downloading it on
/// first use) and turns a captured WAV into text. An empty transcription is
/// reported as unintelligible audio.
pub struct Transcriber {
    config: TranscriptionConfig,
    context: Option<WhisperContext>,
    model_path: PathBuf,
}

fn validate_model_name(name: &str) -> Result<(), BanterError> {
    if name.is_empty() {
        return Err(BanterError::Config("Model name cannot be empty".to_string()));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(BanterError::Config(format!(
            "Invalid model name '{}': contains path separators",
            name
        )));
    }
    if name.contains('\0') {
        return Err(BanterError::Config(
            "Invalid model name: contains null bytes".to_string(),
        ));
    }
    if !KNOWN_MODELS.contains(&name) {
        // Custom models are allowed, but flag likely typos.
        warn!("Model '{}' is not in the known model list: {:?}", name, KNOWN_MODELS);
    }
    Ok(())
}

impl Transcriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self, BanterError> {
        validate_model_name(&config.model)?;

        if config.models_dir.contains("..") {
            return Err(BanterError::Config(
                "models_dir cannot contain path traversal sequences".to_string(),
            ));
        }

        let model_filename = format!("ggml-{}.bin", config.model);
        let model_path = PathBuf::from(&config.models_dir).join(&model_filename);

        Ok(Self {
            config: config.clone(),
            context: None,
            model_path,
        })
    }

    pub async fn ensure_model(&self) -> Result<(), BanterError> {
        if self.model_path.exists() {
            debug!("Model already exists: {}", self.model_path.display());
            return Ok(());
        }

        let model_filename = format!("ggml-{}.bin", self.config.model);
        let url = format!("{}/{}", HF_BASE_URL, model_filename);

        info!("Downloading model '{}' from {}", self.config.model, url);

        if let Some(parent) = self.model_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BanterError::ModelDownload(format!(
                    "Failed to create models directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let url_clone = url.clone();
        let model_name = self.config.model.clone();
        let model_path = self.model_path.clone();

        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, BanterError> {
            let response = reqwest::blocking::get(&url_clone)
                .map_err(|e| BanterError::ModelDownload(format!("Failed to download model: {}", e)))?;

            if !response.status().is_success() {
                return Err(BanterError::ModelDownload(format!(
                    "HTTP {} when downloading model '{}'. Known models: {}",
                    response.status(),
                    model_name,
                    KNOWN_MODELS.join(", ")
                )));
            }

            let bytes = response
                .bytes()
                .map_err(|e| BanterError::ModelDownload(format!("Failed to read model data: {}", e)))?;

            Ok(bytes.to_vec())
        })
        .await
        .map_err(|e| BanterError::ModelDownload(format!("Download task failed: {}", e)))??;

        info!("Downloaded {} bytes, saving to {}", bytes.len(), model_path.display());

        tokio::fs::write(&model_path, &bytes).await.map_err(|e| {
            BanterError::ModelDownload(format!(
                "Failed to write model to {}: {}",
                model_path.display(),
                e
            ))
        })?;

        info!("Model '{}' downloaded successfully", self.config.model);
        Ok(())
    }

    pub async fn load_model(&mut self) -> Result<(), BanterError> {
        if self.context.is_some() {
            debug!("Model already loaded");
            return Ok(());
        }

        self.ensure_model().await?;

        info!("Loading whisper model from {}", self.model_path.display());

        let model_path = self.model_path.clone();
        let ctx = tokio::task::spawn_blocking(move || {
            WhisperContext::new_with_params(
                model_path
                    .to_str()
                    .ok_or_else(|| BanterError::ModelLoad("Invalid model path encoding".to_string()))?,
                WhisperContextParameters::default(),
            )
            .map_err(|e| BanterError::ModelLoad(format!("Failed to load whisper model: {}", e)))
        })
        .await
        .map_err(|e| BanterError::ModelLoad(format!("Model load task failed: {}", e)))??;

        self.context = Some(ctx);
        info!("Whisper model loaded");
        Ok(())
    }

    pub fn unload_model(&mut self) {
        if self.context.is_some() {
            info!("Unloading whisper model");
            self.context = None;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.context.is_some()
    }

    /// Transcribe a captured phrase. `NoSpeech` when whisper produces no
    /// text, `Recognition` on engine failures.
    pub async fn transcribe(&mut self, audio_path: &Path) -> Result<String, BanterError> {
        info!("Transcribing: {}", audio_path.display());

        if self.context.is_none() {
            self.load_model().await?;
        }

        let samples = self.read_audio(audio_path)?;

        let ctx = self
            .context
            .as_ref()
            .ok_or_else(|| BanterError::Recognition("Model not loaded".to_string()))?;

        let mut state = ctx
            .create_state()
            .map_err(|e| BanterError::Recognition(format!("Failed to create whisper state: {}", e)))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if let Some(ref lang) = self.config.language {
            params.set_language(Some(lang));
        }

        let threads = self.config.threads.unwrap_or_else(|| {
            let cpus = num_cpus::get() as u32;
            std::cmp::max(1, std::cmp::min(8, cpus.saturating_sub(2)))
        });
        params.set_n_threads(threads as i32);

        // Low temperature for deterministic output
        params.set_temperature(0.2);

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &samples)
            .map_err(|e| BanterError::Recognition(format!("Whisper transcription failed: {}", e)))?;

        let num_segments = state.full_n_segments();

        let mut text = String::new();
        for i in 0..num_segments {
            if let Some(segment) = state.get_segment(i) {
                if let Ok(segment_text) = segment.to_str() {
                    text.push_str(segment_text);
                }
            }
        }

        let result = text.trim().to_string();
        if result.is_empty() {
            return Err(BanterError::NoSpeech);
        }

        info!("Transcription completed: {} chars", result.len());
        Ok(result)
    }

    fn read_audio(&self, audio_path: &Path) -> Result<Vec<f32>, BanterError> {
        let reader = hound::WavReader::open(audio_path).map_err(|e| {
            BanterError::Recognition(format!(
                "Failed to open WAV file {}: {}",
                audio_path.display(),
                e
            ))
        })?;

        let spec = reader.spec();
        debug!(
            "WAV: {} Hz, {} channels, {:?}, {} bits",
            spec.sample_rate, spec.channels, spec.sample_format, spec.bits_per_sample
        );

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .filter_map(|s| s.ok())
                .collect(),
            hound::SampleFormat::Int => {
                let max_val = (1 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .filter_map(|s| s.ok())
                    .map(|s| s as f32 / max_val)
                    .collect()
            }
        };

        // Convert to mono if stereo
        let mono = if spec.channels > 1 {
            samples
                .chunks(spec.channels as usize)
                .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
                .collect()
        } else {
            samples
        };

        // Whisper wants 16kHz
        let resampled = if spec.sample_rate != 16000 {
            warn!(
                "Audio is {} Hz, resampling to 16000 Hz (simple linear)",
                spec.sample_rate
            );
            resample(&mono, spec.sample_rate, 16000)
        } else {
            mono
        };

        debug!("Audio loaded: {} samples at 16kHz", resampled.len());
        Ok(resampled)
    }
}

fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (input.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 * ratio;
        let idx = src_idx as usize;
        let frac = src_idx - idx as f64;

        let sample = if idx + 1 < input.len() {
            input[idx] as f64 * (1.0 - frac) + input[idx + 1] as f64 * frac
        } else if idx < input.len() {
            input[idx] as f64
        } else {
            0.0
        };

        output.push(sample as f32);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(models_dir: &Path) -> TranscriptionConfig {
        TranscriptionConfig {
            model: "base".to_string(),
            models_dir: models_dir.to_string_lossy().to_string(),
            language: Some("en".to_string()),
            threads: None,
        }
    }

    #[test]
    fn test_validate_model_name_known() {
        for name in KNOWN_MODELS {
            assert!(validate_model_name(name).is_ok());
        }
    }

    #[test]
    fn test_validate_model_name_empty() {
        assert!(validate_model_name("").is_err());
    }

    #[test]
    fn test_validate_model_name_path_traversal() {
        assert!(validate_model_name("../evil").is_err());
        assert!(validate_model_name("a/b").is_err());
        assert!(validate_model_name("a\\b").is_err());
    }

    #[test]
    fn test_transcriber_new_builds_model_path() {
        let temp = TempDir::new().unwrap();
        let t = Transcriber::new(&test_config(temp.path())).unwrap();
        assert!(t.model_path.ends_with("ggml-base.bin"));
        assert!(!t.is_loaded());
    }

    #[test]
    fn test_transcriber_rejects_traversal_models_dir() {
        let mut config = test_config(Path::new("/tmp"));
        config.models_dir = "/tmp/../etc".to_string();
        assert!(Transcriber::new(&config).is_err());
    }

    #[test]
    fn test_resample_identity() {
        let input = vec![0.0, 0.5, 1.0, 0.5];
        let output = resample(&input, 16000, 16000);
        assert_eq!(output.len(), input.len());
        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_downsamples_by_half() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let output = resample(&input, 32000, 16000);
        assert_eq!(output.len(), 50);
        // Linear interpolation keeps the ramp monotonic.
        for pair in output.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_read_audio_int_samples_normalized() {
        let temp = TempDir::new().unwrap();
        let wav_path = temp.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
        for _ in 0..160 {
            writer.write_sample(i16::MAX as i32).unwrap();
        }
        writer.finalize().unwrap();

        let t = Transcriber::new(&test_config(temp.path())).unwrap();
        let samples = t.read_audio(&wav_path).unwrap();
        assert_eq!(samples.len(), 160);
        assert!(samples.iter().all(|s| (*s - 1.0).abs() < 0.01));
    }
}
