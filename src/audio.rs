use hound::WavWriter;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{AudioConfig, CaptureConfig};
use crate::error::BanterError;

/// RMS window length fed to the phrase detector.
const WINDOW_MS: u64 = 50;

/// Speech must rise at least this factor above the calibrated ambient level.
const AMBIENT_FACTOR: f32 = 2.5;

/// Absolute floor for the onset threshold; typical mic RMS is 0.001-0.1.
const SPEECH_RMS_FLOOR: f32 = 0.008;

/// Extra wall-clock slack before the capture gives up outright.
const DEADLINE_SLACK_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep feeding windows.
    Continue,
    /// No speech started within the listening window.
    Timeout,
    /// A phrase was captured (trailing silence or max duration reached).
    Complete,
}

enum DetectorState {
    Calibrating {
        elapsed_ms: u64,
        rms_sum: f32,
        windows: u32,
    },
    Waiting {
        elapsed_ms: u64,
        threshold: f32,
    },
    InPhrase {
        elapsed_ms: u64,
        silence_ms: u64,
        threshold: f32,
    },
}

/// Endpointing state machine for one spoken phrase. Calibrates an ambient
/// noise level for a fixed short duration, then waits for speech onset up to
/// the listen timeout, then tracks the phrase until trailing silence or the
/// maximum phrase duration.
///
/// Pure with respect to audio plumbing: it only ever sees RMS values for
/// fixed-length windows, which keeps every timing rule unit-testable.
pub struct PhraseDetector {
    window_ms: u64,
    calibration_ms: u64,
    listen_timeout_ms: u64,
    max_phrase_ms: u64,
    trailing_silence_ms: u64,
    state: DetectorState,
}

impl PhraseDetector {
    pub fn new(capture: &CaptureConfig) -> Self {
        Self::with_window(capture, WINDOW_MS)
    }

    pub fn with_window(capture: &CaptureConfig, window_ms: u64) -> Self {
        let state = if capture.calibration_ms == 0 {
            DetectorState::Waiting {
                elapsed_ms: 0,
                threshold: SPEECH_RMS_FLOOR,
            }
        } else {
            DetectorState::Calibrating {
                elapsed_ms: 0,
                rms_sum: 0.0,
                windows: 0,
            }
        };

        Self {
            window_ms,
            calibration_ms: capture.calibration_ms,
            listen_timeout_ms: capture.listen_timeout_secs * 1000,
            max_phrase_ms: capture.max_phrase_secs * 1000,
            trailing_silence_ms: capture.trailing_silence_ms,
            state,
        }
    }

    /// Feed the RMS of the next window and advance the state machine.
    pub fn push_window(&mut self, rms: f32) -> Verdict {
        match self.state {
            DetectorState::Calibrating {
                elapsed_ms,
                rms_sum,
                windows,
            } => {
                let elapsed_ms = elapsed_ms + self.window_ms;
                let rms_sum = rms_sum + rms;
                let windows = windows + 1;
                if elapsed_ms >= self.calibration_ms {
                    let ambient = rms_sum / windows as f32;
                    let threshold = (ambient * AMBIENT_FACTOR).max(SPEECH_RMS_FLOOR);
                    debug!("Calibrated ambient {:.5}, onset threshold {:.5}", ambient, threshold);
                    self.state = DetectorState::Waiting {
                        elapsed_ms: 0,
                        threshold,
                    };
                } else {
                    self.state = DetectorState::Calibrating {
                        elapsed_ms,
                        rms_sum,
                        windows,
                    };
                }
                Verdict::Continue
            }
            DetectorState::Waiting {
                elapsed_ms,
                threshold,
            } => {
                if rms >= threshold {
                    self.state = DetectorState::InPhrase {
                        elapsed_ms: self.window_ms,
                        silence_ms: 0,
                        threshold,
                    };
                    return Verdict::Continue;
                }
                let elapsed_ms = elapsed_ms + self.window_ms;
                if elapsed_ms >= self.listen_timeout_ms {
                    return Verdict::Timeout;
                }
                self.state = DetectorState::Waiting {
                    elapsed_ms,
                    threshold,
                };
                Verdict::Continue
            }
            DetectorState::InPhrase {
                elapsed_ms,
                silence_ms,
                threshold,
            } => {
                let elapsed_ms = elapsed_ms + self.window_ms;
                let silence_ms = if rms < threshold {
                    silence_ms + self.window_ms
                } else {
                    0
                };
                if silence_ms >= self.trailing_silence_ms || elapsed_ms >= self.max_phrase_ms {
                    return Verdict::Complete;
                }
                self.state = DetectorState::InPhrase {
                    elapsed_ms,
                    silence_ms,
                    threshold,
                };
                Verdict::Continue
            }
        }
    }

    /// True once speech onset has been detected for the current phrase.
    pub fn in_phrase(&self) -> bool {
        matches!(self.state, DetectorState::InPhrase { .. })
    }
}

/// One-shot microphone capture of a single phrase, written to a temp WAV.
///
/// `capture_phrase` blocks for the duration of the listen; callers run it on
/// a blocking task. Each call opens its own PipeWire stream, so overlapping
/// captures from rapid toggling fail independently rather than interfering.
pub struct PhraseRecorder {
    audio: AudioConfig,
    capture: CaptureConfig,
}

impl PhraseRecorder {
    pub fn new(audio: &AudioConfig, capture: &CaptureConfig) -> Self {
        Self {
            audio: audio.clone(),
            capture: capture.clone(),
        }
    }

    /// Listen for one phrase. Returns the WAV path on success,
    /// `CaptureTimeout` when no speech started in time, `Recognition` when
    /// the audio stack fails.
    pub fn capture_phrase(&self) -> Result<PathBuf, BanterError> {
        std::fs::create_dir_all(&self.audio.temp_dir)
            .map_err(|e| BanterError::Recognition(format!("temp dir: {}", e)))?;
        let wav_path = PathBuf::from(&self.audio.temp_dir)
            .join(format!("phrase_{}.wav", Uuid::new_v4()));

        let spec = hound::WavSpec {
            channels: self.audio.channels as u16,
            sample_rate: self.audio.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = WavWriter::create(&wav_path, spec)
            .map_err(|e| BanterError::Recognition(format!("failed to create WAV: {}", e)))?;

        let writer = Arc::new(Mutex::new(Some(writer)));
        let outcome: Arc<Mutex<Option<Verdict>>> = Arc::new(Mutex::new(None));

        info!("Listening for a phrase (mic -> {})", wav_path.display());
        let run_result = run_capture_loop(
            &self.audio,
            &self.capture,
            writer.clone(),
            outcome.clone(),
        );

        // Finalize the WAV regardless of outcome so the temp file is valid.
        if let Ok(mut guard) = writer.lock() {
            if let Some(w) = guard.take() {
                let _ = w.finalize();
            }
        }

        if let Err(e) = run_result {
            let _ = std::fs::remove_file(&wav_path);
            return Err(e);
        }

        let verdict = outcome.lock().ok().and_then(|g| *g);
        match verdict {
            Some(Verdict::Complete) => Ok(wav_path),
            Some(Verdict::Timeout) | None => {
                let _ = std::fs::remove_file(&wav_path);
                Err(BanterError::CaptureTimeout)
            }
            Some(Verdict::Continue) => unreachable!("loop never stores Continue"),
        }
    }
}

fn run_capture_loop(
    audio: &AudioConfig,
    capture: &CaptureConfig,
    writer: Arc<Mutex<Option<WavWriter<BufWriter<std::fs::File>>>>>,
    outcome: Arc<Mutex<Option<Verdict>>>,
) -> Result<(), BanterError> {
    pipewire::init();

    let mainloop = pipewire::main_loop::MainLoop::new(None)
        .map_err(|e| BanterError::Recognition(format!("PipeWire main loop: {:?}", e)))?;
    let context = pipewire::context::Context::new(&mainloop)
        .map_err(|e| BanterError::Recognition(format!("PipeWire context: {:?}", e)))?;
    let core = context
        .connect(None)
        .map_err(|e| BanterError::Recognition(format!("PipeWire connect: {:?}", e)))?;

    let props = pipewire::properties::properties! {
        *pipewire::keys::MEDIA_TYPE => "Audio",
        *pipewire::keys::MEDIA_CATEGORY => "Capture",
        *pipewire::keys::MEDIA_ROLE => "Communication",
    };

    let stream = pipewire::stream::Stream::new(&core, "banter-capture", props)
        .map_err(|e| BanterError::Recognition(format!("PipeWire stream: {:?}", e)))?;

    let audio_params = build_audio_params(audio.sample_rate, audio.channels as u32)?;
    let pod = pipewire::spa::pod::Pod::from_bytes(&audio_params)
        .ok_or_else(|| BanterError::Recognition("bad SPA audio params".to_string()))?;

    let window_samples =
        (audio.sample_rate as usize * WINDOW_MS as usize / 1000) * audio.channels as usize;
    let deadline_ms = capture.calibration_ms
        + capture.listen_timeout_secs * 1000
        + capture.max_phrase_secs * 1000
        + DEADLINE_SLACK_MS;

    struct CaptureState {
        writer: Arc<Mutex<Option<WavWriter<BufWriter<std::fs::File>>>>>,
        outcome: Arc<Mutex<Option<Verdict>>>,
        detector: PhraseDetector,
        window_buf: Vec<f32>,
        window_samples: usize,
        started: Instant,
        deadline_ms: u64,
    }

    let state = CaptureState {
        writer,
        outcome,
        detector: PhraseDetector::new(capture),
        window_buf: Vec::with_capacity(window_samples * 2),
        window_samples,
        started: Instant::now(),
        deadline_ms,
    };

    // Raw pointer for quitting from the process callback (same thread).
    let raw_mainloop = mainloop.as_raw_ptr();

    let _listener = stream
        .add_local_listener_with_user_data(state)
        .process(move |stream, state| {
            let done = |verdict: Verdict, state: &CaptureState| {
                if let Ok(mut guard) = state.outcome.lock() {
                    *guard = Some(verdict);
                }
                unsafe {
                    pipewire::sys::pw_main_loop_quit(raw_mainloop);
                }
            };

            // Wall-clock guard in case the stream starves the detector.
            if state.started.elapsed().as_millis() as u64 > state.deadline_ms {
                done(Verdict::Timeout, state);
                return;
            }

            if let Some(mut buffer) = stream.dequeue_buffer() {
                let datas = buffer.datas_mut();
                if let Some(d) = datas.first_mut() {
                    let chunk = d.chunk();
                    let size = chunk.size() as usize;
                    if size == 0 {
                        return;
                    }
                    if let Some(raw) = d.data() {
                        let audio_bytes = &raw[..size.min(raw.len())];
                        if audio_bytes.as_ptr() as usize % std::mem::align_of::<f32>() != 0 {
                            return; // Skip unaligned buffer
                        }
                        let samples: &[f32] = unsafe {
                            std::slice::from_raw_parts(
                                audio_bytes.as_ptr() as *const f32,
                                audio_bytes.len() / std::mem::size_of::<f32>(),
                            )
                        };
                        state.window_buf.extend_from_slice(samples);

                        while state.window_buf.len() >= state.window_samples {
                            let window: Vec<f32> =
                                state.window_buf.drain(..state.window_samples).collect();
                            let sum_sq: f32 = window.iter().map(|s| s * s).sum();
                            let rms = (sum_sq / window.len() as f32).sqrt();

                            let verdict = state.detector.push_window(rms);

                            // Only phrase audio lands in the WAV; calibration
                            // and pre-onset noise stay out of the recognizer.
                            if state.detector.in_phrase() {
                                if let Ok(mut guard) = state.writer.try_lock() {
                                    if let Some(ref mut w) = *guard {
                                        for &sample in &window {
                                            let _ = w.write_sample(sample);
                                        }
                                    }
                                }
                            }

                            match verdict {
                                Verdict::Continue => {}
                                v => {
                                    done(v, state);
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        })
        .register()
        .map_err(|e| BanterError::Recognition(format!("stream listener: {:?}", e)))?;

    stream
        .connect(
            pipewire::spa::utils::Direction::Input,
            None,
            pipewire::stream::StreamFlags::AUTOCONNECT
                | pipewire::stream::StreamFlags::MAP_BUFFERS
                | pipewire::stream::StreamFlags::RT_PROCESS,
            &mut [pod],
        )
        .map_err(|e| BanterError::Recognition(format!("stream connect: {:?}", e)))?;

    debug!("PipeWire phrase capture started");
    mainloop.run();
    debug!("PipeWire phrase capture stopped");

    Ok(())
}

fn build_audio_params(sample_rate: u32, channels: u32) -> Result<Vec<u8>, BanterError> {
    use pipewire::spa::pod::serialize::PodSerializer;
    use pipewire::spa::pod::{Object, Property, PropertyFlags, Value};
    use pipewire::spa::sys;
    use pipewire::spa::utils::Id;

    let bytes = PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &Value::Object(Object {
            type_: pipewire::spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
            id: pipewire::spa::param::ParamType::EnumFormat.as_raw(),
            properties: vec![
                Property {
                    key: sys::SPA_FORMAT_mediaType,
                    flags: PropertyFlags::empty(),
                    value: Value::Id(Id(sys::SPA_MEDIA_TYPE_audio)),
                },
                Property {
                    key: sys::SPA_FORMAT_mediaSubtype,
                    flags: PropertyFlags::empty(),
                    value: Value::Id(Id(sys::SPA_MEDIA_SUBTYPE_raw)),
                },
                Property {
                    key: sys::SPA_FORMAT_AUDIO_format,
                    flags: PropertyFlags::empty(),
                    value: Value::Id(Id(sys::SPA_AUDIO_FORMAT_F32_LE)),
                },
                Property {
                    key: sys::SPA_FORMAT_AUDIO_rate,
                    flags: PropertyFlags::empty(),
                    value: Value::Int(sample_rate as i32),
                },
                Property {
                    key: sys::SPA_FORMAT_AUDIO_channels,
                    flags: PropertyFlags::empty(),
                    value: Value::Int(channels as i32),
                },
            ],
        }),
    )
    .map_err(|e| BanterError::Recognition(format!("serialize audio params: {:?}", e)))?
    .0
    .into_inner();

    Ok(bytes)
}
