use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use log::{error, info};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Answer text shown while a transcription call is in flight.
pub const TRANSCRIBING_PLACEHOLDER: &str = "Transcribing your answer...";

/// Answer text substituted when transcription fails (fail-soft: the user is
/// never left stuck in a transcribing state).
pub const TRANSCRIPTION_ERROR_TEXT: &str = "Error transcribing audio. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Transcribing,
    Ready,
}

/// One finished capture, encoded as WAV.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub wav_bytes: Vec<u8>,
    pub duration_secs: u32,
    pub file_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("could not access microphone: {0}")]
    Microphone(String),
    #[error("operation not valid while {0:?}")]
    InvalidState(RecorderState),
}

/// Hosted speech-to-text boundary.
#[async_trait]
pub trait TranscriptionApi: Send + Sync {
    async fn transcribe(&self, clip: AudioClip) -> Result<String>;
}

/// Audio capture boundary. The production implementation is
/// [`CpalMicrophone`]; tests substitute scripted sources.
pub trait MicrophoneSource: Send {
    fn start(&mut self) -> Result<(), RecorderError>;
    fn stop(&mut self) -> Result<AudioClip, RecorderError>;
}

struct RecorderShared {
    state: RecorderState,
    answer_text: String,
    recording_seconds: u32,
    playback_seconds: u32,
    playing: bool,
    clip: Option<AudioClip>,
    generation: u64,
}

/// Spoken/typed answer capture with the state machine
/// `Idle -> Recording -> Transcribing -> Ready` (typed answers jump straight
/// to `Ready`; reset returns to `Idle`).
///
/// Elapsed-time counters run as one-second interval tasks and are aborted on
/// every state-exit path. The in-flight transcription call is not cancelled
/// on reset; instead its result is discarded when the generation counter no
/// longer matches.
pub struct ResponseRecorder {
    shared: Arc<Mutex<RecorderShared>>,
    api: Arc<dyn TranscriptionApi>,
    mic: Box<dyn MicrophoneSource>,
    recording_timer: Option<JoinHandle<()>>,
    playback_timer: Option<JoinHandle<()>>,
    transcription: Option<JoinHandle<()>>,
}

impl ResponseRecorder {
    pub fn new(api: Arc<dyn TranscriptionApi>, mic: Box<dyn MicrophoneSource>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(RecorderShared {
                state: RecorderState::Idle,
                answer_text: String::new(),
                recording_seconds: 0,
                playback_seconds: 0,
                playing: false,
                clip: None,
                generation: 0,
            })),
            api,
            mic,
            recording_timer: None,
            playback_timer: None,
            transcription: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.shared.lock().state
    }

    pub fn answer_text(&self) -> String {
        self.shared.lock().answer_text.clone()
    }

    pub fn recording_seconds(&self) -> u32 {
        self.shared.lock().recording_seconds
    }

    pub fn playback_seconds(&self) -> u32 {
        self.shared.lock().playback_seconds
    }

    pub fn is_playing(&self) -> bool {
        self.shared.lock().playing
    }

    pub fn clip(&self) -> Option<AudioClip> {
        self.shared.lock().clip.clone()
    }

    /// Begin capturing. On device or permission failure the error is returned
    /// and the recorder stays `Idle`.
    pub fn start_recording(&mut self) -> Result<(), RecorderError> {
        {
            let shared = self.shared.lock();
            if shared.state != RecorderState::Idle {
                return Err(RecorderError::InvalidState(shared.state));
            }
        }

        self.mic.start()?;

        {
            let mut shared = self.shared.lock();
            shared.state = RecorderState::Recording;
            shared.recording_seconds = 0;
        }

        let shared = Arc::clone(&self.shared);
        self.recording_timer = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            tick.tick().await; // first tick completes immediately
            loop {
                tick.tick().await;
                shared.lock().recording_seconds += 1;
            }
        }));

        Ok(())
    }

    /// Finalize the capture, release the device and hand the clip to the
    /// transcription endpoint. Transitions to `Transcribing`; the spawned
    /// call moves the recorder to `Ready` whether or not it succeeds.
    pub fn stop_recording(&mut self) -> Result<(), RecorderError> {
        {
            let shared = self.shared.lock();
            if shared.state != RecorderState::Recording {
                return Err(RecorderError::InvalidState(shared.state));
            }
        }
        if let Some(timer) = self.recording_timer.take() {
            timer.abort();
        }

        let clip = match self.mic.stop() {
            Ok(clip) => clip,
            Err(e) => {
                self.shared.lock().state = RecorderState::Idle;
                return Err(e);
            }
        };

        let generation = {
            let mut shared = self.shared.lock();
            shared.state = RecorderState::Transcribing;
            shared.answer_text = TRANSCRIBING_PLACEHOLDER.to_string();
            shared.clip = Some(clip.clone());
            shared.generation
        };

        let shared = Arc::clone(&self.shared);
        let api = Arc::clone(&self.api);
        self.transcription = Some(tokio::spawn(async move {
            let result = api.transcribe(clip).await;
            let mut shared = shared.lock();
            if shared.generation != generation {
                info!("discarding stale transcription result");
                return;
            }
            match result {
                Ok(text) => shared.answer_text = text,
                Err(e) => {
                    error!("transcription failed: {e:#}");
                    shared.answer_text = TRANSCRIPTION_ERROR_TEXT.to_string();
                }
            }
            shared.state = RecorderState::Ready;
        }));

        Ok(())
    }

    /// Wait for an in-flight transcription to settle. Used by sequential
    /// drivers; the state machine itself does not require it.
    pub async fn wait_for_transcription(&mut self) {
        if let Some(task) = self.transcription.take() {
            let _ = task.await;
        }
    }

    /// Typed-answer path: `Idle -> Ready` without any capture.
    pub fn set_typed_answer(&mut self, text: &str) {
        let mut shared = self.shared.lock();
        shared.answer_text = text.to_string();
        shared.clip = None;
        shared.state = RecorderState::Ready;
    }

    /// Toggle playback of the captured clip. Position advances once per
    /// second, resets to zero on stop and at end-of-clip.
    pub fn toggle_playback(&mut self) {
        let (playing, duration) = {
            let shared = self.shared.lock();
            (shared.playing, shared.clip.as_ref().map(|c| c.duration_secs))
        };

        if playing {
            if let Some(timer) = self.playback_timer.take() {
                timer.abort();
            }
            let mut shared = self.shared.lock();
            shared.playing = false;
            shared.playback_seconds = 0;
            return;
        }

        let Some(duration) = duration else { return };
        {
            let mut shared = self.shared.lock();
            shared.playing = true;
            shared.playback_seconds = 0;
        }

        let shared = Arc::clone(&self.shared);
        self.playback_timer = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            tick.tick().await;
            loop {
                tick.tick().await;
                let mut shared = shared.lock();
                if !shared.playing {
                    break;
                }
                shared.playback_seconds += 1;
                if shared.playback_seconds >= duration {
                    shared.playing = false;
                    shared.playback_seconds = 0;
                    break;
                }
            }
        }));
    }

    /// Clear answer text, counters and the captured clip; return to `Idle`.
    /// Any transcription still in flight becomes stale and is discarded.
    pub fn reset_recording(&mut self) {
        if let Some(timer) = self.recording_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.playback_timer.take() {
            timer.abort();
        }

        let mut shared = self.shared.lock();
        shared.generation += 1;
        shared.state = RecorderState::Idle;
        shared.answer_text.clear();
        shared.recording_seconds = 0;
        shared.playback_seconds = 0;
        shared.playing = false;
        shared.clip = None;
    }

    pub fn formatted_recording_time(&self) -> String {
        format_time(self.recording_seconds())
    }

    pub fn formatted_playback_time(&self) -> String {
        format_time(self.playback_seconds())
    }
}

impl Drop for ResponseRecorder {
    fn drop(&mut self) {
        for timer in [
            self.recording_timer.take(),
            self.playback_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.abort();
        }
    }
}

/// MM:SS display format.
pub fn format_time(total_seconds: u32) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

type CaptureSpec = (u32, u16); // sample rate, channel count

/// Default-input-device capture. The `cpal::Stream` is owned by a dedicated
/// thread (it is not `Send`); samples accumulate as interleaved i16 and are
/// WAV-encoded when capture stops.
pub struct CpalMicrophone {
    samples: Arc<Mutex<Vec<i16>>>,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
    spec: Option<CaptureSpec>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self {
            samples: Arc::new(Mutex::new(Vec::new())),
            stop_tx: None,
            worker: None,
            spec: None,
        }
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrophoneSource for CpalMicrophone {
    fn start(&mut self) -> Result<(), RecorderError> {
        let samples = Arc::new(Mutex::new(Vec::new()));
        self.samples = Arc::clone(&samples);

        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        self.worker = Some(thread::spawn(move || {
            capture_loop(samples, stop_rx, ready_tx);
        }));
        self.stop_tx = Some(stop_tx);

        match ready_rx.recv() {
            Ok(Ok(spec)) => {
                self.spec = Some(spec);
                Ok(())
            }
            Ok(Err(message)) => {
                if let Some(worker) = self.worker.take() {
                    let _ = worker.join();
                }
                self.stop_tx = None;
                Err(RecorderError::Microphone(message))
            }
            Err(_) => {
                self.worker = None;
                self.stop_tx = None;
                Err(RecorderError::Microphone(
                    "capture thread exited unexpectedly".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) -> Result<AudioClip, RecorderError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        let (sample_rate, channels) = self
            .spec
            .take()
            .ok_or_else(|| RecorderError::Microphone("no active capture".to_string()))?;
        let samples = std::mem::take(&mut *self.samples.lock());
        let frames_per_sec = (sample_rate * channels as u32).max(1);
        let duration_secs = samples.len() as u32 / frames_per_sec;

        let wav_bytes = encode_wav(&samples, sample_rate, channels)
            .map_err(|e| RecorderError::Microphone(e.to_string()))?;
        Ok(AudioClip {
            wav_bytes,
            duration_secs,
            file_name: "recording.wav".to_string(),
        })
    }
}

fn capture_loop(
    samples: Arc<Mutex<Vec<i16>>>,
    stop_rx: mpsc::Receiver<()>,
    ready_tx: mpsc::Sender<Result<CaptureSpec, String>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err("no default input device".to_string()));
        return;
    };
    let supported = match device.default_input_config() {
        Ok(config) => config,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("input config unavailable: {e}")));
            return;
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.config();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    let err_fn = |e: cpal::StreamError| error!("audio input stream error: {e}");
    let sink = samples;
    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut buffer = sink.lock();
                buffer.extend(
                    data.iter()
                        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                );
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                sink.lock().extend_from_slice(data);
            },
            err_fn,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(format!("unsupported sample format: {other:?}")));
            return;
        }
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("could not open input stream: {e}")));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("could not start input stream: {e}")));
        return;
    }

    let _ = ready_tx.send(Ok((sample_rate, channels)));
    // Block until stop is requested (or the recorder is dropped).
    let _ = stop_rx.recv();
    drop(stream);
}

fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedMicrophone {
        fail_start: bool,
    }

    impl MicrophoneSource for ScriptedMicrophone {
        fn start(&mut self) -> Result<(), RecorderError> {
            if self.fail_start {
                Err(RecorderError::Microphone("permission denied".to_string()))
            } else {
                Ok(())
            }
        }

        fn stop(&mut self) -> Result<AudioClip, RecorderError> {
            Ok(AudioClip {
                wav_bytes: vec![0; 64],
                duration_secs: 3,
                file_name: "recording.wav".to_string(),
            })
        }
    }

    struct ScriptedTranscription {
        result: Result<String, String>,
        delay: Duration,
    }

    #[async_trait]
    impl TranscriptionApi for ScriptedTranscription {
        async fn transcribe(&self, _clip: AudioClip) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            self.result
                .clone()
                .map_err(|message| anyhow::anyhow!(message))
        }
    }

    fn recorder(
        result: Result<String, String>,
        delay: Duration,
        fail_start: bool,
    ) -> ResponseRecorder {
        ResponseRecorder::new(
            Arc::new(ScriptedTranscription { result, delay }),
            Box::new(ScriptedMicrophone { fail_start }),
        )
    }

    #[tokio::test]
    async fn typed_answer_goes_straight_to_ready() {
        let mut recorder = recorder(Ok("unused".to_string()), Duration::ZERO, false);
        assert_eq!(recorder.state(), RecorderState::Idle);

        recorder.set_typed_answer("I led my team.");
        assert_eq!(recorder.state(), RecorderState::Ready);
        assert_eq!(recorder.answer_text(), "I led my team.");

        recorder.reset_recording();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.answer_text().is_empty());
    }

    #[tokio::test]
    async fn microphone_failure_leaves_recorder_idle() {
        let mut recorder = recorder(Ok("unused".to_string()), Duration::ZERO, true);
        let error = recorder.start_recording().unwrap_err();
        assert!(matches!(error, RecorderError::Microphone(_)));
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[tokio::test]
    async fn successful_recording_transcribes_to_ready() {
        let mut recorder = recorder(Ok("I led my team.".to_string()), Duration::ZERO, false);
        recorder.start_recording().unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);

        recorder.stop_recording().unwrap();
        assert_eq!(recorder.state(), RecorderState::Transcribing);
        assert_eq!(recorder.answer_text(), TRANSCRIBING_PLACEHOLDER);

        recorder.wait_for_transcription().await;
        assert_eq!(recorder.state(), RecorderState::Ready);
        assert_eq!(recorder.answer_text(), "I led my team.");
        assert!(recorder.clip().is_some());
    }

    #[tokio::test]
    async fn failed_transcription_still_reaches_ready() {
        let mut recorder = recorder(Err("bad gateway".to_string()), Duration::ZERO, false);
        recorder.start_recording().unwrap();
        recorder.stop_recording().unwrap();
        recorder.wait_for_transcription().await;

        assert_eq!(recorder.state(), RecorderState::Ready);
        assert_eq!(recorder.answer_text(), TRANSCRIPTION_ERROR_TEXT);
    }

    #[tokio::test]
    async fn reset_discards_stale_transcription() {
        let mut recorder = recorder(
            Ok("late transcript".to_string()),
            Duration::from_millis(50),
            false,
        );
        recorder.start_recording().unwrap();
        recorder.stop_recording().unwrap();

        // Reset while the transcription call is still in flight.
        recorder.reset_recording();
        recorder.wait_for_transcription().await;

        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.answer_text().is_empty());
    }

    #[tokio::test]
    async fn stop_without_recording_is_rejected() {
        let mut recorder = recorder(Ok("unused".to_string()), Duration::ZERO, false);
        let error = recorder.stop_recording().unwrap_err();
        assert!(matches!(
            error,
            RecorderError::InvalidState(RecorderState::Idle)
        ));
    }

    #[test]
    fn format_time_renders_mm_ss() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(59), "00:59");
        assert_eq!(format_time(61), "01:01");
        assert_eq!(format_time(600), "10:00");
    }

    #[test]
    fn wav_encoding_produces_riff_header() {
        let bytes = encode_wav(&[0, 1, -1, 32760], 16_000, 1).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }
}
