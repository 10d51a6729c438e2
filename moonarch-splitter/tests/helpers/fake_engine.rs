//! Separation engines for tests
//!
//! `WavEngine` behaves like the real engine: it writes
//! `<output_dir>/<input basename>/<stem>.wav` as genuine WAV files. The
//! input basename is the staged upload id, never the client filename.

use async_trait::async_trait;
use moonarch_splitter::models::StemConfig;
use moonarch_splitter::services::{EngineError, StemEngine};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Write a short mono sine wave
pub fn write_sine_wav(path: &Path, frequency: f32) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for n in 0..800 {
        let t = n as f32 / spec.sample_rate as f32;
        let sample = (t * frequency * 2.0 * std::f32::consts::PI).sin() * 0.5;
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Engine that writes one WAV per stem
#[derive(Default)]
pub struct WavEngine {
    /// Write stem files with capitalized names ("Vocals.wav")
    pub capitalized_stems: bool,
    calls: AtomicUsize,
}

impl WavEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capitalized() -> Self {
        Self {
            capitalized_stems: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StemEngine for WavEngine {
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        stem_config: StemConfig,
    ) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !input.exists() {
            return Err(EngineError::InputNotFound(input.display().to_string()));
        }

        let basename = input
            .file_stem()
            .ok_or_else(|| EngineError::SeparationFailed("input has no basename".to_string()))?;
        let target = output_dir.join(basename);
        std::fs::create_dir_all(&target)?;

        for (i, stem) in stem_config.stem_names().iter().enumerate() {
            let file_name = if self.capitalized_stems {
                let mut chars = stem.chars();
                match chars.next() {
                    Some(first) => format!("{}{}.wav", first.to_ascii_uppercase(), chars.as_str()),
                    None => continue,
                }
            } else {
                format!("{}.wav", stem)
            };
            write_sine_wav(&target.join(file_name), 220.0 * (i + 1) as f32)
                .map_err(|e| EngineError::SeparationFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-wav"
    }
}

/// Engine that always reports failure
pub struct FailingEngine;

#[async_trait]
impl StemEngine for FailingEngine {
    async fn separate(&self, _: &Path, _: &Path, _: StemConfig) -> Result<(), EngineError> {
        Err(EngineError::SeparationFailed("model exploded".to_string()))
    }

    fn name(&self) -> &str {
        "fake-failing"
    }
}

/// Engine that panics mid-separation
pub struct PanickingEngine;

#[async_trait]
impl StemEngine for PanickingEngine {
    async fn separate(&self, _: &Path, _: &Path, _: StemConfig) -> Result<(), EngineError> {
        panic!("engine crashed");
    }

    fn name(&self) -> &str {
        "fake-panicking"
    }
}

/// Engine that waits for `release()` before writing its output
pub struct GatedEngine {
    gate: Arc<Notify>,
    inner: WavEngine,
}

impl GatedEngine {
    pub fn new() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (
            Self {
                gate: gate.clone(),
                inner: WavEngine::new(),
            },
            gate,
        )
    }
}

#[async_trait]
impl StemEngine for GatedEngine {
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        stem_config: StemConfig,
    ) -> Result<(), EngineError> {
        self.gate.notified().await;
        self.inner.separate(input, output_dir, stem_config).await
    }

    fn name(&self) -> &str {
        "fake-gated"
    }
}

/// Engine that writes its first stem, then parks until `release_one()`
/// before writing the rest
pub struct SteppedEngine {
    gate: Notify,
    parked: AtomicUsize,
}

impl SteppedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            parked: AtomicUsize::new(0),
        })
    }

    /// Jobs that have written part of their output and are waiting
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    pub fn release_one(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl StemEngine for SteppedEngine {
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        stem_config: StemConfig,
    ) -> Result<(), EngineError> {
        let basename = input
            .file_stem()
            .ok_or_else(|| EngineError::SeparationFailed("input has no basename".to_string()))?;
        let target = output_dir.join(basename);
        std::fs::create_dir_all(&target)?;

        for (i, stem) in stem_config.stem_names().iter().enumerate() {
            if i == 1 {
                self.parked.fetch_add(1, Ordering::SeqCst);
                self.gate.notified().await;
            }
            write_sine_wav(&target.join(format!("{}.wav", stem)), 330.0 * (i + 1) as f32)
                .map_err(|e| EngineError::SeparationFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-stepped"
    }
}
