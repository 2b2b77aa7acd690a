use anyhow::{anyhow, Result};
use rodio::{OutputStream, Sink};
use tracing::{debug, info, warn};
use tts::Tts;

use crate::announcer::Speaker;

#[derive(Debug, Clone)]
pub struct AudioOutputOptions {
    pub enable_tts: bool,
    pub fallback_tone: bool,
}

/// Speech output over the default audio device.
///
/// Prefers the platform TTS engine; when none is available and the fallback
/// tone is enabled, hazards are signalled with a short beep instead so the
/// aid stays audible. Must be constructed on the thread that will use it:
/// the audio output stream cannot cross threads.
pub struct AudioSystem {
    tts: Option<Tts>,
    _output_stream: Option<OutputStream>,
    output_sink: Option<Sink>,
    fallback_tone: bool,
}

impl AudioSystem {
    pub fn new(options: &AudioOutputOptions) -> Result<Self> {
        info!("Initializing audio output");

        let tts = if options.enable_tts {
            match Tts::default() {
                Ok(tts) => {
                    info!("Text-to-speech engine initialized");
                    Some(tts)
                }
                Err(e) => {
                    warn!("Failed to initialize TTS engine: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let (output_stream, output_sink) = if options.fallback_tone {
            match OutputStream::try_default() {
                Ok((stream, handle)) => match Sink::try_new(&handle) {
                    Ok(sink) => (Some(stream), Some(sink)),
                    Err(e) => {
                        warn!("Failed to create audio sink: {}", e);
                        (None, None)
                    }
                },
                Err(e) => {
                    warn!("Failed to open audio output stream: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        if tts.is_none() && output_sink.is_none() {
            warn!("No audio path available; announcements will only be logged");
        }

        Ok(Self {
            tts,
            _output_stream: output_stream,
            output_sink,
            fallback_tone: options.fallback_tone,
        })
    }

    fn speak_tts(&mut self, text: &str) -> Result<()> {
        let tts = self
            .tts
            .as_mut()
            .ok_or_else(|| anyhow!("TTS engine not available"))?;

        tts.speak(text, false)
            .map_err(|e| anyhow!("Text-to-speech failed: {}", e))?;

        // Rendering is blocking by contract: hold the worker until the
        // engine finishes so queued messages never overlap.
        while tts
            .is_speaking()
            .map_err(|e| anyhow!("TTS state query failed: {}", e))?
        {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        debug!("Speech completed");
        Ok(())
    }

    fn play_tone(&self, frequency: f32, duration_ms: u64) -> Result<()> {
        let sink = self
            .output_sink
            .as_ref()
            .ok_or_else(|| anyhow!("Audio output not initialized"))?;

        let sample_rate = 44100u32;
        let total_samples = (duration_ms as f64 * sample_rate as f64 / 1000.0) as usize;
        let mut samples = Vec::with_capacity(total_samples);
        for i in 0..total_samples {
            let t = i as f32 / sample_rate as f32;
            samples.push((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3);
        }

        let source = rodio::buffer::SamplesBuffer::new(1, sample_rate, samples);
        debug!("Playing alert tone: {}Hz for {}ms", frequency, duration_ms);
        sink.append(source);
        sink.sleep_until_end();
        Ok(())
    }
}

impl Speaker for AudioSystem {
    fn speak(&mut self, text: &str) -> Result<()> {
        info!("Speaking: {}", text);

        if self.tts.is_some() {
            return self.speak_tts(text);
        }

        if self.fallback_tone && self.output_sink.is_some() {
            return self.play_tone(880.0, 350);
        }

        warn!("TTS not available, text would be spoken: {}", text);
        Ok(())
    }
}
