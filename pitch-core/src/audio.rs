//! # Audio Capture Module
//!
//! Feeds the detector from a live input device using CPAL
//! (Cross-Platform Audio Library). This is the capture side of the
//! contract: contiguous mono blocks of exactly `buffer_size` 16-bit
//! samples at a stable sample rate.
//!
//! ## Features
//! - Default input device at its default configuration
//! - Any CPAL sample format, converted to i16
//! - Interleaved channels averaged down to mono
//! - Non-blocking hand-off: when the consumer is busy, blocks are dropped
//!   and counted instead of queued

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info, warn};

/// Splits an interleaved sample stream into mono blocks of fixed size.
///
/// Samples that do not fill a whole block yet are kept for the next push,
/// so blocks are contiguous across device callbacks.
#[derive(Debug, Clone)]
pub struct BlockAssembler {
    buffer_size: usize,
    channels: usize,
    pending: Vec<i16>,
}

impl BlockAssembler {
    pub fn new(buffer_size: usize, channels: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            channels: channels.max(1),
            pending: Vec::with_capacity(buffer_size * 2),
        }
    }

    /// Appends interleaved frames and returns every block completed by them.
    ///
    /// A trailing partial frame (fewer samples than channels) is ignored.
    pub fn push_interleaved(&mut self, data: &[i16]) -> Vec<Vec<i16>> {
        let channels = self.channels;
        self.pending.extend(data.chunks_exact(channels).map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        }));

        let mut blocks = Vec::new();
        while self.pending.len() >= self.buffer_size {
            blocks.push(self.pending.drain(..self.buffer_size).collect());
        }
        blocks
    }

    /// Mono samples waiting for the next block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// A running input stream. Dropping it stops capture.
pub struct AudioCapture {
    stream: cpal::Stream,
    sample_rate: u32,
    device_name: String,
    dropped_blocks: Arc<AtomicUsize>,
}

impl AudioCapture {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Blocks discarded because the consumer had not taken the previous ones.
    pub fn dropped_blocks(&self) -> usize {
        self.dropped_blocks.load(Ordering::Relaxed)
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.pause().context("failed to pause the input stream")
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device and its default configuration
/// 2. Converts every callback's samples to mono i16
/// 3. Sends each complete block of `buffer_size` samples through `sender`
///    with `try_send`, so a bounded channel drops blocks instead of
///    stalling the audio thread
///
/// # Returns
/// * `Ok(capture)` - Running stream plus its actual sample rate
/// * `Err(e)` - No device, unsupported format, or stream setup failure
pub fn start_audio_capture(buffer_size: usize, sender: Sender<Vec<i16>>) -> Result<AudioCapture> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;
    let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    info!("Using audio input device: {device_name}");

    let supported = device
        .default_input_config()
        .context("failed to query the default input configuration")?;
    let sample_rate = supported.sample_rate().0;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    info!(
        "Input config: {} Hz, {} channel(s), {:?}",
        sample_rate, config.channels, sample_format
    );

    let assembler = BlockAssembler::new(buffer_size, usize::from(config.channels));
    let dropped_blocks = Arc::new(AtomicUsize::new(0));
    let sink = BlockSink {
        assembler,
        sender,
        dropped_blocks: Arc::clone(&dropped_blocks),
    };

    let stream = match sample_format {
        SampleFormat::I8 => build_stream::<i8>(&device, &config, sink)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, sink)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, sink)?,
        SampleFormat::U8 => build_stream::<u8>(&device, &config, sink)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, sink)?,
        SampleFormat::U32 => build_stream::<u32>(&device, &config, sink)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &config, sink)?,
        SampleFormat::F64 => build_stream::<f64>(&device, &config, sink)?,
        other => return Err(anyhow!("Unsupported sample format {other:?}")),
    };
    stream.play().context("failed to start the input stream")?;

    Ok(AudioCapture {
        stream,
        sample_rate,
        device_name,
        dropped_blocks,
    })
}

/// State owned by the device callback.
struct BlockSink {
    assembler: BlockAssembler,
    sender: Sender<Vec<i16>>,
    dropped_blocks: Arc<AtomicUsize>,
}

impl BlockSink {
    fn push(&mut self, data: &[i16]) {
        for block in self.assembler.push_interleaved(data) {
            match self.sender.try_send(block) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = self.dropped_blocks.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!("analysis busy, dropped block ({dropped} so far)");
                }
                // Receiver gone; the owner is about to drop the stream.
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut sink: BlockSink,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let mut converted: Vec<i16> = Vec::new();
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            converted.clear();
            converted.extend(data.iter().map(|&sample| i16::from_sample(sample)));
            sink.push(&converted);
        },
        |err| warn!("An error occurred on the audio stream: {err}"),
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_blocks_are_contiguous() {
        let mut assembler = BlockAssembler::new(4, 1);
        assert!(assembler.push_interleaved(&[1, 2, 3]).is_empty());
        assert_eq!(assembler.pending(), 3);

        let blocks = assembler.push_interleaved(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(blocks, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn stereo_is_averaged() {
        let mut assembler = BlockAssembler::new(2, 2);
        let blocks = assembler.push_interleaved(&[100, 300, -50, -150, 7]);
        assert_eq!(blocks, vec![vec![200, -100]]);
        // The dangling half frame is not kept.
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut sink = BlockSink {
            assembler: BlockAssembler::new(2, 1),
            sender: tx,
            dropped_blocks: Arc::clone(&dropped),
        };
        sink.push(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(rx.try_recv(), Ok(vec![1, 2]));
        assert_eq!(dropped.load(Ordering::Relaxed), 2);
    }
}
