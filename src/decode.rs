//! Decoding recorded impulse responses
//!
//! Any container and codec symphonia is built with (WAV and FLAC here) is
//! decoded to planar `f64` channels. Channel 0 is the omnidirectional (or
//! mono) signal; a first-order spatial recording carries X, Y and Z in
//! channels 1 to 3.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::spatial::{SpatialSignal, SPATIAL_CHANNELS};

/// A decoded multichannel impulse response
#[derive(Debug, Clone)]
pub struct RoomResponse {
    /// Planar samples, one `Vec` per channel, all the same length
    pub channels: Vec<Vec<f64>>,
    pub sample_rate: f64,
}

impl RoomResponse {
    pub fn new(channels: Vec<Vec<f64>>, sample_rate: f64) -> Result<Self> {
        let first = channels
            .first()
            .ok_or_else(|| AnalysisError::invalid("response has no channels"))?;
        if channels.iter().any(|c| c.len() != first.len()) {
            return Err(AnalysisError::invalid("channels differ in length"));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(AnalysisError::invalid(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_s(&self) -> f64 {
        self.len() as f64 / self.sample_rate
    }

    pub fn omni(&self) -> &[f64] {
        self.channels.first().map_or(&[], Vec::as_slice)
    }

    pub fn is_spatial(&self) -> bool {
        self.channels.len() == SPATIAL_CHANNELS
    }

    /// The four channels as a first-order spatial signal
    pub fn spatial(&self) -> Result<SpatialSignal> {
        SpatialSignal::from_channels(&self.channels)
    }
}

fn decode_error(path: &Path, what: &str, e: SymphoniaError) -> AnalysisError {
    AnalysisError::Decode(format!("{}: {}: {}", path.display(), what, e))
}

/// Decode every channel of an audio file
pub fn decode_file(path: &Path) -> Result<RoomResponse> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(path, "unrecognised format", e))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AnalysisError::Decode(format!("{}: no audio track", path.display())))?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
        AnalysisError::Decode(format!("{}: unknown sample rate", path.display()))
    })?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, "unsupported codec", e))?;

    let mut channels: Vec<Vec<f64>> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(decode_error(path, "reading packet", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = %path.display(), error = e, "skipping corrupt packet");
                continue;
            }
            Err(e) => return Err(decode_error(path, "decoding packet", e)),
        };

        let spec = *decoded.spec();
        let count = spec.channels.count();
        if channels.is_empty() {
            channels = vec![Vec::new(); count];
        }
        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks_exact(count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample as f64);
            }
        }
    }

    if channels.first().map_or(true, Vec::is_empty) {
        return Err(AnalysisError::Decode(format!(
            "{}: no samples decoded",
            path.display()
        )));
    }
    debug!(
        path = %path.display(),
        channels = channels.len(),
        frames = channels[0].len(),
        sample_rate,
        "decoded response"
    );
    RoomResponse::new(channels, sample_rate as f64)
}
