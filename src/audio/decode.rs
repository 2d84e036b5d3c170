use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as PacketBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{FeatureError, Result};

/// Mono PCM samples at their native rate.
///
/// Always non-empty with finite amplitudes and a positive sample rate.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(FeatureError::decode("sample rate must be positive"));
        }
        if samples.is_empty() {
            return Err(FeatureError::decode("audio contains no samples"));
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(FeatureError::decode(format!(
                "non-finite sample at index {index}"
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode an in-memory audio file to mono samples.
///
/// `extension` is an optional container hint such as `"wav"`; probing works
/// without it for most formats.
pub fn decode_bytes(bytes: &[u8], extension: Option<&str>) -> Result<SampleBuffer> {
    let source = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| FeatureError::decode(format!("unrecognized audio format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| FeatureError::decode("no audio tracks found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| FeatureError::decode("unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| FeatureError::decode(format!("unsupported codec: {e}")))?;

    let mut mono: Vec<f32> = Vec::new();
    let mut skipped = 0usize;
    let mut max_channels = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(FeatureError::decode(format!("failed to read packet: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(msg)) => {
                log::warn!("Skipping corrupt packet: {}", msg);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(FeatureError::decode(format!("failed to decode packet: {e}"))),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut packet_buf = PacketBuffer::<f32>::new(num_frames as u64, spec);
        packet_buf.copy_interleaved_ref(decoded);

        // Layout can change between packets; the track header may omit it.
        let channels = spec.channels.count().max(1);
        max_channels = max_channels.max(channels);
        downmix_into(&mut mono, packet_buf.samples(), channels);
    }

    log::debug!(
        "Decoded audio: {} samples, {}Hz, {} channel(s), {} corrupt packet(s) skipped",
        mono.len(),
        sample_rate,
        max_channels,
        skipped
    );

    SampleBuffer::new(mono, sample_rate)
}

/// Average interleaved frames of `channels` samples into `mono`.
fn downmix_into(mono: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        mono.extend_from_slice(interleaved);
        return;
    }
    mono.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
