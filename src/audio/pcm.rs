//! Raw PCM and WAV helpers.
//!
//! The recorder produces **mono 16-bit little-endian PCM at 16 kHz**; the
//! transcriber wants a WAV container and the player accepts either form.

use std::io::Cursor;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Container of an audio byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Headerless mono 16-bit little-endian samples.
    #[default]
    Pcm,
    /// RIFF/WAVE container.
    Wav,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Pcm => "pcm",
            AudioFormat::Wav => "wav",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pcm" => Ok(AudioFormat::Pcm),
            "wav" => Ok(AudioFormat::Wav),
            other => Err(format!("unsupported audio format: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Sample conversion
// ---------------------------------------------------------------------------

/// Clamp `[-1.0, 1.0]` floats to `i16`.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect()
}

pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode little-endian `i16`s; a trailing odd byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Duration in seconds of `byte_len` bytes of mono 16-bit PCM.
pub fn pcm_duration_secs(byte_len: usize, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    (byte_len / 2) as f32 / sample_rate as f32
}

// ---------------------------------------------------------------------------
// WAV
// ---------------------------------------------------------------------------

/// Wrap mono 16-bit PCM in a WAV container.
pub fn encode_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in bytes_to_samples(pcm) {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Mono float samples plus their rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode a WAV file (int or float samples, any channel count) to mono `f32`.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, hound::Error> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(DecodedAudio {
        samples: super::resample::downmix_to_mono(&interleaved, spec.channels),
        sample_rate: spec.sample_rate,
    })
}

/// Decode `bytes` of the given `format`; raw PCM is assumed to be at
/// `pcm_sample_rate`.
pub fn decode(
    bytes: &[u8],
    format: AudioFormat,
    pcm_sample_rate: u32,
) -> Result<DecodedAudio, hound::Error> {
    match format {
        AudioFormat::Wav => decode_wav(bytes),
        AudioFormat::Pcm => Ok(DecodedAudio {
            samples: i16_to_f32(&bytes_to_samples(bytes)),
            sample_rate: pcm_sample_rate,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
