//! WAV encoding for 16-bit PCM.

use std::io::Write;

use crate::frame::Frame;

const BITS_PER_SAMPLE: u16 = 16;

/// Encode interleaved `samples` as a RIFF/WAVE file.
pub fn encode_wav(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
    let channels = channels.max(1);
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let data_size = (samples.len() * 2) as u32;

    let mut buf = Vec::with_capacity(44 + samples.len() * 2);
    write_riff_header(&mut buf, data_size);
    write_fmt_chunk(&mut buf, channels, sample_rate, block_align);
    write_data_chunk(&mut buf, samples, data_size);
    buf
}

/// Encode stereo frames.
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Vec<u8> {
    let interleaved: Vec<f32> = frames.iter().flat_map(|f| [f.left, f.right]).collect();
    encode_wav(&interleaved, 2, sample_rate)
}

pub fn write_wav(
    w: &mut impl Write,
    frames: &[Frame],
    sample_rate: u32,
) -> std::io::Result<()> {
    w.write_all(&frames_to_wav(frames, sample_rate))
}

fn write_riff_header(buf: &mut Vec<u8>, data_size: u32) {
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
}

fn write_fmt_chunk(buf: &mut Vec<u8>, channels: u16, sample_rate: u32, block_align: u16) {
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
}

fn write_data_chunk(buf: &mut Vec<u8>, samples: &[f32], data_size: u32) {
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_describes_stream() {
        let wav = encode_wav(&[0.0, 1.0, -1.0], 1, 8000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 36 + 6);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 8000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(wav.len(), 44 + 6);
    }

    #[test]
    fn samples_are_clipped_to_pcm() {
        let wav = encode_wav(&[2.0, -1.0], 2, 44100);
        assert_eq!(i16::from_le_bytes([wav[44], wav[45]]), 32767);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), -32767);
    }

    #[test]
    fn stereo_frames_interleave() {
        let wav = frames_to_wav(&[Frame { left: 0.5, right: 0.0 }], 44100);
        assert_eq!(wav.len(), 48);
        assert_eq!(u16::from_le_bytes([wav[32], wav[33]]), 4);
    }
}
