/*
 * Meeting Assistant CLI - Rust Edition
 * Copyright (c) 2024 Meeting Assistant Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

//! Canonical 44-byte PCM WAV header construction and parsing.
//!
//! The continuous recorder (spec section 4.3) needs byte-exact control over
//! rewinding and rewriting this header — `hound::WavWriter` only supports
//! append-then-finalize, not "placeholder now, correct header once the
//! final sample count is known" — so the header is built by hand here. The
//! teacher's `audio.rs` reads WAV files with `hound` for playback; this
//! module is the write-side counterpart the teacher never needed.

use std::io::{self, Read, Seek, SeekFrom, Write};

pub const HEADER_LEN: u64 = 44;
const PCM_FORMAT: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    pub fn bytes_per_frame(&self) -> u32 {
        self.channels as u32 * (self.bits_per_sample as u32 / 8)
    }

    /// `(file_size - 44) / bytes_per_sample / sample_rate`, per spec
    /// section 4.7.2's sanitization formula. Uses the header's own
    /// `data_size` rather than a separately-measured file size so a header
    /// that disagrees with the actual file length is detected by the
    /// caller comparing the two, not masked here.
    pub fn duration_seconds(&self) -> f64 {
        let bpf = self.bytes_per_frame();
        if bpf == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.data_size as f64 / bpf as f64 / self.sample_rate as f64
    }
}

/// Builds the 44-byte canonical header for `data_size` bytes of mono/stereo
/// PCM audio.
pub fn build_header(sample_rate: u32, channels: u16, bits_per_sample: u16, data_size: u32) -> [u8; 44] {
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let chunk_size = 36 + data_size;

    let mut header = [0u8; 44];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&PCM_FORMAT.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// Writes a 44-byte placeholder header (`data_size = 0`) so the continuous
/// recorder can start streaming PCM bytes immediately after it, then
/// rewrite the header once the true sample count is known.
pub fn write_placeholder<W: Write>(mut w: W, sample_rate: u32, channels: u16, bits_per_sample: u16) -> io::Result<()> {
    w.write_all(&build_header(sample_rate, channels, bits_per_sample, 0))
}

/// Rewinds to the start of `f` and overwrites the header with the true
/// sample count. No zero-padding: `data_size` is exactly `num_samples *
/// bytes_per_frame`.
pub fn rewrite_header<F: Write + Seek>(
    mut f: F,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    num_samples: u64,
) -> io::Result<()> {
    let bytes_per_frame = channels as u64 * (bits_per_sample as u64 / 8);
    let data_size = (num_samples * bytes_per_frame) as u32;
    f.seek(SeekFrom::Start(0))?;
    f.write_all(&build_header(sample_rate, channels, bits_per_sample, data_size))?;
    Ok(())
}

/// Parses the 44-byte header at the start of a RIFF/WAVE/fmt/data PCM file.
pub fn read_header<R: Read>(mut r: R) -> io::Result<WavHeader> {
    let mut buf = [0u8; 44];
    r.read_exact(&mut buf)?;
    parse_header(&buf)
}

pub fn parse_header(buf: &[u8; 44]) -> io::Result<WavHeader> {
    if &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" || &buf[12..16] != b"fmt " || &buf[36..40] != b"data" {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not a canonical PCM WAV header"));
    }
    let channels = u16::from_le_bytes([buf[22], buf[23]]);
    let sample_rate = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
    let bits_per_sample = u16::from_le_bytes([buf[34], buf[35]]);
    let data_size = u32::from_le_bytes([buf[40], buf[41], buf[42], buf[43]]);
    Ok(WavHeader {
        sample_rate,
        channels,
        bits_per_sample,
        data_size,
    })
}

/// Reads the header from a file path and returns it alongside the true
/// on-disk file size (used by sanitization, which compares the declared
/// `data_size` against what's actually there).
pub fn read_header_from_path(path: &std::path::Path) -> io::Result<(WavHeader, u64)> {
    let mut file = std::fs::File::open(path)?;
    let header = read_header(&mut file)?;
    let file_size = file.metadata()?.len();
    Ok((header, file_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trips_for_various_sample_counts() {
        for samples in [0u64, 1, 16000, 16000 * 5] {
            let mut buf = Vec::new();
            write_placeholder(&mut buf, 16000, 1, 16).unwrap();
            buf.extend(std::iter::repeat(0u8).take((samples * 2) as usize));

            let mut cursor = Cursor::new(buf);
            rewrite_header(&mut cursor, 16000, 1, 16, samples).unwrap();

            let bytes = cursor.into_inner();
            assert_eq!(bytes.len() as u64, HEADER_LEN + samples * 2);

            let header = parse_header(bytes[0..44].try_into().unwrap()).unwrap();
            assert_eq!(header.sample_rate, 16000);
            assert_eq!(header.channels, 1);
            assert_eq!(header.bits_per_sample, 16);
            assert_eq!(header.data_size as u64, samples * 2);
        }
    }

    #[test]
    fn duration_seconds_matches_plan() {
        let header = WavHeader {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
            data_size: 16000 * 2 * 5, // 5 seconds
        };
        assert!((header.duration_seconds() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_wav_bytes() {
        let buf = [0u8; 44];
        assert!(parse_header(&buf).is_err());
    }
}
