//! Conversion of raw fixed-point IQ pairs into normalized complex samples.

use crate::{Error, Sample};

/// Largest supported attenuation shift.
pub const MAX_SHIFT: u8 = 15;

/// Fixed-point encoding of the interleaved IQ pairs in a sample file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Complex signed 8-bit, `I, Q` bytes.
    Ci8,
    /// Complex signed 16-bit, little-endian `I, Q` words.
    #[default]
    Ci16,
}

impl Encoding {
    /// Size of one complete IQ pair, in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Ci8 => 2,
            Self::Ci16 => 4,
        }
    }

    /// Value that maps to 1.0 after normalization.
    pub fn full_scale(self) -> f32 {
        match self {
            Self::Ci8 => 128.0,
            Self::Ci16 => 32768.0,
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ci8 => f.write_str("8-bit IQ"),
            Self::Ci16 => f.write_str("16-bit IQ"),
        }
    }
}

/// Decoding settings, fixed for the lifetime of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeConfig {
    encoding: Encoding,
    shift: u8,
    samples_per_buffer: usize,
}

impl DecodeConfig {
    /// Set up decoding for a file encoding, attenuating by `2^shift`, and
    /// producing buffers of up to `samples_per_buffer` samples.
    pub fn new(encoding: Encoding, shift: u8, samples_per_buffer: usize) -> Result<Self, Error> {
        if shift > MAX_SHIFT {
            return Err(Error::InvalidParameter("shift must be 15 or less"));
        }
        if samples_per_buffer == 0 {
            return Err(Error::InvalidParameter("samples per buffer must be nonzero"));
        }
        Ok(Self {
            encoding,
            shift,
            samples_per_buffer,
        })
    }

    /// The file encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The attenuation shift, in bits.
    pub fn shift(&self) -> u8 {
        self.shift
    }

    /// Maximum number of samples in each buffer.
    pub fn samples_per_buffer(&self) -> usize {
        self.samples_per_buffer
    }

    /// Get a copy with a smaller buffer size. Sizes of 0 are ignored.
    pub(crate) fn clamp_samples_per_buffer(mut self, max: usize) -> Self {
        if max > 0 {
            self.samples_per_buffer = self.samples_per_buffer.min(max);
        }
        self
    }

    /// Build the decoder for this configuration.
    pub fn decoder(&self) -> SampleDecoder {
        SampleDecoder::new(self.encoding, self.shift)
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Ci16,
            shift: 0,
            samples_per_buffer: 10_000,
        }
    }
}

type DecodeFn = fn(&[u8], f32, &mut Vec<Sample>);

/// Converts raw IQ bytes into [`Sample`]s.
///
/// The per-encoding conversion is picked once, when the decoder is built,
/// and the attenuation is folded into the normalization factor. Both the
/// full-scale value and the shift are powers of two, so the result is exactly
/// `v / full_scale / 2^shift`.
#[derive(Clone, Copy)]
pub struct SampleDecoder {
    encoding: Encoding,
    scale: f32,
    decode_fn: DecodeFn,
}

impl SampleDecoder {
    /// Create a decoder for an encoding and attenuation shift.
    ///
    /// # Panics
    /// - If `shift` is greater than [`MAX_SHIFT`].
    pub fn new(encoding: Encoding, shift: u8) -> Self {
        assert!(shift <= MAX_SHIFT);
        let scale = 1.0 / (encoding.full_scale() * (1u32 << shift) as f32);
        let decode_fn: DecodeFn = match encoding {
            Encoding::Ci8 => decode_ci8,
            Encoding::Ci16 => decode_ci16,
        };
        Self {
            encoding,
            scale,
            decode_fn,
        }
    }

    /// The encoding this decoder reads.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Decode every whole sample in `raw`, appending them to `out`. Returns
    /// the number of samples appended.
    ///
    /// Any trailing partial sample is ignored.
    pub fn decode_into(&self, raw: &[u8], out: &mut Vec<Sample>) -> usize {
        let before = out.len();
        (self.decode_fn)(raw, self.scale, out);
        out.len() - before
    }

    /// Decode every whole sample in `raw` into a new vector.
    pub fn decode(&self, raw: &[u8]) -> Vec<Sample> {
        let mut out = Vec::with_capacity(raw.len() / self.encoding.bytes_per_sample());
        self.decode_into(raw, &mut out);
        out
    }
}

impl std::fmt::Debug for SampleDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleDecoder")
            .field("encoding", &self.encoding)
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

fn decode_ci8(raw: &[u8], scale: f32, out: &mut Vec<Sample>) {
    out.extend(
        raw.chunks_exact(2)
            .map(|p| Sample::new(p[0] as i8 as f32 * scale, p[1] as i8 as f32 * scale)),
    );
}

fn decode_ci16(raw: &[u8], scale: f32, out: &mut Vec<Sample>) {
    out.extend(raw.chunks_exact(4).map(|p| {
        let i = i16::from_le_bytes([p[0], p[1]]);
        let q = i16::from_le_bytes([p[2], p[3]]);
        Sample::new(i as f32 * scale, q as f32 * scale)
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ci16_bytes(pairs: &[(i16, i16)]) -> Vec<u8> {
        pairs
            .iter()
            .flat_map(|(i, q)| i.to_le_bytes().into_iter().chain(q.to_le_bytes()))
            .collect()
    }

    #[test]
    fn ci8_every_value() {
        let dec = SampleDecoder::new(Encoding::Ci8, 0);
        for v in i8::MIN..=i8::MAX {
            let raw = [v as u8, v.wrapping_neg() as u8];
            let s = dec.decode(&raw);
            assert_eq!(s.len(), 1);
            assert_eq!(s[0].re, v as f32 / 128.0);
            assert_eq!(s[0].im, v.wrapping_neg() as f32 / 128.0);
        }
    }

    #[test]
    fn ci16_extremes() {
        let dec = SampleDecoder::new(Encoding::Ci16, 0);
        let s = dec.decode(&ci16_bytes(&[(i16::MIN, i16::MAX), (0, -1)]));
        assert_eq!(s[0].re, -1.0);
        assert_eq!(s[0].im, 32767.0 / 32768.0);
        assert_eq!(s[1].re, 0.0);
        assert_eq!(s[1].im, -1.0 / 32768.0);
    }

    #[test]
    fn ci16_known_pair() {
        let dec = SampleDecoder::new(Encoding::Ci16, 0);
        let s = dec.decode(&ci16_bytes(&[(100, -200)]));
        assert!((s[0].re - 0.003052).abs() < 1e-6);
        assert!((s[0].im + 0.006104).abs() < 1e-6);
    }

    #[test]
    fn attenuation_is_a_power_of_two() {
        let raw = ci16_bytes(&[(12345, -321), (i16::MIN, 7)]);
        let base = SampleDecoder::new(Encoding::Ci16, 0).decode(&raw);
        for shift in 0..=4u8 {
            let div = (1u32 << shift) as f32;
            let s = SampleDecoder::new(Encoding::Ci16, shift).decode(&raw);
            for (a, b) in s.iter().zip(&base) {
                assert_eq!(a.re, b.re / div);
                assert_eq!(a.im, b.im / div);
            }
        }

        let raw = [0x80, 0x7f, 0x01, 0xff];
        let base = SampleDecoder::new(Encoding::Ci8, 0).decode(&raw);
        for shift in 0..=4u8 {
            let div = (1u32 << shift) as f32;
            let s = SampleDecoder::new(Encoding::Ci8, shift).decode(&raw);
            for (a, b) in s.iter().zip(&base) {
                assert_eq!(a.re, b.re / div);
                assert_eq!(a.im, b.im / div);
            }
        }
    }

    #[test]
    fn trailing_bytes_dropped() {
        let dec = SampleDecoder::new(Encoding::Ci16, 0);
        let mut raw = ci16_bytes(&[(1, 2), (3, 4)]);
        raw.extend_from_slice(&[9, 9, 9]);
        assert_eq!(dec.decode(&raw).len(), 2);

        let dec = SampleDecoder::new(Encoding::Ci8, 0);
        assert_eq!(dec.decode(&[1, 2, 3]).len(), 1);
        assert!(dec.decode(&[1]).is_empty());
    }

    #[test]
    fn decode_into_appends() {
        let dec = SampleDecoder::new(Encoding::Ci8, 1);
        let mut out = vec![Sample::new(5.0, 5.0)];
        assert_eq!(dec.decode_into(&[64, 192], &mut out), 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], Sample::new(0.25, -0.25));
    }

    #[test]
    fn config_validation() {
        assert!(DecodeConfig::new(Encoding::Ci8, 16, 100).is_err());
        assert!(DecodeConfig::new(Encoding::Ci8, 4, 0).is_err());
        let cfg = DecodeConfig::new(Encoding::Ci8, 4, 100).unwrap();
        assert_eq!(cfg.clamp_samples_per_buffer(64).samples_per_buffer(), 64);
        assert_eq!(cfg.clamp_samples_per_buffer(0).samples_per_buffer(), 100);
        assert_eq!(cfg.decoder().encoding(), Encoding::Ci8);
    }
}
