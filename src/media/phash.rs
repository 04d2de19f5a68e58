//! DCT perceptual hash
//!
//! The image is reduced to 32x32 grayscale, transformed with a 2D DCT-II,
//! and the 8x8 lowest frequencies are thresholded against their median.
//! Bits are packed row-major, most significant first, and rendered as
//! 16 lowercase hex chars.

use std::f64::consts::PI;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::DynamicImage;
use image::imageops::{self, FilterType};

use crate::{Error, Result};

const IMG_SIZE: usize = 32;
const HASH_SIZE: usize = 8;

/// 64-bit perceptual fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Number of differing bits
    #[must_use]
    pub const fn distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Hash an already decoded image
    #[must_use]
    pub fn of_image(image: &DynamicImage) -> Self {
        let gray = image.to_luma8();
        #[allow(clippy::cast_possible_truncation)]
        let small = imageops::resize(
            &gray,
            IMG_SIZE as u32,
            IMG_SIZE as u32,
            FilterType::Lanczos3,
        );

        let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p[0])).collect();
        let coefficients = low_frequency_dct(&pixels);
        let median = median(&coefficients);

        let mut bits = 0u64;
        for (idx, c) in coefficients.iter().enumerate() {
            if *c > median {
                bits |= 1u64 << (63 - idx);
            }
        }
        Self(bits)
    }

    /// Decode and hash encoded image bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a supported image format
    pub fn of_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::of_image(&image))
    }

    /// Decode and hash an image file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or decoded
    pub fn of_file(path: &Path) -> Result<Self> {
        let image = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?;
        Ok(Self::of_image(&image))
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for PerceptualHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Media(format!("invalid perceptual hash: {s}")));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::Media(format!("invalid perceptual hash {s}: {e}")))
    }
}

/// Top-left `HASH_SIZE` x `HASH_SIZE` block of the 2D DCT-II
#[allow(clippy::cast_precision_loss)]
fn low_frequency_dct(pixels: &[f64]) -> Vec<f64> {
    let n = IMG_SIZE as f64;
    let cos: Vec<f64> = (0..HASH_SIZE)
        .flat_map(|k| {
            (0..IMG_SIZE).map(move |x| (PI * (2.0 * x as f64 + 1.0) * k as f64 / (2.0 * n)).cos())
        })
        .collect();
    let basis = |k: usize, x: usize| cos[k * IMG_SIZE + x];

    // Horizontal pass: each row to its first HASH_SIZE frequencies
    let mut rows = vec![0.0; IMG_SIZE * HASH_SIZE];
    for y in 0..IMG_SIZE {
        for k in 0..HASH_SIZE {
            rows[y * HASH_SIZE + k] = (0..IMG_SIZE)
                .map(|x| pixels[y * IMG_SIZE + x] * basis(k, x))
                .sum();
        }
    }

    // Vertical pass
    let mut out = vec![0.0; HASH_SIZE * HASH_SIZE];
    for v in 0..HASH_SIZE {
        for u in 0..HASH_SIZE {
            out[v * HASH_SIZE + u] = (0..IMG_SIZE)
                .map(|y| rows[y * HASH_SIZE + u] * basis(v, y))
                .sum();
        }
    }
    out
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        f64::midpoint(sorted[mid - 1], sorted[mid])
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn split_image(invert: bool) -> DynamicImage {
        let img = RgbImage::from_fn(64, 64, |x, _| {
            let bright = (x >= 32) != invert;
            if bright { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn hex_round_trip() {
        let hash = PerceptualHash::from_bits(0x00ff_1234_abcd_0001);
        let text = hash.to_string();
        assert_eq!(text, "00ff1234abcd0001");
        assert_eq!(text.parse::<PerceptualHash>().unwrap(), hash);
        assert!("../../etc/passwd".parse::<PerceptualHash>().is_err());
        assert!("abc".parse::<PerceptualHash>().is_err());
    }

    #[test]
    fn hash_is_deterministic_across_encodings() {
        let image = split_image(false);
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();

        let direct = PerceptualHash::of_image(&image);
        let decoded = PerceptualHash::of_bytes(&png).unwrap();
        assert_eq!(direct, decoded);
        assert_eq!(direct.distance(decoded), 0);
    }

    #[test]
    fn inverted_image_hashes_differently() {
        let a = PerceptualHash::of_image(&split_image(false));
        let b = PerceptualHash::of_image(&split_image(true));
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_bytes_fail() {
        assert!(PerceptualHash::of_bytes(b"not an image").is_err());
    }

    #[test]
    fn median_even_length() {
        assert!((median(&[4.0, 1.0, 3.0, 2.0]) - 2.5).abs() < f64::EPSILON);
    }
}
