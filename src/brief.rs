//! Binary descriptors from pairwise intensity comparisons.

use crate::image::GrayFloatImage;
use bitarray::BitArray;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

/// A binary descriptor. Bits past the configured length are always zero.
pub type Descriptor = BitArray<64>;

/// Capacity of [`Descriptor`] in bits.
pub const MAX_DESCRIPTOR_BITS: usize = 512;

/// The pattern is a pure function of its parameters, so every extractor with the
/// same configuration compares the same pixel pairs.
const PATTERN_SEED: u64 = 0x6272_6965_665f_7061;

/// How the pixel pairs of the comparison pattern are distributed in the patch.
///
/// Named after the sampling geometries of the original BRIEF paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPattern {
    /// Both points uniform over the patch (G I).
    Uniform,
    /// Both points drawn from an isotropic Gaussian with sigma = patch / 5 (G II).
    Gaussian,
    /// First point as in `Gaussian`, second drawn around the first with sigma = patch / 10 (G III).
    GaussianAroundFirst,
}

/// Offsets of the two pixels compared for one descriptor bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePair {
    pub a: (i32, i32),
    pub b: (i32, i32),
}

/// A fixed set of sample pairs, computed once and reused for every keypoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pairs: Vec<SamplePair>,
    half_patch: i32,
}

fn standard_normal(rng: &mut Pcg64) -> f64 {
    // Box-Muller; u1 is kept away from zero so the log stays finite.
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

impl Pattern {
    /// Generate `bits` sample pairs inside a `patch_size` square patch.
    pub fn generate(sampling: SamplingPattern, bits: usize, patch_size: u32) -> Self {
        let half_patch = (patch_size / 2) as i32;
        let sigma = f64::from(patch_size) / 5.0;
        let mut rng = Pcg64::seed_from_u64(PATTERN_SEED);
        let clamp = |v: f64| (v.round() as i32).clamp(-half_patch, half_patch);
        let mut pairs = Vec::with_capacity(bits);
        while pairs.len() < bits {
            let (a, b) = match sampling {
                SamplingPattern::Uniform => (
                    (
                        rng.gen_range(-half_patch..=half_patch),
                        rng.gen_range(-half_patch..=half_patch),
                    ),
                    (
                        rng.gen_range(-half_patch..=half_patch),
                        rng.gen_range(-half_patch..=half_patch),
                    ),
                ),
                SamplingPattern::Gaussian => (
                    (
                        clamp(sigma * standard_normal(&mut rng)),
                        clamp(sigma * standard_normal(&mut rng)),
                    ),
                    (
                        clamp(sigma * standard_normal(&mut rng)),
                        clamp(sigma * standard_normal(&mut rng)),
                    ),
                ),
                SamplingPattern::GaussianAroundFirst => {
                    let ax = sigma * standard_normal(&mut rng);
                    let ay = sigma * standard_normal(&mut rng);
                    let bx = ax + 0.5 * sigma * standard_normal(&mut rng);
                    let by = ay + 0.5 * sigma * standard_normal(&mut rng);
                    ((clamp(ax), clamp(ay)), (clamp(bx), clamp(by)))
                }
            };
            // A pair comparing a pixel with itself would be a constant bit.
            if a != b {
                pairs.push(SamplePair { a, b });
            }
        }
        Self { pairs, half_patch }
    }

    pub fn pairs(&self) -> &[SamplePair] {
        &self.pairs
    }

    /// Furthest any sample can land from the keypoint along either axis, rotated or not.
    pub fn radius(&self) -> u32 {
        (self.half_patch as f32 * std::f32::consts::SQRT_2).ceil() as u32
    }

    /// Compute the descriptor of the keypoint at `(x, y)`.
    ///
    /// When `angle` is given, the pattern is rotated by it first. The caller
    /// guarantees that `(x, y)` is at least [`Pattern::radius`] away from the
    /// image edges.
    pub fn describe(
        &self,
        image: &GrayFloatImage,
        x: u32,
        y: u32,
        angle: Option<f32>,
    ) -> Descriptor {
        let (x, y) = (x as i32, y as i32);
        let sample = |(dx, dy): (i32, i32)| image.get((x + dx) as usize, (y + dy) as usize);
        let mut output = Descriptor::zeros();
        let bytes = output.bytes_mut();
        match angle {
            Some(angle) => {
                let (si, co) = angle.sin_cos();
                let rotate = |(dx, dy): (i32, i32)| {
                    let (dx, dy) = (dx as f32, dy as f32);
                    (
                        (dx * co - dy * si).round() as i32,
                        (dx * si + dy * co).round() as i32,
                    )
                };
                for (bit, pair) in self.pairs.iter().enumerate() {
                    if sample(rotate(pair.a)) < sample(rotate(pair.b)) {
                        bytes[bit >> 3] |= 1 << (bit & 7);
                    }
                }
            }
            None => {
                for (bit, pair) in self.pairs.iter().enumerate() {
                    if sample(pair.a) < sample(pair.b) {
                        bytes[bit >> 3] |= 1 << (bit & 7);
                    }
                }
            }
        }
        output
    }
}
