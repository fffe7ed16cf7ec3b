use derive_more::{Deref, DerefMut};
use image::{GrayImage, ImageBuffer, Luma};
use ndarray::{azip, s, Array2, ArrayView2};
use std::f32;
use wide::f32x4;

type GrayFloatBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Unit float copy of an 8-bit layer, used for descriptor sampling.
///
/// The pyramid and the corner test stay on 8-bit data. Only the descriptor
/// comparisons read this smoothed version so that single-pixel noise does not
/// flip bits.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GrayFloatImage(pub GrayFloatBuffer);

impl GrayFloatImage {
    /// Convert an 8-bit grayscale image into values between 0 and 1.
    pub fn from_gray(image: &GrayImage) -> Self {
        Self(ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            Luma([f32::from(image[(x, y)][0]) / 255f32])
        }))
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.0.as_raw()[y * self.width() + x]
    }
}

/// View an 8-bit image as a `height x width` array.
pub fn gray_view(image: &GrayImage) -> ArrayView2<'_, u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    ArrayView2::from_shape((height, width), &image.as_raw()[..width * height])
        .expect("image buffer holds at least width * height pixels")
}

/// Shrink an image by an integer factor, averaging each `factor x factor` tile.
///
/// Trailing rows and columns that do not fill a whole tile are dropped.
pub fn downscale(image: &GrayImage, factor: u32) -> GrayImage {
    debug_assert!(factor >= 2);
    let f = factor as usize;
    let width = image.width() as usize / f;
    let height = image.height() as usize / f;
    let area = (f * f) as u32;
    let mut out = Array2::<u8>::zeros((height, width));
    azip!((
        out in &mut out,
        window in gray_view(image).slice(s![..height * f, ..width * f]).exact_chunks((f, f)),
    ) {
        let sum: u32 = window.iter().map(|&v| u32::from(v)).sum();
        *out = ((sum + area / 2) / area) as u8;
    });
    GrayImage::from_raw(width as u32, height as u32, out.into_raw_vec())
        .expect("raw vector didn't have enough pixels for the image")
}

/// Pack a kernel into 4-lane chunks, padded with zeros.
fn simd_kernel(kernel: &[f32]) -> Vec<f32x4> {
    kernel
        .chunks(4)
        .map(|chunk| {
            let mut data = [0f32; 4];
            data[..chunk.len()].copy_from_slice(chunk);
            f32x4::new(data)
        })
        .collect()
}

fn apply_simd(window: &[f32], kernel: &[f32x4]) -> f32 {
    window
        .chunks_exact(4)
        .map(|chunk| f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .zip(kernel.iter())
        .fold(f32x4::splat(0.), |acc, (a, b)| a.mul_add(*b, acc))
        .reduce_add()
}

pub fn horizontal_filter(image: &GrayFloatBuffer, kernel: &[f32]) -> GrayFloatBuffer {
    let kernel_size = kernel.len();
    debug_assert!(kernel_size % 2 == 1);
    let kernel_half_size = kernel_size / 2;
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut output = vec![0.0; width * height];
    let kernel_simd = simd_kernel(kernel);
    let kernel_simd_size = kernel_simd.len() * 4;
    let kernel_simd_extra_elements = kernel_simd_size - kernel_size;
    // Each row is padded by replicating its edge values.
    let mut scratch = vec![0f32; width + kernel_half_size * 2 + kernel_simd_extra_elements];
    for (row_in, row_out) in image
        .as_raw()
        .chunks_exact(width)
        .zip(output.chunks_exact_mut(width))
    {
        scratch[0..kernel_half_size].fill(row_in[0]);
        scratch[kernel_half_size..kernel_half_size + width].copy_from_slice(row_in);
        scratch[kernel_half_size + width..2 * kernel_half_size + width].fill(row_in[width - 1]);
        scratch[2 * kernel_half_size + width..].fill(0.);
        scratch
            .windows(kernel_simd_size)
            .zip(row_out)
            .for_each(|(window, output)| *output = apply_simd(window, &kernel_simd));
    }
    GrayFloatBuffer::from_raw(width as u32, height as u32, output)
        .expect("output has width * height pixels")
}

pub fn vertical_filter(image: &GrayFloatBuffer, kernel: &[f32]) -> GrayFloatBuffer {
    let kernel_size = kernel.len();
    debug_assert!(kernel_size % 2 == 1);
    let kernel_half_size = kernel_size / 2;
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut output = vec![0.0; width * height];
    let kernel_simd = simd_kernel(kernel);
    let kernel_simd_size = kernel_simd.len() * 4;
    let kernel_simd_extra_elements = kernel_simd_size - kernel_size;
    // Columns are copied into a scratch buffer 16 at a time (one cache line).
    const SCRATCH_WIDTH: usize = 16;
    let scratch_height = height + kernel_half_size * 2 + kernel_simd_extra_elements;
    let mut scratch = vec![0f32; SCRATCH_WIDTH * scratch_height];
    let image = image.as_raw();
    for x_s in (0..width).step_by(SCRATCH_WIDTH) {
        let x_e = (x_s + SCRATCH_WIDTH).min(width);
        let image_last_row_start = (height - 1) * width;
        for x in x_s..x_e {
            let col = &mut scratch[(x - x_s) * scratch_height..(x - x_s + 1) * scratch_height];
            col[..kernel_half_size].fill(image[x]);
            for y in 0..height {
                col[kernel_half_size + y] = image[y * width + x];
            }
            col[kernel_half_size + height..2 * kernel_half_size + height]
                .fill(image[image_last_row_start + x]);
            col[2 * kernel_half_size + height..].fill(0.);
        }
        scratch
            .chunks(scratch_height)
            .take(x_e - x_s)
            .enumerate()
            .for_each(|(dx, col)| {
                col.windows(kernel_simd_size)
                    .take(height)
                    .enumerate()
                    .for_each(|(y, window)| {
                        output[y * width + x_s + dx] = apply_simd(window, &kernel_simd);
                    });
            });
    }
    GrayFloatBuffer::from_raw(width as u32, height as u32, output)
        .expect("output has width * height pixels")
}

pub fn separable_filter(
    image: &GrayFloatBuffer,
    h_kernel: &[f32],
    v_kernel: &[f32],
) -> GrayFloatBuffer {
    let h = horizontal_filter(image, h_kernel);
    vertical_filter(&h, v_kernel)
}

/// The Gaussian function.
///
/// # Arguments
/// * `x` - the offset.
/// * `r` - sigma.
fn gaussian(x: f32, r: f32) -> f32 {
    ((2.0 * f32::consts::PI).sqrt() * r).recip() * (-x.powi(2) / (2.0 * r.powi(2))).exp()
}

/// Generate a normalized Gaussian kernel.
///
/// # Arguments
/// * `r` - sigma.
/// * `kernel_size` - The size of the kernel, must be odd.
pub fn gaussian_kernel(r: f32, kernel_size: usize) -> Vec<f32> {
    assert!(kernel_size % 2 == 1, "kernel_size must be odd");
    let half_width = (kernel_size / 2) as i32;
    let mut kernel: Vec<f32> = (-half_width..=half_width)
        .map(|i| gaussian(i as f32, r))
        .collect();
    let sum: f32 = kernel.iter().sum();
    for val in kernel.iter_mut() {
        *val /= sum;
    }
    kernel
}

/// Perform Gaussian blur on an image.
///
/// A non-positive sigma returns the image unchanged.
pub fn gaussian_blur(image: &GrayFloatImage, r: f32) -> GrayFloatImage {
    if r <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let kernel_radius = (2.0 * r).ceil() as usize;
    let kernel_size = kernel_radius * 2 + 1;
    let kernel = gaussian_kernel(r, kernel_size);
    GrayFloatImage(separable_filter(image, &kernel, &kernel))
}
