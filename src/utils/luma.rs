use image::DynamicImage;

use crate::definitions::{DOWNSAMPLE_DIM, JAROSZ_WINDOW_DIVISOR};

// ITU-R BT.601 luma weights, applied in f32
const LUMA_FROM_R: f32 = 0.299;
const LUMA_FROM_G: f32 = 0.587;
const LUMA_FROM_B: f32 = 0.114;

/// A single channel image with floating point pixels, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaBuf {
    width: usize,
    height: usize,
    pixels: Vec<f64>,
}

impl LumaBuf {
    pub fn from_image(image: &DynamicImage) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;

        let pixels = match image {
            DynamicImage::ImageLuma8(gray) => gray.as_raw().iter().map(|x| f64::from(*x)).collect(),
            DynamicImage::ImageRgb8(rgb) => rgb
                .pixels()
                .map(|image::Rgb([r, g, b])| rgb_to_luma(*r, *g, *b))
                .collect(),
            other => other
                .to_rgb8()
                .pixels()
                .map(|image::Rgb([r, g, b])| rgb_to_luma(*r, *g, *b))
                .collect(),
        };

        Self {
            width,
            height,
            pixels,
        }
    }

    #[cfg(test)]
    pub fn width(&self) -> usize {
        self.width
    }

    #[cfg(test)]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn into_raw(self) -> Vec<f64> {
        self.pixels
    }

    /// Low-pass filter and then decimate down to a DOWNSAMPLE_DIM x DOWNSAMPLE_DIM grid.
    ///
    /// The filter is a Jarosz filter: two passes of a box filter in each direction, which
    /// approximates a tent filter. The window is chosen so that each output sample averages
    /// over roughly the area of the input that it represents.
    pub fn downsample(&self) -> Self {
        let window_x = jarosz_window_size(self.width);
        let window_y = jarosz_window_size(self.height);

        let mut pixels = self.pixels.clone();
        for _ in 0..2 {
            for row in pixels.chunks_exact_mut(self.width) {
                box_filter(row, 1, window_x);
            }
            for col in 0..self.width {
                box_filter(&mut pixels[col..], self.width, window_y);
            }
        }

        let mut out = Vec::with_capacity(DOWNSAMPLE_DIM * DOWNSAMPLE_DIM);
        for out_y in 0..DOWNSAMPLE_DIM {
            let in_y = strip_centre(out_y, self.height);
            for out_x in 0..DOWNSAMPLE_DIM {
                let in_x = strip_centre(out_x, self.width);
                out.push(pixels[in_y * self.width + in_x]);
            }
        }

        Self {
            width: DOWNSAMPLE_DIM,
            height: DOWNSAMPLE_DIM,
            pixels: out,
        }
    }
}

fn rgb_to_luma(r: u8, g: u8, b: u8) -> f64 {
    f64::from(LUMA_FROM_R * f32::from(r) + LUMA_FROM_G * f32::from(g) + LUMA_FROM_B * f32::from(b))
}

fn jarosz_window_size(old_dim: usize) -> usize {
    old_dim.div_ceil(JAROSZ_WINDOW_DIVISOR).max(1)
}

//index of the input sample at the centre of the idx'th of DOWNSAMPLE_DIM equal strips.
fn strip_centre(idx: usize, in_dim: usize) -> usize {
    (((2 * idx + 1) * in_dim) / (2 * DOWNSAMPLE_DIM)).min(in_dim - 1)
}

/// In-place box filter over every `stride`th element of `data`, starting at `data[0]`.
/// Near the edges the window is truncated and the mean is taken over the samples available.
fn box_filter(data: &mut [f64], stride: usize, window: usize) {
    if window <= 1 {
        return;
    }

    let len = data.len().div_ceil(stride);
    let before = (window - 1) / 2;
    let after = window - 1 - before;

    let mut prefix = Vec::with_capacity(len + 1);
    prefix.push(0f64);
    let mut acc = 0f64;
    for i in 0..len {
        acc += data[i * stride];
        prefix.push(acc);
    }

    for i in 0..len {
        let lo = i.saturating_sub(before);
        let hi = (i + after).min(len - 1);
        data[i * stride] = (prefix[hi + 1] - prefix[lo]) / (hi + 1 - lo) as f64;
    }
}

#[cfg(test)]
mod test {
    use image::{GrayImage, RgbImage};

    use super::*;

    #[test]
    fn test_gray_and_rgb_luma_agree_for_gray_pixels() {
        let gray = GrayImage::from_fn(10, 7, |x, y| image::Luma([(x * 20 + y) as u8]));
        let rgb = RgbImage::from_fn(10, 7, |x, y| {
            let v = (x * 20 + y) as u8;
            image::Rgb([v, v, v])
        });

        let from_gray = LumaBuf::from_image(&DynamicImage::ImageLuma8(gray));
        let from_rgb = LumaBuf::from_image(&DynamicImage::ImageRgb8(rgb));

        for (a, b) in from_gray.into_raw().iter().zip(from_rgb.into_raw()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_downsample_dimensions() {
        for (w, h) in [(5, 5), (64, 64), (640, 360), (1920, 1080), (63, 200)] {
            let img = GrayImage::from_pixel(w, h, image::Luma([77]));
            let luma = LumaBuf::from_image(&DynamicImage::ImageLuma8(img)).downsample();
            assert_eq!(luma.width(), DOWNSAMPLE_DIM);
            assert_eq!(luma.height(), DOWNSAMPLE_DIM);
            assert!(luma.into_raw().iter().all(|x| (x - 77.0).abs() < 1e-9));
        }
    }

    #[test]
    fn test_downsample_of_64_square_is_identity() {
        let img = GrayImage::from_fn(64, 64, |x, y| image::Luma([((x * 3 + y * 5) % 256) as u8]));
        let luma = LumaBuf::from_image(&DynamicImage::ImageLuma8(img));
        assert_eq!(luma.downsample(), luma);
    }

    #[test]
    fn test_box_filter_preserves_mean_of_interior() {
        let mut data = vec![0.0, 0.0, 9.0, 0.0, 0.0];
        box_filter(&mut data, 1, 3);
        assert_eq!(data, vec![0.0, 3.0, 3.0, 3.0, 0.0]);
    }

    #[test]
    fn test_box_filter_strided() {
        //a 2 column matrix, filter the first column only.
        let mut data = vec![3.0, 100.0, 6.0, 100.0, 9.0, 100.0];
        box_filter(&mut data, 2, 3);
        assert_eq!(data, vec![4.5, 100.0, 6.0, 100.0, 7.5, 100.0]);
    }
}
