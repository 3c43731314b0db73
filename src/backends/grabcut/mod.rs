//! Classical graph-cut mask backend
//!
//! Iterative GrabCut seeded with an inset rectangle: everything outside the
//! rectangle is definite background, everything inside starts as probable
//! foreground. Colour models are 5-component Gaussian mixtures re-estimated
//! every iteration and each iteration solves an exact minimum cut.

#![allow(clippy::indexing_slicing)]

mod gmm;
mod maxflow;

use crate::backends::MaskBackend;
use crate::error::{Error, Result};
use crate::types::AlphaMask;
use crate::utils::{close_ellipse_5x5, gaussian_blur_5x5};
use gmm::{Color, Gmm};
use image::{GrayImage, Luma, RgbaImage};
use instant::Duration;
use maxflow::FlowGraph;

/// Number of GrabCut iterations
pub const DEFAULT_ITERATIONS: usize = 8;
/// Largest accepted margin fraction
pub const MAX_MARGIN_FRACTION: f32 = 0.3;
/// Smallest inset of the foreground rectangle on each side, in pixels
pub const MIN_MARGIN_PX: u32 = 5;
/// Closing iterations applied to the binary cut
pub const CLOSING_ITERATIONS: usize = 2;

const GAMMA: f64 = 50.0;
const LAMBDA: f64 = 9.0 * GAMMA;

const BGD: u8 = 0;
const FGD: u8 = 1;
const PR_BGD: u8 = 2;
const PR_FGD: u8 = 3;

/// Check that a margin fraction lies in `[0.0, 0.3]`
///
/// # Errors
/// - [`Error::InvalidConfig`] for out-of-range or non-finite values
pub fn validate_margin(margin_fraction: f32) -> Result<()> {
    if margin_fraction.is_finite() && (0.0..=MAX_MARGIN_FRACTION).contains(&margin_fraction) {
        Ok(())
    } else {
        Err(Error::config_value_error(
            "margin_fraction",
            margin_fraction,
            "0.0-0.3",
            Some(0.05),
        ))
    }
}

/// Initial "probably foreground" rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForegroundRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ForegroundRect {
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

fn axis_margin(len: u32, margin_fraction: f32) -> u32 {
    let margin = ((len as f32 * margin_fraction).floor() as u32).max(MIN_MARGIN_PX);
    // Keep at least one pixel inside the rectangle on tiny images.
    if len == 0 {
        0
    } else if margin.saturating_mul(2) >= len {
        (len - 1) / 2
    } else {
        margin
    }
}

/// Foreground rectangle for an image of the given size
///
/// Each side is inset by `max(5, ⌊len · margin_fraction⌋)` pixels, reduced
/// only when the image is too small to keep a non-empty rectangle.
#[must_use]
pub fn foreground_rect(width: u32, height: u32, margin_fraction: f32) -> ForegroundRect {
    let mx = axis_margin(width, margin_fraction);
    let my = axis_margin(height, margin_fraction);
    ForegroundRect {
        x: mx,
        y: my,
        width: width.saturating_sub(2 * mx),
        height: height.saturating_sub(2 * my),
    }
}

/// Neighbourhood weights towards the left, up-left, up and up-right pixels
struct NeighbourWeights {
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

fn sq_diff(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn compute_beta(colors: &[Color], width: usize, height: usize) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for y in 0..height {
        for x in 0..width {
            let c = &colors[y * width + x];
            if x > 0 {
                total += sq_diff(c, &colors[y * width + x - 1]);
                count += 1;
            }
            if y > 0 {
                if x > 0 {
                    total += sq_diff(c, &colors[(y - 1) * width + x - 1]);
                    count += 1;
                }
                total += sq_diff(c, &colors[(y - 1) * width + x]);
                count += 1;
                if x + 1 < width {
                    total += sq_diff(c, &colors[(y - 1) * width + x + 1]);
                    count += 1;
                }
            }
        }
    }
    if count == 0 || total <= f64::EPSILON {
        0.0
    } else {
        1.0 / (2.0 * total / count as f64)
    }
}

fn neighbour_weights(colors: &[Color], width: usize, height: usize, beta: f64) -> NeighbourWeights {
    let n = colors.len();
    let diagonal = GAMMA / std::f64::consts::SQRT_2;
    let mut w = NeighbourWeights {
        left: vec![0.0; n],
        up_left: vec![0.0; n],
        up: vec![0.0; n],
        up_right: vec![0.0; n],
    };
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let c = &colors[i];
            if x > 0 {
                w.left[i] = GAMMA * (-beta * sq_diff(c, &colors[i - 1])).exp();
            }
            if y > 0 {
                if x > 0 {
                    w.up_left[i] = diagonal * (-beta * sq_diff(c, &colors[i - width - 1])).exp();
                }
                w.up[i] = GAMMA * (-beta * sq_diff(c, &colors[i - width])).exp();
                if x + 1 < width {
                    w.up_right[i] = diagonal * (-beta * sq_diff(c, &colors[i - width + 1])).exp();
                }
            }
        }
    }
    w
}

fn is_foreground(label: u8) -> bool {
    label == FGD || label == PR_FGD
}

/// Split pixels into background and foreground samples by their labels
fn split_samples(colors: &[Color], labels: &[u8]) -> (Vec<Color>, Vec<Color>) {
    let mut bgd = Vec::new();
    let mut fgd = Vec::new();
    for (color, &label) in colors.iter().zip(labels) {
        if is_foreground(label) {
            fgd.push(*color);
        } else {
            bgd.push(*color);
        }
    }
    (bgd, fgd)
}

fn neg_log(p: f64) -> f64 {
    -p.max(f64::MIN_POSITIVE).ln()
}

/// Run GrabCut and return the per-pixel labels
fn grabcut_labels(
    colors: &[Color],
    width: usize,
    height: usize,
    rect: ForegroundRect,
    iterations: usize,
) -> Vec<u8> {
    let mut labels: Vec<u8> = (0..colors.len())
        .map(|i| {
            let x = (i % width) as u32;
            let y = (i / width) as u32;
            if rect.contains(x, y) {
                PR_FGD
            } else {
                BGD
            }
        })
        .collect();

    let (bgd_samples, fgd_samples) = split_samples(colors, &labels);
    if bgd_samples.is_empty() || fgd_samples.is_empty() {
        log::debug!("Graph-cut has no background or no foreground samples, using the rectangle");
        return labels;
    }

    let mut bgd_gmm = Gmm::learn(&bgd_samples, &Gmm::kmeans_labels(&bgd_samples));
    let mut fgd_gmm = Gmm::learn(&fgd_samples, &Gmm::kmeans_labels(&fgd_samples));

    let beta = compute_beta(colors, width, height);
    let weights = neighbour_weights(colors, width, height, beta);

    for iteration in 0..iterations {
        // Reassign every sample to its most likely component and re-learn.
        let (bgd_samples, fgd_samples) = split_samples(colors, &labels);
        if bgd_samples.is_empty() || fgd_samples.is_empty() {
            break;
        }
        let bgd_components: Vec<usize> = bgd_samples
            .iter()
            .map(|c| bgd_gmm.most_likely_component(c))
            .collect();
        let fgd_components: Vec<usize> = fgd_samples
            .iter()
            .map(|c| fgd_gmm.most_likely_component(c))
            .collect();
        bgd_gmm = Gmm::learn(&bgd_samples, &bgd_components);
        fgd_gmm = Gmm::learn(&fgd_samples, &fgd_components);

        let mut graph = FlowGraph::new(colors.len(), colors.len() * 5);
        for (i, color) in colors.iter().enumerate() {
            let (from_source, to_sink) = match labels[i] {
                BGD => (0.0, LAMBDA),
                FGD => (LAMBDA, 0.0),
                _ => (neg_log(bgd_gmm.probability(color)), neg_log(fgd_gmm.probability(color))),
            };
            graph.add_terminal_weights(i, from_source, to_sink);

            let x = i % width;
            let y = i / width;
            if x > 0 {
                graph.add_edge(i, i - 1, weights.left[i]);
            }
            if y > 0 {
                if x > 0 {
                    graph.add_edge(i, i - width - 1, weights.up_left[i]);
                }
                graph.add_edge(i, i - width, weights.up[i]);
                if x + 1 < width {
                    graph.add_edge(i, i - width + 1, weights.up_right[i]);
                }
            }
        }

        let flow = graph.max_flow();
        let mut changed = 0usize;
        for (i, label) in labels.iter_mut().enumerate() {
            if *label == PR_BGD || *label == PR_FGD {
                let next = if graph.in_source_segment(i) { PR_FGD } else { PR_BGD };
                if next != *label {
                    changed += 1;
                }
                *label = next;
            }
        }
        log::trace!(
            "Graph-cut iteration {}: flow {:.2}, {} labels changed",
            iteration + 1,
            flow,
            changed
        );
    }

    labels
}

/// Graph-cut mask backend
#[derive(Debug, Clone)]
pub struct GraphCutBackend {
    margin_fraction: f32,
    iterations: usize,
}

impl GraphCutBackend {
    /// Create a backend with the given margin fraction
    ///
    /// # Errors
    /// - Margin outside `[0.0, 0.3]`
    pub fn new(margin_fraction: f32) -> Result<Self> {
        validate_margin(margin_fraction)?;
        Ok(Self {
            margin_fraction,
            iterations: DEFAULT_ITERATIONS,
        })
    }

    /// Override the number of GrabCut iterations (at least one)
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    #[must_use]
    pub fn margin_fraction(&self) -> f32 {
        self.margin_fraction
    }

    /// Binary cut before post-processing (255 = foreground)
    #[must_use]
    pub fn segment(&self, image: &RgbaImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let colors: Vec<Color> = image
            .pixels()
            .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
            .collect();
        let rect = foreground_rect(width, height, self.margin_fraction);
        let labels = grabcut_labels(&colors, width as usize, height as usize, rect, self.iterations);

        GrayImage::from_fn(width, height, |x, y| {
            let label = labels[(y as usize) * (width as usize) + x as usize];
            Luma([if is_foreground(label) { 255 } else { 0 }])
        })
    }
}

impl MaskBackend for GraphCutBackend {
    fn name(&self) -> &'static str {
        "graph-cut"
    }

    fn initialize(&mut self) -> Result<Option<Duration>> {
        Ok(None)
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn produce_mask(&mut self, image: &RgbaImage) -> Result<AlphaMask> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::processing("Cannot segment an empty image"));
        }
        let binary = self.segment(image);
        let closed = close_ellipse_5x5(&binary, CLOSING_ITERATIONS);
        Ok(AlphaMask::new(gaussian_blur_5x5(&closed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn square_on_gray(size: u32, lo: u32, hi: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                Rgba([200, 30, 30, 255])
            } else {
                Rgba([128, 128, 128, 255])
            }
        })
    }

    #[test]
    fn test_validate_margin() {
        assert!(validate_margin(0.0).is_ok());
        assert!(validate_margin(0.3).is_ok());
        assert!(validate_margin(0.31).is_err());
        assert!(validate_margin(-0.01).is_err());
        assert!(validate_margin(f32::NAN).is_err());
    }

    #[test]
    fn test_rect_uses_fraction() {
        let rect = foreground_rect(1000, 500, 0.1);
        assert_eq!(rect, ForegroundRect { x: 100, y: 50, width: 800, height: 400 });
    }

    #[test]
    fn test_rect_margin_floor() {
        let rect = foreground_rect(40, 30, 0.0);
        assert_eq!(rect, ForegroundRect { x: 5, y: 5, width: 30, height: 20 });
    }

    #[test]
    fn test_rect_on_tiny_image_stays_non_empty() {
        let rect = foreground_rect(8, 3, 0.0);
        assert!(rect.width >= 1 && rect.height >= 1);
        assert_eq!(rect.x, 3);
        assert_eq!(rect.y, 1);
    }

    #[test]
    fn test_segments_red_square() {
        let image = square_on_gray(60, 20, 40);
        let mut backend = GraphCutBackend::new(0.1).unwrap();
        let mask = backend.produce_mask(&image).unwrap();
        assert_eq!(mask.dimensions(), (60, 60));
        assert_eq!(mask.as_gray().get_pixel(30, 30)[0], 255);
        assert_eq!(mask.as_gray().get_pixel(0, 0)[0], 0);
        assert!(mask.as_gray().get_pixel(10, 10)[0] < 128);
    }

    #[test]
    fn test_is_deterministic() {
        let image = square_on_gray(40, 12, 28);
        let mut backend = GraphCutBackend::new(0.05).unwrap().with_iterations(3);
        let a = backend.produce_mask(&image).unwrap();
        let b = backend.produce_mask(&image).unwrap();
        assert_eq!(a.as_gray(), b.as_gray());
    }

    #[test]
    fn test_single_pixel_image() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255]));
        let mut backend = GraphCutBackend::new(0.0).unwrap();
        let mask = backend.produce_mask(&image).unwrap();
        assert_eq!(mask.dimensions(), (1, 1));
    }
}
