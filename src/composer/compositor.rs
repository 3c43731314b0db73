//! Deterministic layer compositing
//!
//! Layers are stacked in a fixed order: gray canvas, background, left
//! decoration, right decoration, representative. The result is flattened to
//! RGB and then colour-adjusted (saturation first, brightness second).
//!
//! Every layer is loaded and pasted independently. A failing layer is logged
//! and recorded in the [`ComposeReport`]; the remaining layers still render.

use crate::composer::enhance::{adjust_brightness, adjust_saturation};
use crate::composer::layout::{
    centered, clamp_to_canvas, representative_size, scaled_size, Position, CANVAS_FILL,
    CANVAS_HEIGHT, CANVAS_WIDTH,
};
use crate::composer::state::{ComposerState, Layout, Placement};
use crate::config::ComposeSettings;
use crate::error::{Error, Result};
use crate::services::ImageIOService;
use crate::tracing_config::spans;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Canvas layers that can fail independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Background,
    LeftDecoration,
    RightDecoration,
    Representative,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Layer::Background => "background",
            Layer::LeftDecoration => "left decoration",
            Layer::RightDecoration => "right decoration",
            Layer::Representative => "representative",
        };
        f.write_str(name)
    }
}

/// A layer that was skipped
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LayerError {
    pub layer: Layer,
    pub path: PathBuf,
    pub message: String,
}

/// Layer failures collected while composing
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ComposeReport {
    pub errors: Vec<LayerError>,
}

impl ComposeReport {
    fn record(&mut self, layer: Layer, path: &Path, error: &Error) {
        tracing::warn!(%layer, path = %path.display(), %error, "Skipping layer");
        self.errors.push(LayerError {
            layer,
            path: path.to_path_buf(),
            message: error.to_string(),
        });
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// The representative layer failure, if any
    #[must_use]
    pub fn representative_error(&self) -> Option<&LayerError> {
        self.errors.iter().find(|e| e.layer == Layer::Representative)
    }
}

/// A composited canvas and the layers that were skipped
#[derive(Debug, Clone)]
pub struct ComposeOutput {
    pub image: RgbImage,
    pub report: ComposeReport,
}

/// Renders representatives on top of a prepared layout
///
/// The background and decorations are rendered once in
/// [`Compositor::prepare`]; each [`Compositor::compose`] call then only
/// pastes the representative and applies the colour adjustments.
#[derive(Debug, Clone)]
pub struct Compositor {
    base: RgbaImage,
    base_report: ComposeReport,
    settings: ComposeSettings,
}

impl Compositor {
    /// Render the layout layers of a session
    #[must_use]
    pub fn prepare(state: &ComposerState) -> Self {
        Self::from_layout(state.layout())
    }

    /// Render canvas, background and decorations of a layout
    #[instrument(skip(layout), fields(background = layout.background.is_some()))]
    #[must_use]
    pub fn from_layout(layout: &Layout) -> Self {
        let [r, g, b] = CANVAS_FILL;
        let mut base = RgbaImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, Rgba([r, g, b, 255]));
        let mut report = ComposeReport::default();
        let settings = layout.settings;

        if let Some(path) = &layout.background {
            if let Err(e) = paste_background(&mut base, path) {
                report.record(Layer::Background, path, &e);
            }
        }
        if let Some(placement) = &layout.left {
            if let Err(e) = paste_decoration(&mut base, placement, settings.left_scale) {
                report.record(Layer::LeftDecoration, &placement.path, &e);
            }
        }
        if let Some(placement) = &layout.right {
            if let Err(e) = paste_decoration(&mut base, placement, settings.right_scale) {
                report.record(Layer::RightDecoration, &placement.path, &e);
            }
        }

        Self {
            base,
            base_report: report,
            settings,
        }
    }

    /// Composite the representative image file and apply colour adjustments
    #[must_use]
    pub fn compose(&self, representative: &Path) -> ComposeOutput {
        let _span = spans::compose(representative).entered();
        let mut canvas = self.base.clone();
        let mut report = self.base_report.clone();

        match ImageIOService::load_image(representative) {
            Ok(image) => paste_representative(&mut canvas, &image),
            Err(e) => report.record(Layer::Representative, representative, &e),
        }

        ComposeOutput {
            image: self.finish(&canvas),
            report,
        }
    }

    /// Composite an already decoded representative image
    #[must_use]
    pub fn compose_image(&self, representative: &DynamicImage) -> ComposeOutput {
        let mut canvas = self.base.clone();
        paste_representative(&mut canvas, representative);
        ComposeOutput {
            image: self.finish(&canvas),
            report: self.base_report.clone(),
        }
    }

    fn finish(&self, canvas: &RgbaImage) -> RgbImage {
        let mut rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
        adjust_saturation(&mut rgb, self.settings.saturation);
        adjust_brightness(&mut rgb, self.settings.brightness);
        rgb
    }
}

/// Compose one representative onto the session's committed layout
#[must_use]
pub fn compose(state: &ComposerState, representative: &Path) -> ComposeOutput {
    Compositor::prepare(state).compose(representative)
}

/// PNG preview of the first representative on the committed layout
///
/// # Errors
/// - [`Error::Validation`] when no layout is committed or there is no representative
/// - [`Error::Processing`] when the representative itself cannot be rendered
/// - PNG encoding failure
pub fn preview(state: &ComposerState) -> Result<Vec<u8>> {
    if !state.is_locked() {
        return Err(Error::validation("Randomize a layout before previewing"));
    }
    let first = state
        .pool(crate::composer::Pool::Representatives)
        .first()
        .ok_or_else(|| Error::validation("Add at least one representative image"))?;

    let output = compose(state, first);
    if let Some(failure) = output.report.representative_error() {
        return Err(Error::processing(failure.message.clone()));
    }
    ImageIOService::encode_png(&DynamicImage::ImageRgb8(output.image))
}

fn paste_background(canvas: &mut RgbaImage, path: &Path) -> Result<()> {
    let image = ImageIOService::load_image(path)?.to_rgba8();
    let resized = imageops::resize(&image, CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Lanczos3);
    imageops::overlay(canvas, &resized, 0, 0);
    Ok(())
}

fn paste_decoration(canvas: &mut RgbaImage, placement: &Placement, scale: f32) -> Result<()> {
    let image = ImageIOService::load_image(&placement.path)?.to_rgba8();
    let size = scaled_size(image.dimensions(), scale);
    let resized = imageops::resize(&image, size.0, size.1, FilterType::Lanczos3);
    let Position { x, y } = clamp_to_canvas(placement.position, size);
    imageops::overlay(canvas, &resized, i64::from(x), i64::from(y));
    Ok(())
}

fn paste_representative(canvas: &mut RgbaImage, image: &DynamicImage) {
    let rgba = image.to_rgba8();
    let size = representative_size(rgba.dimensions());
    let fitted = if size == rgba.dimensions() {
        rgba
    } else {
        imageops::resize(&rgba, size.0, size.1, FilterType::Lanczos3)
    };
    let Position { x, y } = centered(size);
    imageops::overlay(canvas, &fitted, i64::from(x), i64::from(y));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Pool;
    use image::Rgb;
    use tempfile::TempDir;

    fn write_png(dir: &TempDir, name: &str, image: DynamicImage) -> PathBuf {
        let path = dir.path().join(name);
        ImageIOService::save_png(&image, &path).unwrap();
        path
    }

    #[test]
    fn test_empty_layout_is_gray_canvas() {
        let compositor = Compositor::from_layout(&Layout::default());
        let output = compositor.compose_image(&DynamicImage::ImageRgba8(RgbaImage::new(1, 1)));
        assert_eq!(output.image.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert_eq!(output.image.get_pixel(0, 0), &Rgb([220, 220, 220]));
        assert!(output.report.is_clean());
    }

    #[test]
    fn test_missing_layers_are_reported_not_fatal() {
        let layout = Layout {
            background: Some(PathBuf::from("/nope/bg.png")),
            left: Some(Placement {
                path: PathBuf::from("/nope/left.png"),
                position: Position::new(0, 0),
            }),
            ..Layout::default()
        };
        let output = Compositor::from_layout(&layout).compose(Path::new("/nope/rep.png"));
        let layers: Vec<Layer> = output.report.errors.iter().map(|e| e.layer).collect();
        assert_eq!(layers, vec![Layer::Background, Layer::LeftDecoration, Layer::Representative]);
        assert_eq!(output.image.get_pixel(900, 600), &Rgb([220, 220, 220]));
    }

    #[test]
    fn test_decoration_is_clamped_into_canvas() {
        let dir = TempDir::new().unwrap();
        let red = write_png(
            &dir,
            "red.png",
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 100, Rgba([255, 0, 0, 255]))),
        );
        let layout = Layout {
            right: Some(Placement {
                path: red,
                position: Position::new(1750, 1190),
            }),
            settings: ComposeSettings::default().with_right_scale(1.0).unwrap(),
            ..Layout::default()
        };
        let output = Compositor::from_layout(&layout).compose_image(&DynamicImage::new_rgba8(1, 1));
        assert_eq!(output.image.get_pixel(1799, 1199), &Rgb([255, 0, 0]));
        assert_eq!(output.image.get_pixel(1600, 1100), &Rgb([255, 0, 0]));
        assert_eq!(output.image.get_pixel(1599, 1100), &Rgb([220, 220, 220]));
    }

    #[test]
    fn test_brightness_applies_after_flatten() {
        let layout = Layout {
            settings: ComposeSettings::default().with_brightness_percent(-50),
            ..Layout::default()
        };
        let output = Compositor::from_layout(&layout).compose_image(&DynamicImage::new_rgba8(1, 1));
        assert_eq!(output.image.get_pixel(10, 10), &Rgb([110, 110, 110]));
    }

    #[test]
    fn test_preview_requires_locked_layout() {
        let dir = TempDir::new().unwrap();
        let rep = write_png(
            &dir,
            "rep.png",
            DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 0, 255]))),
        );
        let bg = write_png(
            &dir,
            "bg.png",
            DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([0, 255, 0]))),
        );

        let mut state = ComposerState::new();
        state.add(Pool::Representatives, [rep]).unwrap();
        state.add(Pool::Backgrounds, [bg]).unwrap();
        assert!(matches!(preview(&state), Err(Error::Validation(_))));

        state.randomize().unwrap();
        let png = preview(&state).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert_eq!(decoded.get_pixel(900, 600), &Rgb([0, 0, 255]));
        assert_eq!(decoded.get_pixel(5, 5), &Rgb([0, 255, 0]));
    }
}
