//! Compositing of real files through the public API

mod common;

use common::{close, solid_rgb, solid_rgba, GRAY};
use cutout_composer::composer::layout::clamp_to_canvas;
use cutout_composer::{compose, preview, ComposerState, Compositor, Layer, Layout, Pool};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

#[test]
fn test_small_representative_is_centered_unscaled() {
    let dir = TempDir::new().unwrap();
    let rep = solid_rgb(dir.path(), "rep.png", (500, 500), [0, 0, 255]);

    let output = Compositor::from_layout(&Layout::default()).compose(&rep);
    let image = output.image;
    assert!(output.report.is_clean());
    assert_eq!(image.dimensions(), (1800, 1200));

    assert_eq!(image.get_pixel(650, 350).0, [0, 0, 255]);
    assert_eq!(image.get_pixel(1149, 849).0, [0, 0, 255]);
    assert_eq!(image.get_pixel(649, 350), &GRAY);
    assert_eq!(image.get_pixel(1150, 849), &GRAY);
    assert_eq!(image.get_pixel(650, 850), &GRAY);
}

#[test]
fn test_large_representative_is_fit_into_700() {
    let dir = TempDir::new().unwrap();
    let rep = solid_rgb(dir.path(), "wide.png", (1400, 700), [200, 30, 30]);

    let image = Compositor::from_layout(&Layout::default()).compose(&rep).image;

    // 700x350 at (550, 425)
    assert!(close(image.get_pixel(550, 425), [200, 30, 30], 3));
    assert!(close(image.get_pixel(1249, 774), [200, 30, 30], 3));
    assert_eq!(image.get_pixel(549, 600), &GRAY);
    assert_eq!(image.get_pixel(1250, 600), &GRAY);
    assert_eq!(image.get_pixel(900, 424), &GRAY);
    assert_eq!(image.get_pixel(900, 775), &GRAY);
}

#[test]
fn test_transparent_pixels_show_layers_below() {
    let dir = TempDir::new().unwrap();
    let rep = solid_rgba(dir.path(), "cutout.png", (100, 100), [255, 0, 0, 0]);

    let image = Compositor::from_layout(&Layout::default()).compose(&rep).image;
    assert_eq!(image.get_pixel(900, 600), &GRAY);
}

#[test]
fn test_compose_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let mut state = ComposerState::new();
    state
        .add(Pool::Backgrounds, [solid_rgb(dir.path(), "bg.jpg", (64, 48), [40, 90, 160])])
        .unwrap();
    state
        .add(
            Pool::LeftDecorations,
            [solid_rgba(dir.path(), "left.png", (120, 80), [250, 200, 0, 180])],
        )
        .unwrap();
    let rep = solid_rgb(dir.path(), "rep.png", (300, 200), [10, 200, 10]);
    state.add(Pool::Representatives, [rep.clone()]).unwrap();
    state.set_adjustments(30, -20).unwrap();
    state.randomize_with(&mut StdRng::seed_from_u64(3)).unwrap();

    let first = compose(&state, &rep);
    let second = compose(&state, &rep);
    assert_eq!(first.image, second.image);
    assert!(first.report.is_clean());
}

#[test]
fn test_scale_change_resizes_in_place_and_clamps() {
    let dir = TempDir::new().unwrap();
    let mut state = ComposerState::new();
    state
        .add(Pool::Backgrounds, [solid_rgb(dir.path(), "bg.png", (10, 10), [0, 160, 0])])
        .unwrap();
    state
        .add(
            Pool::LeftDecorations,
            [solid_rgba(dir.path(), "left.png", (400, 400), [255, 0, 0, 255])],
        )
        .unwrap();
    let rep = solid_rgb(dir.path(), "rep.png", (10, 10), [0, 0, 255]);
    state.add(Pool::Representatives, [rep.clone()]).unwrap();
    state.randomize_with(&mut StdRng::seed_from_u64(17)).unwrap();
    let position = state.layout().left.as_ref().unwrap().position;

    state.set_scales(1.0, 0.5).unwrap();
    assert_eq!(state.layout().left.as_ref().unwrap().position, position);

    let placed = clamp_to_canvas(position, (400, 400));
    let image = compose(&state, &rep).image;
    assert_eq!(image.get_pixel(placed.x, placed.y).0, [255, 0, 0]);
    assert_eq!(image.get_pixel(placed.x + 399, placed.y + 399).0, [255, 0, 0]);
    assert!(placed.y + 400 <= 1200);
}

#[test]
fn test_missing_background_still_renders() {
    let dir = TempDir::new().unwrap();
    let mut state = ComposerState::new();
    state
        .add(Pool::Backgrounds, [dir.path().join("deleted.png")])
        .unwrap();
    let rep = solid_rgb(dir.path(), "rep.png", (20, 20), [0, 0, 255]);
    state.add(Pool::Representatives, [rep.clone()]).unwrap();
    state.randomize().unwrap();

    let output = compose(&state, &rep);
    assert_eq!(output.report.errors.len(), 1);
    assert_eq!(output.report.errors[0].layer, Layer::Background);
    assert_eq!(output.image.get_pixel(0, 0), &GRAY);
    assert_eq!(output.image.get_pixel(900, 600).0, [0, 0, 255]);

    let png = preview(&state).unwrap();
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
}

#[test]
fn test_saturation_and_brightness_are_applied() {
    let dir = TempDir::new().unwrap();
    let mut state = ComposerState::new();
    state
        .add(Pool::Backgrounds, [solid_rgb(dir.path(), "bg.png", (10, 10), [200, 100, 50])])
        .unwrap();
    let rep = solid_rgb(dir.path(), "rep.png", (4, 4), [0, 0, 0]);
    state.add(Pool::Representatives, [rep.clone()]).unwrap();
    state.set_adjustments(-50, 0).unwrap();
    state.randomize().unwrap();

    let desaturated = compose(&state, &rep).image;
    let [r, g, b] = desaturated.get_pixel(10, 10).0;
    assert!(r < 200 && b > 50, "got {:?}", [r, g, b]);

    state.set_adjustments(0, 50).unwrap();
    let brighter = compose(&state, &rep).image;
    assert!(close(brighter.get_pixel(10, 10), [255, 150, 75], 2));
}
