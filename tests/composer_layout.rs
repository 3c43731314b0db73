//! Layout randomization properties

mod common;

use common::{solid_rgb, solid_rgba};
use cutout_composer::composer::layout::{left_zone_end, right_zone_start};
use cutout_composer::{ComposerState, Error, Pool};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

fn session_with_decorations(dir: &TempDir) -> ComposerState {
    let mut state = ComposerState::new();
    state
        .add(Pool::Backgrounds, [solid_rgb(dir.path(), "bg.png", (30, 20), [0, 128, 0])])
        .unwrap();
    state
        .add(Pool::Representatives, [solid_rgb(dir.path(), "rep.png", (10, 10), [0, 0, 255])])
        .unwrap();
    state
        .add(
            Pool::LeftDecorations,
            [solid_rgba(dir.path(), "left.png", (200, 200), [255, 0, 0, 255])],
        )
        .unwrap();
    state
        .add(
            Pool::RightDecorations,
            [solid_rgba(dir.path(), "right.png", (300, 100), [255, 255, 0, 255])],
        )
        .unwrap();
    state
}

#[test]
fn test_left_decoration_stays_in_left_zone() {
    let dir = TempDir::new().unwrap();
    let mut state = session_with_decorations(&dir);
    let mut rng = StdRng::seed_from_u64(2024);

    // 200x200 at the default 0.5 scale is a 100x100 decoration
    let x_max = left_zone_end() - 100;
    for _ in 0..1000 {
        state.randomize_with(&mut rng).unwrap();
        let left = state.layout().left.as_ref().unwrap();
        assert!(left.position.x <= x_max, "x = {}", left.position.x);
        assert!(left.position.y <= 1100, "y = {}", left.position.y);
    }
}

#[test]
fn test_right_decoration_stays_in_right_zone() {
    let dir = TempDir::new().unwrap();
    let mut state = session_with_decorations(&dir);
    state.set_scales(0.5, 1.0).unwrap();
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..500 {
        state.randomize_with(&mut rng).unwrap();
        let right = state.layout().right.as_ref().unwrap();
        assert!((right_zone_start()..=1500).contains(&right.position.x));
        assert!(right.position.y <= 1100);
    }
}

#[test]
fn test_empty_decoration_pools_leave_sides_empty() {
    let dir = TempDir::new().unwrap();
    let mut state = session_with_decorations(&dir);
    state.clear(Pool::LeftDecorations).unwrap();
    state.clear(Pool::RightDecorations).unwrap();

    state.randomize().unwrap();
    assert!(state.layout().background.is_some());
    assert!(state.layout().left.is_none());
    assert!(state.layout().right.is_none());
}

#[test]
fn test_failed_randomize_keeps_previous_layout() {
    let dir = TempDir::new().unwrap();
    let mut state = session_with_decorations(&dir);
    state.randomize_with(&mut StdRng::seed_from_u64(5)).unwrap();
    let committed = state.layout().clone();

    state.clear(Pool::Backgrounds).unwrap();
    assert!(matches!(state.randomize(), Err(Error::Validation(_))));
    assert_eq!(state.layout(), &committed);
    assert!(state.is_locked());
}

#[test]
fn test_selection_draws_from_pool() {
    let dir = TempDir::new().unwrap();
    let mut state = session_with_decorations(&dir);
    let extra = solid_rgb(dir.path(), "bg2.png", (30, 20), [0, 0, 0]);
    state.add(Pool::Backgrounds, [extra.clone()]).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let mut seen_extra = false;
    for _ in 0..200 {
        state.randomize_with(&mut rng).unwrap();
        let background = state.layout().background.clone().unwrap();
        assert!(state.pool(Pool::Backgrounds).contains(&background));
        seen_extra |= background == extra;
    }
    assert!(seen_extra);
    assert_eq!(state.pool(Pool::Backgrounds).len(), 2);
}
