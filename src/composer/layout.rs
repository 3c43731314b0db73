//! Canvas geometry: zones, placement ranges and representative sizing

/// Output canvas width in pixels
pub const CANVAS_WIDTH: u32 = 1800;
/// Output canvas height in pixels
pub const CANVAS_HEIGHT: u32 = 1200;
/// Neutral gray the canvas is filled with
pub const CANVAS_FILL: [u8; 3] = [220, 220, 220];
/// Longest side of the representative image on the canvas
pub const REPRESENTATIVE_MAX: u32 = 700;

/// Fraction of the canvas width where the left zone ends
pub const LEFT_ZONE_END: f32 = 0.33;
/// Fraction of the canvas width where the right zone starts
pub const RIGHT_ZONE_START: f32 = 0.67;

/// Canvas side a decoration belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Side::Left => "left decoration",
            Side::Right => "right decoration",
        }
    }
}

/// Top-left position on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    #[must_use]
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Inclusive range of valid top-left coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRange {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl PlacementRange {
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        (self.x_min..=self.x_max).contains(&position.x)
            && (self.y_min..=self.y_max).contains(&position.y)
    }
}

/// Last x coordinate of the left zone (⌊1800 · 0.33⌋ = 594)
#[must_use]
pub fn left_zone_end() -> u32 {
    (CANVAS_WIDTH as f32 * LEFT_ZONE_END) as u32
}

/// First x coordinate of the right zone (⌊1800 · 0.67⌋ = 1206)
#[must_use]
pub fn right_zone_start() -> u32 {
    (CANVAS_WIDTH as f32 * RIGHT_ZONE_START) as u32
}

/// Decoration size after scaling, truncated, at least one pixel
#[must_use]
pub fn scaled_size(natural: (u32, u32), scale: f32) -> (u32, u32) {
    let scale_axis = |v: u32| ((v as f32 * scale) as u32).max(1);
    (scale_axis(natural.0), scale_axis(natural.1))
}

/// Valid top-left positions for a decoration of `size` in its zone
///
/// When the decoration does not fit, the range collapses to the zone start.
#[must_use]
pub fn placement_range(side: Side, size: (u32, u32)) -> PlacementRange {
    let (w, h) = size;
    let (x_min, x_max) = match side {
        Side::Left => (0, left_zone_end().saturating_sub(w)),
        Side::Right => {
            let start = right_zone_start();
            (start, start.max(CANVAS_WIDTH.saturating_sub(w)))
        },
    };
    PlacementRange {
        x_min,
        x_max,
        y_min: 0,
        y_max: CANVAS_HEIGHT.saturating_sub(h),
    }
}

/// Clamp a stored position so a box of `size` stays on the canvas
///
/// The lower bound wins when the box is larger than the canvas.
#[must_use]
pub fn clamp_to_canvas(position: Position, size: (u32, u32)) -> Position {
    Position {
        x: position.x.min(CANVAS_WIDTH.saturating_sub(size.0)),
        y: position.y.min(CANVAS_HEIGHT.saturating_sub(size.1)),
    }
}

/// Size of the representative after a downscale-only fit into 700×700
#[must_use]
pub fn representative_size(natural: (u32, u32)) -> (u32, u32) {
    let (w, h) = natural;
    if w <= REPRESENTATIVE_MAX && h <= REPRESENTATIVE_MAX {
        return (w.max(1), h.max(1));
    }
    let scale = (f64::from(REPRESENTATIVE_MAX) / f64::from(w))
        .min(f64::from(REPRESENTATIVE_MAX) / f64::from(h));
    let fit = |v: u32| ((f64::from(v) * scale).round() as u32).clamp(1, REPRESENTATIVE_MAX);
    (fit(w), fit(h))
}

/// Centered top-left position for a box of `size` (integer division)
#[must_use]
pub fn centered(size: (u32, u32)) -> Position {
    Position {
        x: CANVAS_WIDTH.saturating_sub(size.0) / 2,
        y: CANVAS_HEIGHT.saturating_sub(size.1) / 2,
    }
}
