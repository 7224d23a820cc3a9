//! Projection of geographic positions and scaling onto the drawing surface.

use std::f64::consts::PI;

use crate::geometry::Position;

/// Side of the square the Mercator projection maps onto.
const MERCATOR_EXTENT: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Projection {
    #[default]
    Identity,
    /// Longitude/latitude in degrees onto a 0..100 square, y pointing up.
    Mercator,
}

impl Projection {
    pub fn project(self, [x, y]: Position) -> Position {
        match self {
            Projection::Identity => [x, y],
            Projection::Mercator => {
                let px = (x + 180.0) * (MERCATOR_EXTENT / 360.0);
                let lat = y * PI / 180.0;
                let merc_n = (PI / 4.0 + lat / 2.0).tan().ln();
                let py = MERCATOR_EXTENT / 2.0 - MERCATOR_EXTENT * merc_n / (2.0 * PI);
                [px, MERCATOR_EXTENT - py]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Bounds of the projected positions, `None` when there are none.
    pub fn from_positions<I>(projection: Projection, positions: I) -> Option<Self>
    where
        I: IntoIterator<Item = Position>,
    {
        let mut iter = positions.into_iter().map(|p| projection.project(p));
        let [x, y] = iter.next()?;
        let mut bbox = BoundingBox {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        };
        for [x, y] in iter {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0 && self.height() == 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Padding {
    pub fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

/// Maps source positions to drawing coordinates for one draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleFunction {
    /// Nothing to fit: positions are only projected.
    Project(Projection),
    /// Every position lands on the centre of the usable area.
    Centre([f64; 2]),
    Fit {
        projection: Projection,
        bounds: BoundingBox,
        resolution: f64,
        padding: Padding,
    },
}

impl ScaleFunction {
    pub fn new(
        width: f64,
        height: f64,
        padding: Padding,
        bounds: Option<BoundingBox>,
        point_count: usize,
        projection: Projection,
    ) -> Self {
        let usable_w = width - padding.left - padding.right;
        let usable_h = height - padding.top - padding.bottom;
        let Some(bounds) = bounds.filter(|_| point_count > 0) else {
            return ScaleFunction::Project(projection);
        };
        if point_count == 1 || bounds.is_degenerate() {
            return ScaleFunction::Centre([usable_w / 2.0, usable_h / 2.0]);
        }
        let resolution = (bounds.width() / usable_w).max(bounds.height() / usable_h);
        ScaleFunction::Fit {
            projection,
            bounds,
            resolution,
            padding,
        }
    }

    pub fn apply(&self, position: Position) -> Position {
        match *self {
            ScaleFunction::Project(projection) => projection.project(position),
            ScaleFunction::Centre(centre) => centre,
            ScaleFunction::Fit {
                projection,
                bounds,
                resolution,
                padding,
            } => {
                let [x, y] = projection.project(position);
                [
                    (x - bounds.min_x) / resolution + padding.left,
                    (bounds.max_y - y) / resolution + padding.top,
                ]
            }
        }
    }
}

/// Height that keeps the aspect ratio of `bounds` at the given width, rounded
/// half up. Falls back to `width` when the bounds have no horizontal extent.
pub fn height_for_width(width: f64, bounds: Option<&BoundingBox>) -> f64 {
    match bounds {
        Some(b) if b.width() > 0.0 => (width * b.height() / b.width() + 0.5).floor(),
        _ => width,
    }
}
