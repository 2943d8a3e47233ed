use nalgebra as na;

pub type Vector2d = na::Vector2<f64>;
pub type Matrix2d = na::Matrix2<f64>;

pub type Matrixd = na::DMatrix<f64>;

/// Identity of one physical object across frames. Issued monotonically and
/// never reused once evicted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned box in pixel coordinates, `min` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vector2d,
    pub max: Vector2d,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min: Vector2d::new(x1.min(x2), y1.min(y2)),
            max: Vector2d::new(x1.max(x2), y1.max(y2)),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Vector2d {
        (self.min + self.max) / 2.
    }

    /// Middle of the bottom edge, where a vehicle touches the road.
    pub fn bottom_center(&self) -> Vector2d {
        Vector2d::new((self.min.x + self.max.x) / 2., self.max.y)
    }
}
