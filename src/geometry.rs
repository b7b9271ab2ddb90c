//! Points, rectangles and affine matrices, plus the solvers that turn a
//! gradient's abstract geometry into coordinates for a concrete shape.
//!
//! Rectangles are expressed in a top-left-origin, y-down space; callers flip
//! into PDF space with [`Point::flip_y`] once the container height is known.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Mirrors a top-left-origin point into bottom-left-origin space.
    pub fn flip_y(self, container_height: f32) -> Point {
        Point::new(self.x, container_height - self.y)
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn centre(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// The rectangle mirrored into bottom-left-origin space.
    pub fn flip_y(&self, container_height: f32) -> Rect {
        Rect::new(
            self.x,
            container_height - self.y - self.height,
            self.width,
            self.height,
        )
    }
}

/// A 2D affine transform `[a b c d e f]` in PDF operand order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(x: f32, y: f32) -> Matrix {
        Matrix {
            e: x,
            f: y,
            ..Matrix::IDENTITY
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Matrix {
        Matrix {
            a: sx,
            d: sy,
            ..Matrix::IDENTITY
        }
    }

    /// `self` applied first, then `other`.
    pub fn then(self, other: Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn transform(&self, point: Point) -> Point {
        Point::new(
            self.a * point.x + self.c * point.y + self.e,
            self.b * point.x + self.d * point.y + self.f,
        )
    }

    pub fn to_array(&self) -> [f32; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

/// Normalizes any angle in degrees into `[0, 360)`.
pub fn normalize_angle(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees % 360.0;
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

/// The shortest segment whose perpendicular sweep at `angle_degrees` covers
/// `rect`. Angle 0 runs left to right; angles increase clockwise.
///
/// Returned points are in the rectangle's own top-left-origin space.
pub fn linear_gradient_segment(rect: Rect, angle_degrees: f32) -> (Point, Point) {
    let angle = normalize_angle(angle_degrees);
    match axis_segment(rect, angle) {
        Some(segment) => segment,
        None => general_segment(rect, angle),
    }
}

// Diagonal angles run corner to corner, whatever the aspect ratio.
fn axis_segment(rect: Rect, angle: f32) -> Option<(Point, Point)> {
    let (l, t, r, b) = (rect.left(), rect.top(), rect.right(), rect.bottom());
    let segment = if angle == 0.0 {
        (Point::new(l, t), Point::new(r, t))
    } else if angle == 45.0 {
        (Point::new(l, t), Point::new(r, b))
    } else if angle == 90.0 {
        (Point::new(l, t), Point::new(l, b))
    } else if angle == 135.0 {
        (Point::new(r, t), Point::new(l, b))
    } else if angle == 180.0 {
        (Point::new(r, t), Point::new(l, t))
    } else if angle == 225.0 {
        (Point::new(r, b), Point::new(l, t))
    } else if angle == 270.0 {
        (Point::new(l, b), Point::new(l, t))
    } else if angle == 315.0 {
        (Point::new(l, b), Point::new(r, t))
    } else {
        return None;
    };
    Some(segment)
}

/// Projects the leading corner and its opposite onto the line through the
/// centre, then anchors the projected span at the leading corner.
fn general_segment(rect: Rect, angle: f32) -> (Point, Point) {
    let radians = angle.to_radians();
    let (dx, dy) = (snap_zero(radians.cos()), snap_zero(radians.sin()));
    let lead = Point::new(
        if dx >= 0.0 { rect.left() } else { rect.right() },
        if dy >= 0.0 { rect.top() } else { rect.bottom() },
    );
    let trail = Point::new(
        if dx >= 0.0 { rect.right() } else { rect.left() },
        if dy >= 0.0 { rect.bottom() } else { rect.top() },
    );
    let centre = rect.centre();
    let t_lead = (lead.x - centre.x) * dx + (lead.y - centre.y) * dy;
    let t_trail = (trail.x - centre.x) * dx + (trail.y - centre.y) * dy;
    let span = t_trail - t_lead;
    let end = Point::new(lead.x + span * dx, lead.y + span * dy);
    debug_assert!(
        ((end.x - trail.x) * dx + (end.y - trail.y) * dy).abs() <= 1e-3 * span.abs().max(1.0),
        "gradient end must lie on the perpendicular through the trailing corner"
    );
    (lead, end)
}

// cos(90deg) and friends come out of f32 trig as +-1e-8, which would pick the wrong corner.
fn snap_zero(value: f32) -> f32 {
    if value.abs() < 1e-6 { 0.0 } else { value }
}

/// A horizontal or vertical position inside a rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RadialPosition {
    /// Left or top edge.
    Start,
    Centre,
    /// Right or bottom edge.
    End,
    Absolute(f32),
    Percent(f32),
}

impl RadialPosition {
    fn resolve(self, extent: f32) -> f32 {
        match self {
            RadialPosition::Start => 0.0,
            RadialPosition::Centre => extent / 2.0,
            RadialPosition::End => extent,
            RadialPosition::Absolute(value) => value,
            RadialPosition::Percent(pct) => extent * pct / 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RadialSize {
    ClosestSide,
    #[default]
    FarthestSide,
    ClosestCorner,
    FarthestCorner,
    Explicit(f32),
}

pub(crate) const MIN_RADIUS: f32 = 0.01;

/// Resolves a centre relative to `rect`, returned in the rectangle's space.
pub fn radial_centre(rect: Rect, x: RadialPosition, y: RadialPosition) -> Point {
    Point::new(
        rect.x + x.resolve(rect.width),
        rect.y + y.resolve(rect.height),
    )
}

/// Resolves a radius for `centre` (rectangle space) under `size`.
///
/// Never returns a non-positive radius; degenerate input falls back to
/// `0.05 * width` for repeating gradients and to a small epsilon otherwise.
pub fn radial_radius(rect: Rect, centre: Point, size: RadialSize, repeating: bool) -> f32 {
    let x1 = (centre.x - rect.left()).abs();
    let x2 = (rect.right() - centre.x).abs();
    let y1 = (centre.y - rect.top()).abs();
    let y2 = (rect.bottom() - centre.y).abs();
    let radius = match size {
        RadialSize::ClosestCorner => {
            let x = x1.min(x2);
            let y = y1.min(y2);
            (x * x + y * y).sqrt()
        }
        RadialSize::FarthestCorner => {
            let x = x1.max(x2);
            let y = y1.max(y2);
            (x * x + y * y).sqrt()
        }
        RadialSize::ClosestSide => x1.min(x2).min(y1).min(y2),
        RadialSize::FarthestSide => x1.max(x2).max(y1).max(y2),
        RadialSize::Explicit(value) => value,
    };
    if radius.is_finite() && radius > 0.0 {
        return radius;
    }
    if repeating && rect.width > 0.0 {
        log::warn!("degenerate repeating radial gradient; using 5% of width as radius");
        rect.width * 0.05
    } else {
        log::warn!("degenerate radial gradient radius {radius}; clamped");
        MIN_RADIUS
    }
}

#[cfg(test)]
pub(crate) fn approx(a: f32, b: f32, tolerance: f32) -> bool {
    (a - b).abs() <= tolerance
}
