//! Gradient descriptors and their shading-pattern emission.

use crate::geometry::{
    Point, RadialPosition, RadialSize, Rect, linear_gradient_segment, normalize_angle,
    radial_centre, radial_radius,
};
use crate::types::{Color, ColorSpace, clamp_unit};
use crate::writer::{ObjRef, PdfWriter, fmt};

/// Shortest repeat length still treated as repeating.
const MIN_REPEAT_LENGTH: f32 = 0.001;
const OFFSET_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub color: Color,
    /// Position in `[0, 1]`; `None` lets the stop be placed automatically.
    pub offset: Option<f32>,
}

impl GradientStop {
    pub fn new(color: Color, offset: f32) -> Self {
        Self {
            color,
            offset: Some(offset),
        }
    }

    pub fn auto(color: Color) -> Self {
        Self {
            color,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedStop {
    pub offset: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientShape {
    /// Angle in degrees; 0 runs left to right, increasing clockwise.
    Linear { angle: f32 },
    Radial {
        x: RadialPosition,
        y: RadialPosition,
        size: RadialSize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientDescriptor {
    pub shape: GradientShape,
    pub stops: Vec<GradientStop>,
    pub repeating: bool,
}

impl GradientDescriptor {
    pub fn linear(angle: f32, stops: Vec<GradientStop>) -> Self {
        Self {
            shape: GradientShape::Linear { angle },
            stops,
            repeating: false,
        }
    }

    /// A radial gradient centred on the shape, sized to its farthest side.
    pub fn radial(stops: Vec<GradientStop>) -> Self {
        Self {
            shape: GradientShape::Radial {
                x: RadialPosition::Centre,
                y: RadialPosition::Centre,
                size: RadialSize::default(),
            },
            stops,
            repeating: false,
        }
    }

    pub fn with_centre(mut self, centre_x: RadialPosition, centre_y: RadialPosition) -> Self {
        if let GradientShape::Radial { x, y, .. } = &mut self.shape {
            *x = centre_x;
            *y = centre_y;
        }
        self
    }

    pub fn with_size(mut self, radial_size: RadialSize) -> Self {
        if let GradientShape::Radial { size, .. } = &mut self.shape {
            *size = radial_size;
        }
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeating = true;
        self
    }

    /// Stable identity for registry lookups.
    pub fn key(&self) -> String {
        let mut key = match self.shape {
            GradientShape::Linear { angle } => format!("linear {}", fmt(normalize_angle(angle))),
            GradientShape::Radial { x, y, size } => format!("radial {x:?} {y:?} {size:?}"),
        };
        if self.repeating {
            key.push_str(" repeating");
        }
        for stop in &self.stops {
            key.push_str(&format!(
                " {},{},{}@{}",
                fmt(stop.color.r),
                fmt(stop.color.g),
                fmt(stop.color.b),
                stop.offset.map(fmt).unwrap_or_else(|| "auto".to_string())
            ));
        }
        key
    }

    /// Stops with every offset placed, clamped and non-decreasing, covering
    /// `[0, 1]`. Repeating gradients have their pattern unrolled up to 1.
    pub fn resolve_stops(&self) -> Vec<ResolvedStop> {
        let placed = place_offsets(&self.stops);
        if self.repeating {
            if let Some(repeated) = repeat_stops(&placed) {
                return pad_stops(repeated);
            }
        }
        pad_stops(placed)
    }

    /// Shading coordinates for `bounds`, in bottom-left-origin space.
    pub(crate) fn geometry(&self, bounds: Rect, container_height: f32) -> ShadingGeometry {
        match self.shape {
            GradientShape::Linear { angle } => {
                let (start, end) = linear_gradient_segment(bounds, angle);
                ShadingGeometry::Axial {
                    start: start.flip_y(container_height),
                    end: end.flip_y(container_height),
                }
            }
            GradientShape::Radial { x, y, size } => {
                let centre = radial_centre(bounds, x, y);
                let radius = radial_radius(bounds, centre, size, self.repeating);
                ShadingGeometry::Radial {
                    centre: centre.flip_y(container_height),
                    radius,
                }
            }
        }
    }
}

fn place_offsets(stops: &[GradientStop]) -> Vec<ResolvedStop> {
    match stops {
        [] => {
            return vec![
                ResolvedStop {
                    offset: 0.0,
                    color: Color::BLACK,
                },
                ResolvedStop {
                    offset: 1.0,
                    color: Color::BLACK,
                },
            ];
        }
        [only] => {
            return vec![
                ResolvedStop {
                    offset: 0.0,
                    color: only.color,
                },
                ResolvedStop {
                    offset: 1.0,
                    color: only.color,
                },
            ];
        }
        _ => {}
    }

    let last = stops.len() - 1;
    let mut offsets: Vec<Option<f32>> = stops
        .iter()
        .map(|stop| stop.offset.filter(|v| v.is_finite()).map(clamp_unit))
        .collect();
    if offsets[0].is_none() {
        offsets[0] = Some(0.0);
    }
    if offsets[last].is_none() {
        offsets[last] = Some(1.0);
    }

    let mut index = 1;
    while index < last {
        if offsets[index].is_some() {
            index += 1;
            continue;
        }
        let before = index - 1;
        let mut after = index;
        while offsets[after].is_none() {
            after += 1;
        }
        let from = offsets[before].unwrap_or(0.0);
        let to = offsets[after].unwrap_or(1.0);
        let steps = (after - before) as f32;
        for (step, slot) in offsets[before + 1..after].iter_mut().enumerate() {
            *slot = Some(from + (to - from) * (step + 1) as f32 / steps);
        }
        index = after;
    }

    let mut previous = 0.0f32;
    stops
        .iter()
        .zip(offsets)
        .map(|(stop, offset)| {
            let offset = offset.unwrap_or(previous).max(previous);
            previous = offset;
            ResolvedStop {
                offset,
                color: stop.color,
            }
        })
        .collect()
}

/// Unrolls the stop pattern forward until it reaches 1. `None` when the
/// pattern has no length to repeat.
fn repeat_stops(stops: &[ResolvedStop]) -> Option<Vec<ResolvedStop>> {
    let first = stops.first()?.offset;
    let last = stops.last()?.offset;
    let length = last - first;
    if length < MIN_REPEAT_LENGTH {
        log::debug!("repeating gradient with zero-length pattern drawn once");
        return None;
    }
    let mut out: Vec<ResolvedStop> = stops.to_vec();
    if last >= 1.0 - OFFSET_EPSILON {
        return Some(out);
    }
    let mut cycle = 1u32;
    loop {
        for stop in stops {
            let offset = stop.offset + length * cycle as f32;
            if offset >= 1.0 - OFFSET_EPSILON {
                let color = if offset <= 1.0 + OFFSET_EPSILON {
                    stop.color
                } else {
                    let previous = out.last().copied().unwrap_or(*stop);
                    let span = offset - previous.offset;
                    let t = if span > 0.0 {
                        (1.0 - previous.offset) / span
                    } else {
                        1.0
                    };
                    previous.color.lerp(stop.color, t)
                };
                out.push(ResolvedStop { offset: 1.0, color });
                return Some(out);
            }
            out.push(ResolvedStop {
                offset,
                color: stop.color,
            });
        }
        cycle += 1;
    }
}

fn pad_stops(mut stops: Vec<ResolvedStop>) -> Vec<ResolvedStop> {
    if let Some(first) = stops.first().copied() {
        if first.offset > 0.0 {
            stops.insert(
                0,
                ResolvedStop {
                    offset: 0.0,
                    color: first.color,
                },
            );
        }
    }
    if let Some(last) = stops.last().copied() {
        if last.offset < 1.0 {
            stops.push(ResolvedStop {
                offset: 1.0,
                color: last.color,
            });
        }
    }
    stops
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ShadingGeometry {
    Axial { start: Point, end: Point },
    Radial { centre: Point, radius: f32 },
}

/// Writes the colour function for `stops` as the next value: a single
/// exponential function for two stops, a stitching function otherwise.
pub(crate) fn write_function(writer: &mut PdfWriter, stops: &[ResolvedStop], space: ColorSpace) {
    if let [from, to] = stops {
        write_exponential(writer, from.color, to.color, space);
        return;
    }
    writer.begin_dictionary();
    writer.entry_int("FunctionType", 3);
    writer.entry_reals("Domain", &[0.0, 1.0]);
    writer.begin_entry("Functions");
    writer.begin_array();
    for pair in stops.windows(2) {
        write_exponential(writer, pair[0].color, pair[1].color, space);
    }
    writer.end_array();
    let interior = stops.get(1..stops.len().saturating_sub(1)).unwrap_or(&[]);
    let bounds: Vec<f32> = interior.iter().map(|stop| stop.offset).collect();
    writer.entry_reals("Bounds", &bounds);
    let encode: Vec<f32> = stops.windows(2).flat_map(|_| [0.0, 1.0]).collect();
    writer.entry_reals("Encode", &encode);
    writer.end_dictionary();
}

fn write_exponential(writer: &mut PdfWriter, from: Color, to: Color, space: ColorSpace) {
    writer.begin_dictionary();
    writer.entry_int("FunctionType", 2);
    writer.entry_reals("Domain", &[0.0, 1.0]);
    writer.entry_reals("C0", &from.components(space));
    writer.entry_reals("C1", &to.components(space));
    writer.entry_int("N", 1);
    writer.end_dictionary();
}

/// Emits a `PatternType 2` shading pattern for `descriptor` over `bounds`.
pub(crate) fn render_shading_pattern(
    writer: &mut PdfWriter,
    descriptor: &GradientDescriptor,
    bounds: Rect,
    container_height: f32,
    space: ColorSpace,
) -> ObjRef {
    let stops = descriptor.resolve_stops();
    let geometry = descriptor.geometry(bounds, container_height);
    let bbox = bounds.flip_y(container_height);

    let pattern = writer.begin_object();
    writer.begin_dictionary();
    writer.entry_name("Type", "Pattern");
    writer.entry_int("PatternType", 2);
    writer.begin_entry("Shading");
    writer.begin_dictionary();
    match geometry {
        ShadingGeometry::Axial { .. } => writer.entry_int("ShadingType", 2),
        ShadingGeometry::Radial { .. } => writer.entry_int("ShadingType", 3),
    }
    writer.entry_name("ColorSpace", space.pdf_name());
    writer.entry_reals("BBox", &[bbox.left(), bbox.top(), bbox.right(), bbox.bottom()]);
    writer.entry_bool("AntiAlias", true);
    match geometry {
        ShadingGeometry::Axial { start, end } => {
            writer.entry_reals("Coords", &[start.x, start.y, end.x, end.y]);
        }
        ShadingGeometry::Radial { centre, radius } => {
            writer.entry_reals("Coords", &[centre.x, centre.y, 0.0, centre.x, centre.y, radius]);
        }
    }
    writer.begin_entry("Function");
    write_function(writer, &stops, space);
    writer.begin_entry("Extend");
    writer.begin_array();
    writer.write_bool(true);
    writer.write_bool(true);
    writer.end_array();
    writer.end_dictionary();
    writer.end_dictionary();
    writer.end_object();
    pattern
}
