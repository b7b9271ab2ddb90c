//! Tiling patterns and the pattern resources that wrap both pattern types.

use crate::document::RenderOptions;
use crate::geometry::{Matrix, Rect, Size};
use crate::gradient::{GradientDescriptor, render_shading_pattern};
use crate::registry::{ResourceList, ResourceListBuilder};
use crate::writer::{ObjRef, PdfWriter, fmt};
use sha2::{Digest, Sha256};

/// A tile dimension or offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatternLength {
    Absolute(f32),
    /// Percentage of the target bounds along the same axis.
    Percent(f32),
}

impl PatternLength {
    pub fn resolve(self, extent: f32) -> f32 {
        match self {
            PatternLength::Absolute(value) => value,
            PatternLength::Percent(pct) => extent * pct / 100.0,
        }
    }

    fn key(self) -> String {
        match self {
            PatternLength::Absolute(value) => fmt(value),
            PatternLength::Percent(pct) => format!("{}%", fmt(pct)),
        }
    }
}

impl Default for PatternLength {
    fn default() -> Self {
        PatternLength::Absolute(0.0)
    }
}

/// A repeating cell drawn by the caller.
///
/// `content` is the tile's content stream in view-box units; `resources`
/// collects whatever that stream uses (fonts, images, nested patterns).
#[derive(Debug, Clone, PartialEq)]
pub struct TilingPatternDescriptor {
    pub width: PatternLength,
    pub height: PatternLength,
    pub offset_x: PatternLength,
    pub offset_y: PatternLength,
    pub view_box: Option<Rect>,
    pub content: Vec<u8>,
    pub resources: ResourceListBuilder,
}

impl TilingPatternDescriptor {
    pub fn new(width: PatternLength, height: PatternLength, content: impl Into<Vec<u8>>) -> Self {
        Self {
            width,
            height,
            offset_x: PatternLength::default(),
            offset_y: PatternLength::default(),
            view_box: None,
            content: content.into(),
            resources: ResourceListBuilder::new(),
        }
    }

    pub fn with_view_box(mut self, view_box: Rect) -> Self {
        self.view_box = Some(view_box);
        self
    }

    pub fn with_offset(mut self, x: PatternLength, y: PatternLength) -> Self {
        self.offset_x = x;
        self.offset_y = y;
        self
    }

    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.content);
        let digest = hasher.finalize();
        let content: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        let view_box = match self.view_box {
            Some(vb) => format!(
                "{} {} {} {}",
                fmt(vb.x),
                fmt(vb.y),
                fmt(vb.width),
                fmt(vb.height)
            ),
            None => "auto".to_string(),
        };
        let mut key = format!(
            "tile {}x{} +{},{} [{}] {}",
            self.width.key(),
            self.height.key(),
            self.offset_x.key(),
            self.offset_y.key(),
            view_box,
            content
        );
        for resource in self.resources.keys() {
            key.push(' ');
            key.push_str(&resource.to_string());
        }
        key
    }
}

/// Step, content box and placement of a tile over one target shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingGeometry {
    pub step: Size,
    pub bbox: Rect,
    pub matrix: Matrix,
}

/// Scales the view-box into the declared size of `bounds`, keeping its
/// aspect ratio and centring it in the cell, and places the result in the
/// bottom-left-origin space of a container `container_height` tall.
pub fn tiling_geometry(
    descriptor: &TilingPatternDescriptor,
    bounds: Rect,
    container_height: f32,
) -> TilingGeometry {
    let cell = Size::new(
        descriptor.width.resolve(bounds.width),
        descriptor.height.resolve(bounds.height),
    );
    let view_box = descriptor
        .view_box
        .unwrap_or(Rect::new(0.0, 0.0, cell.width, cell.height));
    let offset_x = descriptor.offset_x.resolve(bounds.width);
    let offset_y = descriptor.offset_y.resolve(bounds.height);

    let usable = cell.width > 0.0
        && cell.height > 0.0
        && view_box.width > 0.0
        && view_box.height > 0.0;
    if !usable {
        log::warn!(
            "degenerate tiling pattern {}x{} over view-box {}x{}; drawn unscaled",
            cell.width,
            cell.height,
            view_box.width,
            view_box.height
        );
        let step = Size::new(view_box.width.max(1.0), view_box.height.max(1.0));
        let top = container_height - bounds.y - step.height;
        return TilingGeometry {
            step,
            bbox: view_box,
            matrix: Matrix::translate(bounds.x + offset_x, top + offset_y),
        };
    }

    let stretch = (view_box.width / cell.width).max(view_box.height / cell.height);
    let step = Size::new(cell.width * stretch, cell.height * stretch);
    let scale = (cell.width / view_box.width).min(cell.height / view_box.height);
    let e = bounds.x + (cell.width - scale * view_box.width) / 2.0 + offset_x
        - scale * view_box.x;
    let f = container_height - bounds.y - cell.height
        + (cell.height - scale * view_box.height) / 2.0
        + offset_y
        - scale * view_box.y;
    TilingGeometry {
        step,
        bbox: view_box,
        matrix: Matrix::scale(scale, scale).then(Matrix::translate(e, f)),
    }
}

/// Emits a `PatternType 1` coloured tiling pattern with its content stream.
pub(crate) fn render_tiling_pattern(
    writer: &mut PdfWriter,
    descriptor: &TilingPatternDescriptor,
    geometry: &TilingGeometry,
    resources: &ResourceList,
    options: &RenderOptions,
) -> ObjRef {
    let bbox = geometry.bbox;
    writer.write_stream_object(
        &descriptor.content,
        options.compress_streams,
        options.stream_length,
        |w| {
            w.entry_name("Type", "Pattern");
            w.entry_int("PatternType", 1);
            w.entry_int("PaintType", 1);
            w.entry_int("TilingType", 1);
            w.entry_reals("BBox", &[bbox.left(), bbox.top(), bbox.right(), bbox.bottom()]);
            w.entry_real("XStep", geometry.step.width);
            w.entry_real("YStep", geometry.step.height);
            w.entry_reals("Matrix", &geometry.matrix.to_array());
            w.begin_entry("Resources");
            resources.write(w);
        },
    )
}

/// A pattern fill bound to one target shape.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PatternResource {
    Shading {
        descriptor: GradientDescriptor,
        bounds: Rect,
        container_height: f32,
    },
    Tiling {
        descriptor: TilingPatternDescriptor,
        bounds: Rect,
        container_height: f32,
    },
}

impl PatternResource {
    pub(crate) fn key(&self) -> String {
        let (label, descriptor_key, bounds, container_height) = match self {
            PatternResource::Shading {
                descriptor,
                bounds,
                container_height,
            } => ("shading", descriptor.key(), bounds, container_height),
            PatternResource::Tiling {
                descriptor,
                bounds,
                container_height,
            } => ("tiling", descriptor.key(), bounds, container_height),
        };
        format!(
            "{} h{} [{} {} {} {}] {}",
            label,
            fmt(*container_height),
            fmt(bounds.x),
            fmt(bounds.y),
            fmt(bounds.width),
            fmt(bounds.height),
            descriptor_key
        )
    }

    /// The private resource list a tile draws with, if any.
    pub(crate) fn sub_resources(&self) -> Option<&ResourceListBuilder> {
        match self {
            PatternResource::Tiling { descriptor, .. } => Some(&descriptor.resources),
            PatternResource::Shading { .. } => None,
        }
    }

    /// `resources` is the finalized sub-resource list; shading patterns ignore it.
    pub(crate) fn render(
        &self,
        writer: &mut PdfWriter,
        resources: Option<&ResourceList>,
        options: &RenderOptions,
    ) -> ObjRef {
        match self {
            PatternResource::Shading {
                descriptor,
                bounds,
                container_height,
            } => render_shading_pattern(
                writer,
                descriptor,
                *bounds,
                *container_height,
                options.color_space,
            ),
            PatternResource::Tiling {
                descriptor,
                bounds,
                container_height,
            } => {
                let geometry = tiling_geometry(descriptor, *bounds, *container_height);
                let empty = ResourceList::empty();
                let resources = resources.unwrap_or(&empty);
                render_tiling_pattern(writer, descriptor, &geometry, resources, options)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::approx;
    use crate::registry::{ResourceKey, ResourceKind, ResourceRegistry};
    use crate::writer::{PdfVersion, StreamLength};

    const CONTAINER: f32 = 105.0;

    fn percent_tile(pct: f32) -> TilingPatternDescriptor {
        TilingPatternDescriptor::new(
            PatternLength::Percent(pct),
            PatternLength::Percent(pct),
            b"0 0 10 10 re f".to_vec(),
        )
        .with_view_box(Rect::new(0.0, 0.0, 10.0, 10.0))
    }

    fn assert_geometry(geometry: TilingGeometry, step: (f32, f32), matrix: [f32; 6]) {
        assert!(
            approx(geometry.step.width, step.0, 0.01) && approx(geometry.step.height, step.1, 0.01),
            "step {:?} != {:?}",
            geometry.step,
            step
        );
        let actual = geometry.matrix.to_array();
        for (a, e) in actual.iter().zip(matrix) {
            assert!(approx(*a, e, 1e-3), "matrix {:?} != {:?}", actual, matrix);
        }
    }

    #[test]
    fn percentage_tile_reference_values() {
        let g = tiling_geometry(&percent_tile(10.0), Rect::new(0.0, 0.0, 80.0, 90.0), CONTAINER);
        assert_geometry(g, (10.0, 11.25), [0.8, 0.0, 0.0, 0.8, 0.0, 96.5]);
        assert_eq!(g.bbox, Rect::new(0.0, 0.0, 10.0, 10.0));

        let g = tiling_geometry(&percent_tile(20.0), Rect::new(0.0, 0.0, 80.0, 30.0), CONTAINER);
        assert_geometry(g, (26.667, 10.0), [0.6, 0.0, 0.0, 0.6, 5.0, 99.0]);

        let g = tiling_geometry(&percent_tile(20.0), Rect::new(0.0, 0.0, 150.0, 90.0), CONTAINER);
        assert_geometry(g, (16.667, 10.0), [1.8, 0.0, 0.0, 1.8, 6.0, 87.0]);

        let g = tiling_geometry(&percent_tile(10.0), Rect::new(0.0, 0.0, 50.0, 90.0), CONTAINER);
        assert_geometry(g, (10.0, 18.0), [0.5, 0.0, 0.0, 0.5, 0.0, 98.0]);
    }

    #[test]
    fn offsets_shift_the_matrix() {
        let tile = percent_tile(10.0).with_offset(PatternLength::Percent(5.0), PatternLength::Percent(5.0));
        let g = tiling_geometry(&tile, Rect::new(0.0, 0.0, 80.0, 90.0), CONTAINER);
        assert!(approx(g.matrix.e, 4.0, 1e-3));
        assert!(approx(g.matrix.f, 101.0, 1e-3));
    }

    #[test]
    fn absolute_tile_without_view_box_is_identity_scaled() {
        let tile = TilingPatternDescriptor::new(
            PatternLength::Absolute(12.0),
            PatternLength::Absolute(8.0),
            Vec::new(),
        );
        let g = tiling_geometry(&tile, Rect::new(20.0, 30.0, 100.0, 100.0), 200.0);
        assert_geometry(g, (12.0, 8.0), [1.0, 0.0, 0.0, 1.0, 20.0, 162.0]);
        assert_eq!(g.bbox, Rect::new(0.0, 0.0, 12.0, 8.0));
    }

    #[test]
    fn degenerate_tile_falls_back_to_view_box() {
        let g = tiling_geometry(&percent_tile(0.0), Rect::new(0.0, 0.0, 80.0, 90.0), CONTAINER);
        assert_geometry(g, (10.0, 10.0), [1.0, 0.0, 0.0, 1.0, 0.0, 95.0]);
    }

    #[test]
    fn tiling_dictionary_carries_step_matrix_and_resources() {
        let mut registry = ResourceRegistry::new();
        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        let mut tile = percent_tile(10.0);
        let image = ResourceKey::new(ResourceKind::XObject, "dot.png");
        registry.register(&image, &mut tile.resources);
        registry
            .ensure_rendered(&image, &mut writer, |_, w, _| {
                let reference = w.begin_object();
                w.write_int(0);
                w.end_object();
                Ok(reference)
            })
            .expect("image");
        let list = tile.resources.finish(&registry).expect("resources");

        let resource = PatternResource::Tiling {
            descriptor: tile,
            bounds: Rect::new(0.0, 0.0, 80.0, 90.0),
            container_height: CONTAINER,
        };
        let options = RenderOptions {
            compress_streams: false,
            stream_length: StreamLength::Direct,
            ..RenderOptions::default()
        };
        let reference = resource.render(&mut writer, Some(&list), &options);
        assert_eq!(reference.number(), 2);
        let out = String::from_utf8_lossy(&writer.finish(None)).into_owned();
        assert!(out.contains(
            "<< /Type /Pattern /PatternType 1 /PaintType 1 /TilingType 1 /BBox [0 0 10 10] /XStep 10 /YStep 11.25 /Matrix [0.8 0 0 0.8 0 96.5] /Resources << /XObject << /Im1 1 0 R >>"
        ));
        assert!(out.contains("/Length 14 >>\nstream\n0 0 10 10 re f\nendstream"));
    }

    #[test]
    fn compressed_tile_content_is_flate_encoded() {
        let resource = PatternResource::Tiling {
            descriptor: percent_tile(10.0),
            bounds: Rect::new(0.0, 0.0, 80.0, 90.0),
            container_height: CONTAINER,
        };
        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        resource.render(&mut writer, None, &RenderOptions::default());
        let out = String::from_utf8_lossy(&writer.finish(None)).into_owned();
        assert!(out.contains("/Filter /FlateDecode"));
        assert!(out.contains("/Resources << /ProcSet"));
    }

    #[test]
    fn keys_separate_shapes_and_containers() {
        let tile = percent_tile(10.0);
        let a = PatternResource::Tiling {
            descriptor: tile.clone(),
            bounds: Rect::new(0.0, 0.0, 80.0, 90.0),
            container_height: CONTAINER,
        };
        let b = PatternResource::Tiling {
            descriptor: tile.clone(),
            bounds: Rect::new(0.0, 0.0, 80.0, 91.0),
            container_height: CONTAINER,
        };
        let c = PatternResource::Tiling {
            descriptor: tile.clone(),
            bounds: Rect::new(0.0, 0.0, 80.0, 90.0),
            container_height: 200.0,
        };
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_eq!(a.key(), a.clone().key());

        let mut other = tile.clone();
        other.content = b"1 0 0 rg 0 0 10 10 re f".to_vec();
        assert_ne!(tile.key(), other.key());
        assert!(a.sub_resources().is_some());
    }
}
