//! PDF resource encoding: fonts and their width tables, gradient and tiling
//! patterns, and images, each written at most once per document through a
//! stack-disciplined object writer.

mod debug;
mod document;
mod error;
mod font;
mod font_program;
mod font_render;
mod geometry;
mod gradient;
mod image;
mod pattern;
mod registry;
mod types;
mod widths;
mod writer;

pub use document::{RenderOptions, ResourceDocument, ResourceDocumentBuilder, ResourceHandle};
pub use error::ResourceError;
pub use font::{
    FontCatalog, FontDefinition, FontDescriptor, FontEncoding, FontStrategy, LineMetrics,
    MeasureOptions, StandardFont, TextMeasure, WrapMode, is_embeddable, measure_text,
    select_character_map, standard_font,
};
pub use font_program::{CharacterMap, FontProgram, TtfFontProgram};
pub use geometry::{
    Matrix, Point, RadialPosition, RadialSize, Rect, Size, linear_gradient_segment,
    normalize_angle, radial_centre, radial_radius,
};
pub use gradient::{GradientDescriptor, GradientShape, GradientStop, ResolvedStop};
pub use pattern::{PatternLength, TilingGeometry, TilingPatternDescriptor, tiling_geometry};
pub use registry::{ResourceKey, ResourceKind, ResourceList, ResourceListBuilder, ResourceRegistry};
pub use types::{Color, ColorSpace, Pt};
pub use widths::{ArrayWidths, ByteEncoding, CompositeWidths, FontWidths, GlyphWidths};
pub use writer::{ObjRef, PdfVersion, PdfWriter, StreamLength};
