//! The per-document resource surface used by layout and rendering.
//!
//! A [`ResourceDocument`] owns the writer, the registry and every resource
//! requested so far. Callers ask for resources by what they need (a font
//! family, a gradient over a shape, an image source), register the returned
//! handles into their containers' resource lists and render them once.

use crate::debug::{DebugLogger, json_escape};
use crate::error::ResourceError;
use crate::font::{FontCatalog, FontDefinition, MeasureOptions, TextMeasure, measure_text};
use crate::font_program::FontProgram;
use crate::font_render::render_font;
use crate::geometry::Rect;
use crate::gradient::GradientDescriptor;
use crate::image::{ImageData, image_key, load_image, render_image};
use crate::pattern::{PatternResource, TilingPatternDescriptor};
use crate::registry::{
    ResourceKey, ResourceKind, ResourceList, ResourceListBuilder, ResourceRegistry,
};
use crate::types::{ColorSpace, Pt};
use crate::widths::{ByteEncoding, FontWidths, GlyphWidths};
use crate::writer::{ObjRef, PdfVersion, PdfWriter, StreamLength};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A4 portrait, in points.
const DEFAULT_CONTAINER_HEIGHT: f32 = 841.89;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    // When false, program-backed fonts use WinAnsi simple fonts (no CID/ToUnicode).
    pub unicode_support: bool,
    // Caller intent; a font's embedding restrictions can still veto it.
    pub embed_fonts: bool,
    // Flate-compress font files, image samples, tile content and ToUnicode maps.
    pub compress_streams: bool,
    pub pdf_version: PdfVersion,
    pub color_space: ColorSpace,
    pub stream_length: StreamLength,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            unicode_support: true,
            embed_fonts: true,
            compress_streams: true,
            pdf_version: PdfVersion::Pdf17,
            color_space: ColorSpace::Rgb,
            stream_length: StreamLength::Direct,
        }
    }
}

/// Identifies one resource of a [`ResourceDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    key: ResourceKey,
}

impl ResourceHandle {
    pub fn kind(&self) -> ResourceKind {
        self.key.kind()
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

#[derive(Debug)]
struct FontResource {
    definition: Arc<FontDefinition>,
    widths: FontWidths,
}

#[derive(Debug)]
enum Resource {
    Font(FontResource),
    Pattern(PatternResource),
    Image(ImageData),
}

pub struct ResourceDocumentBuilder {
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    font_data: Vec<(String, Vec<u8>)>,
    font_programs: Vec<(String, Arc<dyn FontProgram>)>,
    substitutions: Vec<(String, String)>,
    options: RenderOptions,
    container_height: f32,
    debug_path: Option<PathBuf>,
}

impl Default for ResourceDocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceDocumentBuilder {
    pub fn new() -> Self {
        Self {
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_data: Vec::new(),
            font_programs: Vec::new(),
            substitutions: Vec::new(),
            options: RenderOptions::default(),
            container_height: DEFAULT_CONTAINER_HEIGHT,
            debug_path: None,
        }
    }

    /// Every `.ttf`/`.otf` file directly inside `path`.
    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn register_font_bytes(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.font_data.push((name.into(), data));
        self
    }

    /// A font program parsed elsewhere.
    pub fn register_font_program(
        mut self,
        name: impl Into<String>,
        program: Arc<dyn FontProgram>,
    ) -> Self {
        self.font_programs.push((name.into(), program));
        self
    }

    /// Requests for `requested` may be satisfied by `actual`.
    pub fn font_substitution(
        mut self,
        requested: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        self.substitutions.push((requested.into(), actual.into()));
        self
    }

    pub fn options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    // Toggle Unicode text support (CID/Identity-H + ToUnicode).
    pub fn unicode_support(mut self, enabled: bool) -> Self {
        self.options.unicode_support = enabled;
        self
    }

    pub fn embed_fonts(mut self, enabled: bool) -> Self {
        self.options.embed_fonts = enabled;
        self
    }

    pub fn compress_streams(mut self, enabled: bool) -> Self {
        self.options.compress_streams = enabled;
        self
    }

    pub fn pdf_version(mut self, version: PdfVersion) -> Self {
        self.options.pdf_version = version;
        self
    }

    pub fn color_space(mut self, color_space: ColorSpace) -> Self {
        self.options.color_space = color_space;
        self
    }

    pub fn stream_length(mut self, mode: StreamLength) -> Self {
        self.options.stream_length = mode;
        self
    }

    /// Height of the page or form that pattern geometry is flipped against.
    pub fn container_height(mut self, height: f32) -> Self {
        self.container_height = height;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ResourceDocument, ResourceError> {
        validate_container_height(self.container_height)?;
        for (requested, actual) in &self.substitutions {
            if requested.trim().is_empty() || actual.trim().is_empty() {
                return Err(ResourceError::InvalidConfiguration(format!(
                    "font substitution '{}' -> '{}' needs both family names",
                    requested, actual
                )));
            }
        }

        let mut catalog = FontCatalog::new(self.options.unicode_support);
        for dir in &self.font_dirs {
            let loaded = catalog.add_dir(dir)?;
            log::debug!("loaded {} fonts from {}", loaded, dir.display());
        }
        for file in &self.font_files {
            catalog.add_file(file)?;
        }
        for (name, data) in self.font_data {
            catalog.add_bytes(data, &name)?;
        }
        for (name, program) in self.font_programs {
            catalog.add_program(program, &name)?;
        }
        for (requested, actual) in &self.substitutions {
            catalog.add_substitution(requested, actual);
        }

        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(ResourceDocument::with_parts(
            catalog,
            self.options,
            self.container_height,
            debug,
        ))
    }
}

fn validate_container_height(height: f32) -> Result<(), ResourceError> {
    if !height.is_finite() || height <= 0.0 {
        return Err(ResourceError::InvalidConfiguration(format!(
            "container height must be a positive number of points (got {})",
            height
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub struct ResourceDocument {
    options: RenderOptions,
    catalog: FontCatalog,
    registry: ResourceRegistry,
    writer: PdfWriter,
    resources: HashMap<ResourceKey, Resource>,
    // Creation order, so rendering everything is deterministic.
    order: Vec<ResourceKey>,
    container_height: f32,
    debug: Option<DebugLogger>,
}

impl ResourceDocument {
    pub fn builder() -> ResourceDocumentBuilder {
        ResourceDocumentBuilder::new()
    }

    fn with_parts(
        catalog: FontCatalog,
        options: RenderOptions,
        container_height: f32,
        debug: Option<DebugLogger>,
    ) -> Self {
        Self {
            options,
            catalog,
            registry: ResourceRegistry::with_debug(debug.clone()),
            writer: PdfWriter::new(options.pdf_version),
            resources: HashMap::new(),
            order: Vec::new(),
            container_height,
            debug,
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn container_height(&self) -> f32 {
        self.container_height
    }

    /// Applies to patterns requested from now on.
    pub fn set_container_height(&mut self, height: f32) -> Result<(), ResourceError> {
        validate_container_height(height)?;
        self.container_height = height;
        Ok(())
    }

    pub fn get_or_create_font_resource(
        &mut self,
        family: &str,
        weight: u16,
        italic: bool,
    ) -> Result<ResourceHandle, ResourceError> {
        let definition = self.catalog.resolve(family, weight, italic)?;
        let key = ResourceKey::new(ResourceKind::Font, definition.name());
        if !self.resources.contains_key(&key) {
            if let Some(debug) = &self.debug {
                debug.log_json(&format!(
                    "{{\"type\":\"font.selected\",\"family\":\"{}\",\"weight\":{},\"italic\":{},\"font\":\"{}\",\"strategy\":\"{:?}\",\"source\":\"{}\"}}",
                    json_escape(family),
                    weight,
                    italic,
                    json_escape(definition.name()),
                    definition.strategy(),
                    json_escape(definition.source())
                ));
            }
            let widths = definition.new_widths();
            self.insert(key.clone(), Resource::Font(FontResource { definition, widths }));
        }
        Ok(ResourceHandle { key })
    }

    pub fn font_definition(&self, handle: &ResourceHandle) -> Result<&Arc<FontDefinition>, ResourceError> {
        match self.resources.get(&handle.key) {
            Some(Resource::Font(font)) => Ok(&font.definition),
            _ => Err(ResourceError::UnknownResource(handle.key.to_string())),
        }
    }

    /// Fits `text` into `available` and records the fitted glyphs as used.
    pub fn measure_text(
        &mut self,
        handle: &ResourceHandle,
        text: &str,
        font_size: Pt,
        available: Pt,
        options: &MeasureOptions,
    ) -> Result<TextMeasure, ResourceError> {
        let font = self.font_mut(handle)?;
        Ok(measure_text(
            &font.definition,
            &mut font.widths,
            text,
            font_size,
            available,
            options,
        ))
    }

    /// Records every character of `text` as drawn and returns the text that
    /// will actually be shown, with unencodable characters replaced.
    pub fn register_glyphs(
        &mut self,
        handle: &ResourceHandle,
        text: &str,
    ) -> Result<String, ResourceError> {
        if self.registry.is_rendered(&handle.key) {
            log::warn!(
                "glyphs registered for {} after it was written; they are not in its width table",
                handle.key
            );
        }
        let debug = self.debug.clone();
        let font = self.font_mut(handle)?;
        let mut shown = String::with_capacity(text.len());
        for ch in text.chars() {
            let replacement = font.widths.register_glyph(ch);
            if replacement != ch {
                log::debug!(
                    "U+{:04X} not encodable in {}; drawn as U+{:04X}",
                    ch as u32,
                    font.definition.name(),
                    replacement as u32
                );
                if let Some(debug) = &debug {
                    debug.increment("glyph.replaced", 1);
                    debug.log_json(&format!(
                        "{{\"type\":\"glyph.replaced\",\"font\":\"{}\",\"char\":\"U+{:04X}\",\"replacement\":\"U+{:04X}\"}}",
                        json_escape(font.definition.name()),
                        ch as u32,
                        replacement as u32
                    ));
                }
            }
            shown.push(replacement);
        }
        Ok(shown)
    }

    /// The bytes a content stream shows for `text` with this font: two-byte
    /// glyph ids for composite fonts, single-byte codes otherwise.
    pub fn encode_text(&self, handle: &ResourceHandle, text: &str) -> Result<Vec<u8>, ResourceError> {
        let font = match self.resources.get(&handle.key) {
            Some(Resource::Font(font)) => font,
            _ => return Err(ResourceError::UnknownResource(handle.key.to_string())),
        };
        let bytes = match &font.widths {
            FontWidths::Composite(table) => table.encode_text(text),
            FontWidths::Array(table) => encode_single_byte(text, Some(table.encoding())),
            FontWidths::Empty => {
                encode_single_byte(text, font.definition.encoding().byte_encoding())
            }
        };
        Ok(bytes)
    }

    pub fn get_or_create_gradient_pattern(
        &mut self,
        descriptor: &GradientDescriptor,
        bounds: Rect,
    ) -> ResourceHandle {
        self.get_or_create_pattern(PatternResource::Shading {
            descriptor: descriptor.clone(),
            bounds,
            container_height: self.container_height,
        })
    }

    pub fn get_or_create_tiling_pattern(
        &mut self,
        descriptor: &TilingPatternDescriptor,
        bounds: Rect,
    ) -> ResourceHandle {
        self.get_or_create_pattern(PatternResource::Tiling {
            descriptor: descriptor.clone(),
            bounds,
            container_height: self.container_height,
        })
    }

    fn get_or_create_pattern(&mut self, pattern: PatternResource) -> ResourceHandle {
        let key = ResourceKey::new(ResourceKind::Pattern, pattern.key());
        if !self.resources.contains_key(&key) {
            self.insert(key.clone(), Resource::Pattern(pattern));
        }
        ResourceHandle { key }
    }

    /// An image from a file path or a `data:` URI. The image is decoded here so
    /// that unreadable sources fail at request time.
    pub fn get_or_create_image(&mut self, source: &str) -> Result<ResourceHandle, ResourceError> {
        let key = ResourceKey::new(ResourceKind::XObject, image_key(source));
        if !self.resources.contains_key(&key) {
            let image = load_image(source)?;
            self.insert(key.clone(), Resource::Image(image));
        }
        Ok(ResourceHandle { key })
    }

    /// Pixel dimensions of an image resource.
    pub fn image_size(&self, handle: &ResourceHandle) -> Option<(u32, u32)> {
        match self.resources.get(&handle.key) {
            Some(Resource::Image(image)) => Some((image.width, image.height)),
            _ => None,
        }
    }

    /// Records that the container behind `list` uses `handle`; returns the
    /// name to use in its content stream.
    pub fn register_use(&mut self, handle: &ResourceHandle, list: &mut ResourceListBuilder) -> String {
        self.registry.register(&handle.key, list)
    }

    /// Writes the resource, once. Later calls return the same reference.
    pub fn render(&mut self, handle: &ResourceHandle) -> Result<ObjRef, ResourceError> {
        self.render_key(&handle.key)
    }

    /// Renders every resource requested so far, in request order.
    pub fn render_all(&mut self) -> Result<(), ResourceError> {
        let keys = self.order.clone();
        for key in &keys {
            self.render_key(key)?;
        }
        Ok(())
    }

    /// Finalizes a container's resource list; everything in it must be rendered.
    pub fn resource_list(&self, list: &ResourceListBuilder) -> Result<ResourceList, ResourceError> {
        list.finish(&self.registry)
    }

    /// For objects the caller writes itself (catalog, pages, content streams).
    pub fn writer_mut(&mut self) -> &mut PdfWriter {
        &mut self.writer
    }

    pub fn finish(self, root: Option<ObjRef>) -> Vec<u8> {
        if let Some(debug) = &self.debug {
            debug.emit_summary("document");
            debug.flush();
        }
        self.writer.finish(root)
    }

    fn insert(&mut self, key: ResourceKey, resource: Resource) {
        self.order.push(key.clone());
        self.resources.insert(key, resource);
    }

    fn font_mut(&mut self, handle: &ResourceHandle) -> Result<&mut FontResource, ResourceError> {
        match self.resources.get_mut(&handle.key) {
            Some(Resource::Font(font)) => Ok(font),
            _ => Err(ResourceError::UnknownResource(handle.key.to_string())),
        }
    }

    fn render_key(&mut self, key: &ResourceKey) -> Result<ObjRef, ResourceError> {
        if let Some(reference) = self.registry.reference(key) {
            return Ok(reference);
        }
        let children: Vec<ResourceKey> = match self.resources.get(key) {
            Some(Resource::Pattern(pattern)) => pattern
                .sub_resources()
                .map(|list| list.keys().cloned().collect())
                .unwrap_or_default(),
            Some(_) => Vec::new(),
            None => return Err(ResourceError::UnknownResource(key.to_string())),
        };
        for child in &children {
            self.render_key(child)?;
        }

        let Self {
            options,
            registry,
            writer,
            resources,
            ..
        } = self;
        let resource = resources
            .get(key)
            .ok_or_else(|| ResourceError::UnknownResource(key.to_string()))?;
        registry.ensure_rendered(key, writer, |registry, writer, name| match resource {
            Resource::Font(font) => Ok(render_font(
                writer,
                name,
                &font.definition,
                &font.widths,
                options,
            )),
            Resource::Image(image) => Ok(render_image(writer, image, options)),
            Resource::Pattern(pattern) => {
                let list = match pattern.sub_resources() {
                    Some(builder) => Some(builder.finish(registry)?),
                    None => None,
                };
                Ok(pattern.render(writer, list.as_ref(), options))
            }
        })
    }
}

fn encode_single_byte(text: &str, encoding: Option<ByteEncoding>) -> Vec<u8> {
    text.chars()
        .map(|ch| match encoding {
            Some(encoding) => encoding.encode(ch).unwrap_or(b'?'),
            // Built-in encodings (Symbol, ZapfDingbats) take the code as given.
            None => u8::try_from(ch as u32).unwrap_or(b'?'),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::tests::MemorySink;
    use crate::font::FontStrategy;
    use crate::font_program::test_support::StubProgram;
    use crate::gradient::GradientStop;
    use crate::pattern::PatternLength;
    use crate::types::Color;
    use crate::writer::count_token;

    fn stub_document(options: RenderOptions) -> ResourceDocument {
        ResourceDocument::builder()
            .options(options)
            .register_font_program("stub", Arc::new(StubProgram::unicode("Stub Sans")))
            .container_height(200.0)
            .build()
            .expect("document")
    }

    fn plain_options() -> RenderOptions {
        RenderOptions {
            compress_streams: false,
            ..RenderOptions::default()
        }
    }

    fn red_to_blue() -> GradientDescriptor {
        GradientDescriptor::linear(
            90.0,
            vec![
                GradientStop::auto(Color::rgb(1.0, 0.0, 0.0)),
                GradientStop::auto(Color::rgb(0.0, 0.0, 1.0)),
            ],
        )
    }

    /// Writes a one-page catalog around `resources` so the file can be parsed.
    fn finish_with_page(mut doc: ResourceDocument, resources: &ResourceListBuilder) -> Vec<u8> {
        doc.render_all().expect("render");
        let list = doc.resource_list(resources).expect("resource list");
        let w = doc.writer_mut();
        let content = w.write_stream_object(b"BT ET", false, StreamLength::Direct, |_| {});
        let pages = w.begin_object();
        let page = w.begin_object();
        w.begin_dictionary();
        w.entry_name("Type", "Page");
        w.entry_ref("Parent", pages);
        w.entry_ints("MediaBox", &[0, 0, 300, 200]);
        w.begin_entry("Resources");
        list.write(w);
        w.entry_ref("Contents", content);
        w.end_dictionary();
        w.end_object();
        w.begin_dictionary();
        w.entry_name("Type", "Pages");
        w.begin_entry("Kids");
        w.begin_array();
        w.write_ref(page);
        w.end_array();
        w.entry_int("Count", 1);
        w.end_dictionary();
        w.end_object();
        let catalog = w.begin_object();
        w.begin_dictionary();
        w.entry_name("Type", "Catalog");
        w.entry_ref("Pages", pages);
        w.end_dictionary();
        w.end_object();
        doc.finish(Some(catalog))
    }

    #[test]
    fn font_requests_share_one_resource() {
        let mut doc = stub_document(plain_options());
        let a = doc.get_or_create_font_resource("Stub Sans", 400, false).expect("font");
        let b = doc.get_or_create_font_resource("stub sans", 700, false).expect("font");
        assert_eq!(a, b);
        assert_eq!(a.kind(), ResourceKind::Font);
        let helvetica = doc.get_or_create_font_resource("Helvetica", 700, false).expect("font");
        assert_ne!(a, helvetica);
        assert_eq!(helvetica.key().key(), "Helvetica-Bold");
        assert!(matches!(
            doc.get_or_create_font_resource("Nope", 400, false),
            Err(ResourceError::UnknownFont { .. })
        ));
    }

    #[test]
    fn render_is_idempotent_and_registration_names_are_stable() {
        let mut doc = stub_document(plain_options());
        let font = doc.get_or_create_font_resource("Helvetica", 400, false).expect("font");
        let mut page_one = ResourceListBuilder::new();
        let mut page_two = ResourceListBuilder::new();
        assert_eq!(doc.register_use(&font, &mut page_one), "F1");
        assert_eq!(doc.register_use(&font, &mut page_two), "F1");
        let first = doc.render(&font).expect("render");
        let objects = doc.writer_mut().object_count();
        let second = doc.render(&font).expect("render");
        assert_eq!(first, second);
        assert_eq!(doc.writer_mut().object_count(), objects);
        let bytes = doc.finish(None);
        assert_eq!(count_token(&bytes, b"/BaseFont /Helvetica"), 1);
    }

    #[test]
    fn measuring_and_registering_feed_the_tounicode_map() {
        let mut doc = stub_document(plain_options());
        let font = doc.get_or_create_font_resource("Stub Sans", 400, false).expect("font");
        assert_eq!(
            doc.font_definition(&font).expect("definition").strategy(),
            FontStrategy::Composite
        );
        let measured = doc
            .measure_text(&font, "Hi", Pt::from_i32(10), Pt::from_i32(1000), &MeasureOptions::default())
            .expect("measure");
        assert_eq!(measured.chars_fitted, 2);
        assert_eq!(doc.register_glyphs(&font, "\u{e9}").expect("glyphs"), "\u{e9}");
        assert_eq!(doc.encode_text(&font, "H").expect("encode").len(), 2);

        let mut resources = ResourceListBuilder::new();
        doc.register_use(&font, &mut resources);
        let bytes = finish_with_page(doc, &resources);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Subtype /Type0"));
        assert!(text.contains("beginbfrange"));
        let parsed = lopdf::Document::load_mem(&bytes).expect("parse");
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn ansi_documents_replace_unencodable_glyphs() {
        let sink = MemorySink::default();
        let mut doc = stub_document(RenderOptions {
            unicode_support: false,
            ..plain_options()
        });
        doc.debug = Some(DebugLogger::from_writer(sink.clone()));
        let font = doc.get_or_create_font_resource("Stub Sans", 400, false).expect("font");
        assert_eq!(
            doc.font_definition(&font).expect("definition").strategy(),
            FontStrategy::Ansi
        );
        let shown = doc.register_glyphs(&font, "a\u{1F600}").expect("glyphs");
        assert_eq!(shown, "a?");
        assert_eq!(doc.encode_text(&font, "a\u{20AC}").expect("encode"), vec![b'a', 0x80]);
        doc.finish(None);
        let log = sink.contents();
        assert!(log.contains("\"type\":\"glyph.replaced\""));
        assert!(log.contains("\"glyph.replaced\":1"));
    }

    #[test]
    fn standard_fonts_encode_with_winansi() {
        let mut doc = stub_document(plain_options());
        let font = doc.get_or_create_font_resource("Times", 400, true).expect("font");
        assert_eq!(doc.encode_text(&font, "\u{e9}!").expect("encode"), vec![0xE9, b'!']);
        let zapf = doc.get_or_create_font_resource("ZapfDingbats", 400, false).expect("font");
        assert_eq!(doc.encode_text(&zapf, "4").expect("encode"), vec![b'4']);
    }

    #[test]
    fn gradient_patterns_are_keyed_by_shape_and_container() {
        let mut doc = stub_document(plain_options());
        let gradient = red_to_blue();
        let a = doc.get_or_create_gradient_pattern(&gradient, Rect::new(0.0, 0.0, 50.0, 50.0));
        let b = doc.get_or_create_gradient_pattern(&gradient, Rect::new(0.0, 0.0, 50.0, 50.0));
        let c = doc.get_or_create_gradient_pattern(&gradient, Rect::new(10.0, 0.0, 50.0, 50.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        doc.set_container_height(300.0).expect("height");
        let d = doc.get_or_create_gradient_pattern(&gradient, Rect::new(0.0, 0.0, 50.0, 50.0));
        assert_ne!(a, d);
        assert!(doc.set_container_height(0.0).is_err());

        let mut list = ResourceListBuilder::new();
        assert_eq!(doc.register_use(&a, &mut list), "P1");
        assert_eq!(doc.register_use(&c, &mut list), "P2");
        let bytes = finish_with_page(doc, &list);
        assert_eq!(count_token(&bytes, b"/PatternType 2"), 3);
        assert!(String::from_utf8_lossy(&bytes).contains("/Coords [0 200 0 150]"));
    }

    #[test]
    fn tiling_patterns_render_their_resources_first() {
        let mut doc = stub_document(plain_options());
        let font = doc.get_or_create_font_resource("Courier", 400, false).expect("font");
        let mut tile = TilingPatternDescriptor::new(
            PatternLength::Percent(10.0),
            PatternLength::Percent(10.0),
            b"BT /F1 8 Tf (x) Tj ET".to_vec(),
        )
        .with_view_box(Rect::new(0.0, 0.0, 10.0, 10.0));
        doc.register_use(&font, &mut tile.resources);
        let pattern = doc.get_or_create_tiling_pattern(&tile, Rect::new(0.0, 0.0, 80.0, 90.0));

        let reference = doc.render(&pattern).expect("render");
        let font_ref = doc.render(&font).expect("font");
        assert!(font_ref.number() < reference.number());
        let bytes = doc.finish(None);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains(&format!("/Resources << /Font << /F1 {} >>", font_ref)));
        assert!(text.contains("/XStep 10 /YStep 11.25"));
    }

    #[test]
    fn unknown_handles_are_errors() {
        let mut doc = stub_document(plain_options());
        let pattern = doc.get_or_create_gradient_pattern(&red_to_blue(), Rect::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(
            doc.measure_text(&pattern, "x", Pt::from_i32(10), Pt::from_i32(10), &MeasureOptions::default()),
            Err(ResourceError::UnknownResource(_))
        ));
        let stray = ResourceHandle {
            key: ResourceKey::new(ResourceKind::XObject, "missing.png"),
        };
        assert!(matches!(doc.render(&stray), Err(ResourceError::UnknownResource(_))));
        let list = {
            let mut list = ResourceListBuilder::new();
            doc.register_use(&pattern, &mut list);
            list
        };
        assert!(matches!(
            doc.resource_list(&list),
            Err(ResourceError::UnrenderedResource(_))
        ));
    }

    #[test]
    fn images_are_loaded_once_per_source() {
        let mut doc = stub_document(plain_options());
        let png = {
            let img = ::image::RgbaImage::from_pixel(3, 2, ::image::Rgba([0, 255, 0, 255]));
            let mut out = std::io::Cursor::new(Vec::new());
            img.write_to(&mut out, ::image::ImageFormat::Png).expect("png");
            out.into_inner()
        };
        use base64::Engine;
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let a = doc.get_or_create_image(&uri).expect("image");
        let b = doc.get_or_create_image(&uri).expect("image");
        assert_eq!(a, b);
        assert_eq!(doc.image_size(&a), Some((3, 2)));
        let mut list = ResourceListBuilder::new();
        assert_eq!(doc.register_use(&a, &mut list), "Im1");
        let bytes = finish_with_page(doc, &list);
        let parsed = lopdf::Document::load_mem(&bytes).expect("parse");
        assert_eq!(parsed.get_pages().len(), 1);
        assert_eq!(count_token(&bytes, b"/Subtype /Image"), 1);
    }

    #[test]
    fn builder_rejects_inconsistent_configuration() {
        assert!(matches!(
            ResourceDocument::builder().container_height(f32::NAN).build(),
            Err(ResourceError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            ResourceDocument::builder().font_substitution("", "Helvetica").build(),
            Err(ResourceError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            ResourceDocument::builder()
                .register_font_file("/no/such/font.ttf")
                .build(),
            Err(ResourceError::Font { .. })
        ));
    }

    #[test]
    fn substitutions_route_requests() {
        let mut doc = ResourceDocument::builder()
            .register_font_program("stub", Arc::new(StubProgram::unicode("Stub Sans")))
            .font_substitution("Body Text", "Stub Sans")
            .build()
            .expect("document");
        let font = doc.get_or_create_font_resource("Body Text", 400, false).expect("font");
        assert_eq!(font.key().key(), "StubSans");
    }
}
