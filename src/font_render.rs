use crate::document::RenderOptions;
use crate::font::{FontDefinition, FontDescriptor, FontStrategy};
use crate::widths::{FontWidths, GlyphWidths};
use crate::writer::{ObjRef, PdfWriter};
use sha2::{Digest, Sha256};

/// Emits the font objects for `definition` and returns the font dictionary.
///
/// Children (font file, descriptor, descendant, ToUnicode) are written
/// before the dictionary that references them.
pub(crate) fn render_font(
    writer: &mut PdfWriter,
    resource_name: &str,
    definition: &FontDefinition,
    widths: &FontWidths,
    options: &RenderOptions,
) -> ObjRef {
    match definition.strategy() {
        FontStrategy::Standard => render_standard(writer, resource_name, definition),
        FontStrategy::Ansi => render_ansi(writer, resource_name, definition, widths, options),
        FontStrategy::Composite => {
            render_composite(writer, resource_name, definition, widths, options)
        }
    }
}

fn render_standard(writer: &mut PdfWriter, resource_name: &str, definition: &FontDefinition) -> ObjRef {
    let font = writer.begin_object();
    writer.begin_dictionary();
    writer.entry_name("Type", "Font");
    writer.entry_name("Subtype", "Type1");
    writer.entry_name("Name", resource_name);
    writer.entry_name("BaseFont", definition.name());
    if let Some(encoding) = definition.encoding().pdf_name() {
        writer.entry_name("Encoding", encoding);
    }
    writer.end_dictionary();
    writer.end_object();
    font
}

fn render_ansi(
    writer: &mut PdfWriter,
    resource_name: &str,
    definition: &FontDefinition,
    widths: &FontWidths,
    options: &RenderOptions,
) -> ObjRef {
    let base_font = base_font_name(definition.name());
    let descriptor = if definition.is_embeddable() {
        Some(write_descriptor(writer, &base_font, definition, options))
    } else {
        warn_not_embeddable(definition, options);
        None
    };

    let font = writer.begin_object();
    writer.begin_dictionary();
    writer.entry_name("Type", "Font");
    writer.entry_name("Subtype", "TrueType");
    writer.entry_name("Name", resource_name);
    writer.entry_name("BaseFont", &base_font);
    widths.write_widths(writer);
    if let Some(encoding) = definition.encoding().pdf_name() {
        writer.entry_name("Encoding", encoding);
    }
    if let Some(descriptor) = descriptor {
        writer.entry_ref("FontDescriptor", descriptor);
    }
    writer.end_dictionary();
    writer.end_object();
    font
}

fn render_composite(
    writer: &mut PdfWriter,
    resource_name: &str,
    definition: &FontDefinition,
    widths: &FontWidths,
    options: &RenderOptions,
) -> ObjRef {
    let base_font = format!(
        "{}+{}",
        subset_tag(definition, resource_name),
        base_font_name(definition.name())
    );
    if !definition.is_embeddable() {
        warn_not_embeddable(definition, options);
    }
    let descriptor = write_descriptor(writer, &base_font, definition, options);

    let descendant = writer.begin_object();
    writer.begin_dictionary();
    writer.entry_name("Type", "Font");
    writer.entry_name("Subtype", "CIDFontType2");
    writer.entry_name("BaseFont", &base_font);
    writer.begin_entry("CIDSystemInfo");
    writer.begin_dictionary();
    writer.entry_string("Registry", "Adobe");
    writer.entry_string("Ordering", "Identity");
    writer.entry_int("Supplement", 0);
    writer.end_dictionary();
    writer.entry_ref("FontDescriptor", descriptor);
    writer.entry_name("CIDToGIDMap", "Identity");
    widths.write_widths(writer);
    writer.end_dictionary();
    writer.end_object();

    let to_unicode = match widths {
        FontWidths::Composite(table) if widths.has_registered_glyphs() => {
            let cmap = table.to_unicode_cmap();
            Some(writer.write_stream_object(
                cmap.as_bytes(),
                options.compress_streams,
                options.stream_length,
                |_| {},
            ))
        }
        _ => None,
    };

    let font = writer.begin_object();
    writer.begin_dictionary();
    writer.entry_name("Type", "Font");
    writer.entry_name("Subtype", "Type0");
    writer.entry_name("Name", resource_name);
    writer.entry_name("BaseFont", &base_font);
    writer.entry_name("Encoding", "Identity-H");
    writer.begin_entry("DescendantFonts");
    writer.begin_array();
    writer.write_ref(descendant);
    writer.end_array();
    if let Some(to_unicode) = to_unicode {
        writer.entry_ref("ToUnicode", to_unicode);
    }
    writer.end_dictionary();
    writer.end_object();
    font
}

fn write_descriptor(
    writer: &mut PdfWriter,
    base_font: &str,
    definition: &FontDefinition,
    options: &RenderOptions,
) -> ObjRef {
    let font_file = match definition.program() {
        Some(program) if options.embed_fonts && definition.is_embeddable() => {
            let data = program.raw_bytes();
            Some(writer.write_stream_object(
                data,
                options.compress_streams,
                options.stream_length,
                |w| w.entry_int("Length1", data.len() as i64),
            ))
        }
        _ => None,
    };

    let fallback;
    let metrics: &FontDescriptor = match definition.descriptor() {
        Some(descriptor) => descriptor,
        None => {
            fallback = standard_descriptor();
            &fallback
        }
    };

    let descriptor = writer.begin_object();
    writer.begin_dictionary();
    writer.entry_name("Type", "FontDescriptor");
    writer.entry_name("FontName", base_font);
    writer.entry_int("Flags", metrics.flags);
    writer.entry_ints("FontBBox", &metrics.bbox);
    writer.entry_real("ItalicAngle", metrics.italic_angle);
    writer.entry_int("Ascent", metrics.ascent);
    writer.entry_int("Descent", metrics.descent);
    writer.entry_int("Leading", metrics.leading);
    writer.entry_int("CapHeight", metrics.cap_height);
    writer.entry_int("XHeight", metrics.x_height);
    writer.entry_int("AvgWidth", metrics.avg_width);
    writer.entry_int("MaxWidth", metrics.max_width);
    writer.entry_int("StemV", metrics.stem_v);
    if let Some(font_file) = font_file {
        writer.entry_ref("FontFile2", font_file);
    }
    writer.end_dictionary();
    writer.end_object();
    descriptor
}

fn standard_descriptor() -> FontDescriptor {
    FontDescriptor {
        flags: 32,
        bbox: [0, -250, 1000, 750],
        italic_angle: 0.0,
        ascent: 750,
        descent: -250,
        leading: 1200,
        cap_height: 750,
        x_height: 500,
        avg_width: 500,
        max_width: 1000,
        stem_v: 80,
    }
}

fn warn_not_embeddable(definition: &FontDefinition, options: &RenderOptions) {
    if options.embed_fonts {
        log::warn!(
            "font {} ({}) does not permit embedding; writing it unembedded",
            definition.name(),
            definition.source()
        );
    }
}

/// Six uppercase letters derived from the program bytes and the resource name.
pub(crate) fn subset_tag(definition: &FontDefinition, resource_name: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(program) = definition.program() {
        hasher.update(program.raw_bytes());
    }
    hasher.update(resource_name.as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(6)
        .map(|byte| (b'A' + byte % 26) as char)
        .collect()
}

fn base_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        out
    }
}
