//! Font definitions: encoding and strategy decisions, descriptor metrics,
//! the standard-14 table, catalog matching and text measurement.

use crate::error::ResourceError;
use crate::font_program::{CharacterMap, FontProgram, TtfFontProgram};
use crate::types::Pt;
use crate::widths::{
    ArrayWidths, ByteEncoding, CompositeWidths, FontWidths, GlyphWidths, scale_width,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontEncoding {
    Unicode,
    WinAnsi,
    MacRoman,
    /// Symbol and ZapfDingbats carry their own encoding.
    BuiltIn,
}

impl FontEncoding {
    pub fn pdf_name(self) -> Option<&'static str> {
        self.byte_encoding().map(ByteEncoding::pdf_name)
    }

    pub fn byte_encoding(self) -> Option<ByteEncoding> {
        match self {
            FontEncoding::WinAnsi => Some(ByteEncoding::WinAnsi),
            FontEncoding::MacRoman => Some(ByteEncoding::MacRoman),
            FontEncoding::Unicode | FontEncoding::BuiltIn => None,
        }
    }
}

/// How a definition is emitted. Decided once, when the definition is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontStrategy {
    Standard,
    Ansi,
    Composite,
}

/// First character map of the preference order that the program carries.
pub fn select_character_map(program: &dyn FontProgram) -> Option<CharacterMap> {
    let available = program.character_maps();
    CharacterMap::PREFERENCE
        .into_iter()
        .find(|map| available.contains(map))
}

const FS_TYPE_INSTALLABLE: u16 = 0x0000;
const FS_TYPE_RESTRICTED: u16 = 0x0002;
const FS_TYPE_PREVIEW_PRINT: u16 = 0x0004;
const FS_TYPE_EDITABLE: u16 = 0x0008;

/// Reads the OS/2 `fsType` embedding bits. A missing table counts as installable.
pub fn is_embeddable(fs_type: Option<u16>) -> bool {
    let Some(flags) = fs_type else {
        return true;
    };
    if flags == FS_TYPE_INSTALLABLE {
        return true;
    }
    if flags & FS_TYPE_RESTRICTED != 0 {
        return false;
    }
    flags & (FS_TYPE_PREVIEW_PRINT | FS_TYPE_EDITABLE) != 0
}

const FLAG_FIXED_PITCH: i64 = 1;
const FLAG_NON_SYMBOLIC: i64 = 32;

/// FontDescriptor values in 1000-unit glyph space.
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    pub flags: i64,
    pub bbox: [i64; 4],
    pub italic_angle: f32,
    pub ascent: i64,
    pub descent: i64,
    pub leading: i64,
    pub cap_height: i64,
    pub x_height: i64,
    pub avg_width: i64,
    pub max_width: i64,
    pub stem_v: i64,
}

impl FontDescriptor {
    pub fn from_program(program: &dyn FontProgram) -> Self {
        let units = program.units_per_em();
        let scale = |value: i16| -> i64 {
            (value as f64 * 1000.0 / units.max(1) as f64).round() as i64
        };
        let [x_min, y_min, x_max, y_max] = program.bounding_box();
        let ascent = scale(program.ascender());
        let descent = scale(program.descender());
        let cap_height = program.cap_height().map(scale).unwrap_or(ascent);
        let x_height = program.x_height().map(scale).unwrap_or(cap_height);
        let mut flags = FLAG_NON_SYMBOLIC;
        if program.is_monospaced() {
            flags |= FLAG_FIXED_PITCH;
        }
        Self {
            flags,
            bbox: [scale(x_min), scale(y_min), scale(x_max), scale(y_max)],
            italic_angle: program.italic_angle(),
            ascent,
            descent,
            leading: ascent - descent + scale(program.line_gap()),
            cap_height,
            x_height,
            avg_width: scale(program.avg_char_width()),
            max_width: scale(x_max),
            stem_v: 80,
        }
    }
}

/// Vertical metrics for a font size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub ascent: Pt,
    /// Positive distance below the baseline.
    pub descent: Pt,
    pub line_height: Pt,
    pub x_height: Pt,
}

/// One of the 14 base Type1 fonts.
#[derive(Debug)]
pub struct StandardFont {
    pub base_name: &'static str,
    pub family: &'static str,
    pub bold: bool,
    pub italic: bool,
    /// Space advance in 2048-unit font space.
    pub space_width_fu: u16,
    ascii_widths: Option<&'static [u16; 95]>,
    default_width: u16,
    pub builtin_encoding: bool,
}

const STANDARD_UNITS_PER_EM: u16 = 2048;

impl StandardFont {
    /// Advance of `ch` in 1000-unit space.
    pub fn width_of(&self, ch: char) -> i64 {
        if ch == ' ' {
            return scale_width(self.space_width_fu, STANDARD_UNITS_PER_EM);
        }
        let code = ch as u32;
        match self.ascii_widths {
            Some(table) if (0x20..=0x7E).contains(&code) => table[(code - 0x20) as usize] as i64,
            _ => self.default_width as i64,
        }
    }
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const TIMES_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

const COURIER_WIDTHS: [u16; 95] = [600; 95];

macro_rules! standard_font {
    ($base:expr, $family:expr, $bold:expr, $italic:expr, $space:expr, $widths:expr, $default:expr, $builtin:expr) => {
        StandardFont {
            base_name: $base,
            family: $family,
            bold: $bold,
            italic: $italic,
            space_width_fu: $space,
            ascii_widths: $widths,
            default_width: $default,
            builtin_encoding: $builtin,
        }
    };
}

pub static STANDARD_FONTS: [StandardFont; 14] = [
    standard_font!("Helvetica", "Helvetica", false, false, 569, Some(&HELVETICA_WIDTHS), 556, false),
    standard_font!("Helvetica-Bold", "Helvetica", true, false, 569, Some(&HELVETICA_WIDTHS), 556, false),
    standard_font!("Helvetica-Oblique", "Helvetica", false, true, 569, Some(&HELVETICA_WIDTHS), 556, false),
    standard_font!("Helvetica-BoldOblique", "Helvetica", true, true, 569, Some(&HELVETICA_WIDTHS), 556, false),
    standard_font!("Times-Roman", "Times", false, false, 512, Some(&TIMES_WIDTHS), 500, false),
    standard_font!("Times-Bold", "Times", true, false, 512, Some(&TIMES_WIDTHS), 500, false),
    standard_font!("Times-Italic", "Times", false, true, 512, Some(&TIMES_WIDTHS), 500, false),
    standard_font!("Times-BoldItalic", "Times", true, true, 512, Some(&TIMES_WIDTHS), 500, false),
    standard_font!("Courier", "Courier", false, false, 1228, Some(&COURIER_WIDTHS), 600, false),
    standard_font!("Courier-Bold", "Courier", true, false, 1228, Some(&COURIER_WIDTHS), 600, false),
    standard_font!("Courier-Oblique", "Courier", false, true, 1228, Some(&COURIER_WIDTHS), 600, false),
    standard_font!("Courier-BoldOblique", "Courier", true, true, 1228, Some(&COURIER_WIDTHS), 600, false),
    standard_font!("Symbol", "Symbol", false, false, 512, None, 600, true),
    standard_font!("ZapfDingbats", "ZapfDingbats", false, false, 544, None, 788, true),
];

fn standard_family_for(family: &str) -> Option<&'static str> {
    let family = match family {
        "helvetica" | "sans-serif" | "arial" => "Helvetica",
        "times" | "times-roman" | "serif" | "times new roman" => "Times",
        "courier" | "monospace" | "courier new" => "Courier",
        "symbol" => "Symbol",
        "zapfdingbats" | "zapf dingbats" => "ZapfDingbats",
        _ => return None,
    };
    Some(family)
}

fn standard_definitions() -> &'static [Arc<FontDefinition>] {
    static DEFINITIONS: OnceLock<Vec<Arc<FontDefinition>>> = OnceLock::new();
    DEFINITIONS.get_or_init(|| {
        STANDARD_FONTS
            .iter()
            .map(|font| Arc::new(FontDefinition::standard(font)))
            .collect()
    })
}

/// The shared standard definition for a family (or base name) request.
pub fn standard_font(family: &str, weight: u16, italic: bool) -> Option<Arc<FontDefinition>> {
    let key = normalize_family(family);
    let definitions = standard_definitions();
    let Some(family) = standard_family_for(&key) else {
        return definitions
            .iter()
            .find(|def| def.name.eq_ignore_ascii_case(&key))
            .cloned();
    };
    let bold = weight >= 600;
    definitions
        .iter()
        .filter(|def| def.family == family)
        .find(|def| {
            let Some(standard) = def.standard else {
                return false;
            };
            // Symbol and ZapfDingbats have a single face.
            standard.builtin_encoding || (standard.bold == bold && standard.italic == italic)
        })
        .cloned()
}

/// A resolved font: identity plus the encoding and emission decisions.
#[derive(Debug)]
pub struct FontDefinition {
    name: String,
    family: String,
    weight: u16,
    italic: bool,
    units_per_em: u16,
    space_width: i64,
    strategy: FontStrategy,
    encoding: FontEncoding,
    character_map: Option<CharacterMap>,
    embeddable: bool,
    descriptor: Option<FontDescriptor>,
    program: Option<Arc<dyn FontProgram>>,
    standard: Option<&'static StandardFont>,
    source: String,
}

impl FontDefinition {
    fn standard(font: &'static StandardFont) -> Self {
        Self {
            name: font.base_name.to_string(),
            family: font.family.to_string(),
            weight: if font.bold { 700 } else { 400 },
            italic: font.italic,
            units_per_em: STANDARD_UNITS_PER_EM,
            space_width: scale_width(font.space_width_fu, STANDARD_UNITS_PER_EM),
            strategy: FontStrategy::Standard,
            encoding: if font.builtin_encoding {
                FontEncoding::BuiltIn
            } else {
                FontEncoding::WinAnsi
            },
            character_map: None,
            embeddable: false,
            descriptor: None,
            program: None,
            standard: Some(font),
            source: "standard".to_string(),
        }
    }

    /// Builds a definition around a parsed program.
    ///
    /// Fails when the program carries none of the supported character maps.
    pub fn from_program(
        program: Arc<dyn FontProgram>,
        unicode_support: bool,
        source: &str,
    ) -> Result<Self, ResourceError> {
        let family = program.family_name().to_string();
        let map = select_character_map(program.as_ref()).ok_or_else(|| {
            ResourceError::font(
                &family,
                source,
                "no usable character map (tried 3/1, 0/0, 0/3, 1/0)",
            )
        })?;
        let (strategy, encoding) = if map.is_unicode() && unicode_support {
            (FontStrategy::Composite, FontEncoding::Unicode)
        } else if map == CharacterMap::MacRoman {
            (FontStrategy::Ansi, FontEncoding::MacRoman)
        } else {
            (FontStrategy::Ansi, FontEncoding::WinAnsi)
        };
        let units_per_em = program.units_per_em();
        let space_width = program
            .glyph_for_character(map, ' ' as u32)
            .and_then(|glyph| program.advance_width(glyph))
            .map(|advance| scale_width(advance, units_per_em))
            .unwrap_or(0);
        let name = match program.postscript_name() {
            "" => family.replace(' ', ""),
            postscript => postscript.to_string(),
        };
        Ok(Self {
            name,
            family,
            weight: program.weight(),
            italic: program.is_italic(),
            units_per_em,
            space_width,
            strategy,
            encoding,
            character_map: Some(map),
            embeddable: is_embeddable(program.restriction_flags()),
            descriptor: Some(FontDescriptor::from_program(program.as_ref())),
            program: Some(program),
            standard: None,
            source: source.to_string(),
        })
    }

    /// Full name; also the font's resource key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn weight(&self) -> u16 {
        self.weight
    }

    pub fn is_italic(&self) -> bool {
        self.italic
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    /// Space advance in 1000-unit space.
    pub fn space_width(&self) -> i64 {
        self.space_width
    }

    pub fn strategy(&self) -> FontStrategy {
        self.strategy
    }

    pub fn is_standard(&self) -> bool {
        self.strategy == FontStrategy::Standard
    }

    pub fn is_unicode(&self) -> bool {
        self.strategy == FontStrategy::Composite
    }

    pub fn encoding(&self) -> FontEncoding {
        self.encoding
    }

    pub fn character_map(&self) -> Option<CharacterMap> {
        self.character_map
    }

    pub fn is_embeddable(&self) -> bool {
        self.embeddable
    }

    pub fn descriptor(&self) -> Option<&FontDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn program(&self) -> Option<&Arc<dyn FontProgram>> {
        self.program.as_ref()
    }

    pub fn standard_font(&self) -> Option<&'static StandardFont> {
        self.standard
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A fresh width table for one document.
    pub fn new_widths(&self) -> FontWidths {
        match (self.strategy, &self.program, self.character_map) {
            (FontStrategy::Composite, Some(program), Some(map)) => {
                FontWidths::Composite(CompositeWidths::new(program.clone(), map))
            }
            (FontStrategy::Ansi, Some(program), Some(map)) => {
                let encoding = self.encoding.byte_encoding().unwrap_or(ByteEncoding::WinAnsi);
                FontWidths::Array(ArrayWidths::from_program(program.as_ref(), map, encoding))
            }
            _ => FontWidths::Empty,
        }
    }

    /// Advance of `ch` in 1000-unit space. Unencodable characters measure as `?`.
    pub fn char_width(&self, widths: &FontWidths, ch: char) -> i64 {
        if let Some(standard) = self.standard {
            return standard.width_of(ch);
        }
        widths
            .width_of(ch)
            .or_else(|| widths.width_of('?'))
            .unwrap_or(self.space_width)
    }

    pub fn line_metrics(&self, font_size: Pt) -> LineMetrics {
        match &self.descriptor {
            Some(descriptor) => {
                let ratio = |value: i64| font_size.mul_ratio(value.clamp(-10_000, 10_000) as i32, 1000);
                LineMetrics {
                    ascent: ratio(descriptor.ascent),
                    descent: ratio(-descriptor.descent),
                    line_height: ratio(descriptor.leading),
                    x_height: ratio(descriptor.x_height),
                }
            }
            None => LineMetrics {
                ascent: font_size.mul_ratio(3, 4),
                descent: font_size.mul_ratio(1, 4),
                line_height: font_size.mul_ratio(6, 5),
                x_height: font_size.mul_ratio(1, 2),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Word,
    Character,
    NoWrap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureOptions {
    pub word_spacing: Pt,
    pub char_spacing: Pt,
    pub h_scale: f32,
    pub wrap: WrapMode,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            word_spacing: Pt::ZERO,
            char_spacing: Pt::ZERO,
            h_scale: 1.0,
            wrap: WrapMode::Word,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMeasure {
    pub consumed: Pt,
    pub chars_fitted: usize,
}

/// Fits `text` into `available`. Fitted characters are registered with
/// `widths`, so composite fonts record the glyphs that were measured.
pub fn measure_text(
    definition: &FontDefinition,
    widths: &mut FontWidths,
    text: &str,
    font_size: Pt,
    available: Pt,
    options: &MeasureOptions,
) -> TextMeasure {
    let chars: Vec<char> = text.chars().collect();
    let mut advances: Vec<Pt> = Vec::with_capacity(chars.len());
    let mut total = Pt::ZERO;
    let mut stop = chars.len();
    for (index, ch) in chars.iter().enumerate() {
        let units = definition.char_width(widths, *ch);
        let mut advance = font_size.mul_ratio(units.clamp(0, i32::MAX as i64) as i32, 1000)
            + options.char_spacing;
        if *ch == ' ' {
            advance += options.word_spacing;
        }
        let advance = advance * options.h_scale;
        if options.wrap != WrapMode::NoWrap && total + advance > available {
            stop = index;
            break;
        }
        total += advance;
        advances.push(advance);
    }

    let fitted = if stop == chars.len() || options.wrap != WrapMode::Word {
        stop
    } else if chars[stop].is_whitespace() {
        stop
    } else {
        chars[..stop]
            .iter()
            .rposition(|ch| ch.is_whitespace())
            .map(|index| index + 1)
            .unwrap_or(0)
    };

    for ch in &chars[..fitted] {
        widths.register_glyph(*ch);
    }
    TextMeasure {
        consumed: advances[..fitted].iter().copied().sum(),
        chars_fitted: fitted,
    }
}

pub(crate) fn normalize_family(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_ascii_lowercase()
}

/// Program-backed definitions and substitutions, with request matching.
#[derive(Debug, Default)]
pub struct FontCatalog {
    definitions: Vec<Arc<FontDefinition>>,
    substitutions: HashMap<String, String>,
    unicode_support: bool,
}

impl FontCatalog {
    pub fn new(unicode_support: bool) -> Self {
        Self {
            unicode_support,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn add_program(
        &mut self,
        program: Arc<dyn FontProgram>,
        source: &str,
    ) -> Result<Arc<FontDefinition>, ResourceError> {
        let definition = Arc::new(FontDefinition::from_program(
            program,
            self.unicode_support,
            source,
        )?);
        if let Some(existing) = self
            .definitions
            .iter()
            .find(|def| def.name.eq_ignore_ascii_case(&definition.name))
        {
            log::debug!(
                "font {} from {} already loaded from {}",
                definition.name,
                source,
                existing.source
            );
            return Ok(existing.clone());
        }
        self.definitions.push(definition.clone());
        Ok(definition)
    }

    pub fn add_bytes(
        &mut self,
        data: Vec<u8>,
        source: &str,
    ) -> Result<Arc<FontDefinition>, ResourceError> {
        let program = TtfFontProgram::from_bytes(data, source)?;
        self.add_program(Arc::new(program), source)
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<Arc<FontDefinition>, ResourceError> {
        let path = path.as_ref();
        let program = TtfFontProgram::from_file(path)?;
        self.add_program(Arc::new(program), &path.display().to_string())
    }

    /// Loads every `.ttf`/`.otf` file in `path`; other entries are skipped.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) -> Result<usize, ResourceError> {
        let path = path.as_ref();
        let mut loaded = 0;
        for entry in fs::read_dir(path)?.flatten() {
            let file = entry.path();
            let Some(ext) = file.extension().and_then(|v| v.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if !file.is_file() || (ext != "ttf" && ext != "otf") {
                continue;
            }
            match self.add_file(&file) {
                Ok(_) => loaded += 1,
                Err(err) => log::warn!("skipping font {}: {}", file.display(), err),
            }
        }
        Ok(loaded)
    }

    /// Requests for `requested` may also be satisfied by `actual`.
    pub fn add_substitution(&mut self, requested: &str, actual: &str) {
        self.substitutions
            .insert(normalize_family(requested), normalize_family(actual));
    }

    /// Matches a request: exact, substitution, nearest weight, standard.
    pub fn resolve(
        &self,
        family: &str,
        weight: u16,
        italic: bool,
    ) -> Result<Arc<FontDefinition>, ResourceError> {
        let key = normalize_family(family);
        if let Some(found) = self.exact(&key, weight, italic) {
            return Ok(found);
        }
        if let Some(target) = self.substitutions.get(&key) {
            let substituted = self
                .exact(target, weight, italic)
                .or_else(|| self.nearest(target, weight, italic))
                .or_else(|| standard_font(target, weight, italic));
            if let Some(found) = substituted {
                log::debug!("font '{}' substituted by '{}'", family, found.name);
                return Ok(found);
            }
        }
        if let Some(found) = self.nearest(&key, weight, italic) {
            log::debug!(
                "font '{}' weight {} falls back to weight {}",
                family,
                weight,
                found.weight
            );
            return Ok(found);
        }
        if let Some(found) = standard_font(&key, weight, italic) {
            return Ok(found);
        }
        Err(ResourceError::UnknownFont {
            family: family.to_string(),
            weight,
            italic,
        })
    }

    fn family_matches(definition: &FontDefinition, key: &str) -> bool {
        normalize_family(&definition.family) == key || definition.name.eq_ignore_ascii_case(key)
    }

    fn exact(&self, key: &str, weight: u16, italic: bool) -> Option<Arc<FontDefinition>> {
        self.definitions
            .iter()
            .find(|def| {
                Self::family_matches(def, key) && def.weight == weight && def.italic == italic
            })
            .cloned()
    }

    fn nearest(&self, key: &str, weight: u16, italic: bool) -> Option<Arc<FontDefinition>> {
        self.definitions
            .iter()
            .filter(|def| Self::family_matches(def, key) && def.italic == italic)
            .min_by_key(|def| (def.weight.abs_diff(weight), def.weight))
            .cloned()
    }
}
