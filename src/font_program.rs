//! Read-only view over a parsed TrueType/OpenType program.
//!
//! Everything the font engine needs is pulled out of the face once, at load
//! time, so a [`TtfFontProgram`] owns plain data and can be shared across
//! threads behind an `Arc`.

use crate::error::ResourceError;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use ttf_parser::GlyphId;
use ttf_parser::name::PlatformId;

/// The character maps the font engine knows how to use, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterMap {
    WindowsUnicode,
    UnicodeDefault,
    Unicode20,
    MacRoman,
}

impl CharacterMap {
    pub const PREFERENCE: [CharacterMap; 4] = [
        CharacterMap::WindowsUnicode,
        CharacterMap::UnicodeDefault,
        CharacterMap::Unicode20,
        CharacterMap::MacRoman,
    ];

    /// `(platform id, encoding id)` as stored in the cmap table.
    pub fn platform_encoding(self) -> (u16, u16) {
        match self {
            CharacterMap::WindowsUnicode => (3, 1),
            CharacterMap::UnicodeDefault => (0, 0),
            CharacterMap::Unicode20 => (0, 3),
            CharacterMap::MacRoman => (1, 0),
        }
    }

    pub fn is_unicode(self) -> bool {
        !matches!(self, CharacterMap::MacRoman)
    }

    fn from_subtable(platform: PlatformId, encoding: u16) -> Option<Self> {
        match (platform, encoding) {
            (PlatformId::Windows, 1) => Some(CharacterMap::WindowsUnicode),
            (PlatformId::Unicode, 0) => Some(CharacterMap::UnicodeDefault),
            (PlatformId::Unicode, 3) => Some(CharacterMap::Unicode20),
            (PlatformId::Macintosh, 0) => Some(CharacterMap::MacRoman),
            _ => None,
        }
    }
}

pub trait FontProgram: fmt::Debug + Send + Sync {
    fn family_name(&self) -> &str;
    fn postscript_name(&self) -> &str;
    fn weight(&self) -> u16;
    fn is_italic(&self) -> bool;
    fn is_monospaced(&self) -> bool;
    fn units_per_em(&self) -> u16;
    fn ascender(&self) -> i16;
    fn descender(&self) -> i16;
    fn line_gap(&self) -> i16;
    fn cap_height(&self) -> Option<i16>;
    fn x_height(&self) -> Option<i16>;
    fn avg_char_width(&self) -> i16;
    fn italic_angle(&self) -> f32;
    /// `[x_min, y_min, x_max, y_max]` in font units.
    fn bounding_box(&self) -> [i16; 4];
    /// Number of glyphs with horizontal metrics.
    fn glyph_count(&self) -> u16;
    fn advance_width(&self, glyph: u16) -> Option<u16>;
    fn character_maps(&self) -> Vec<CharacterMap>;
    fn glyph_for_character(&self, map: CharacterMap, code: u32) -> Option<u16>;
    /// OS/2 `fsType`, `None` when the program has no OS/2 table.
    fn restriction_flags(&self) -> Option<u16>;
    fn raw_bytes(&self) -> &[u8];
}

pub struct TtfFontProgram {
    data: Vec<u8>,
    family: String,
    postscript: String,
    weight: u16,
    italic: bool,
    monospaced: bool,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    line_gap: i16,
    cap_height: Option<i16>,
    x_height: Option<i16>,
    avg_char_width: i16,
    italic_angle: f32,
    bbox: [i16; 4],
    advances: Vec<u16>,
    maps: Vec<(CharacterMap, HashMap<u32, u16>)>,
    fs_type: Option<u16>,
}

const OS2_TAG: ttf_parser::Tag = ttf_parser::Tag::from_bytes(b"OS/2");

impl TtfFontProgram {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let family = file_stem(path);
        let data = fs::read(path)
            .map_err(|err| ResourceError::font(&family, &source, format!("unreadable: {err}")))?;
        Self::from_bytes(data, &source)
    }

    pub fn from_bytes(data: Vec<u8>, source: &str) -> Result<Self, ResourceError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            ResourceError::font(
                file_stem(Path::new(source)),
                source,
                format!("invalid font data: {err}"),
            )
        })?;

        let (family, postscript) = font_names(&face, Path::new(source));
        let bbox = face.global_bounding_box();
        let glyph_count = face.number_of_glyphs();
        let advances = (0..glyph_count)
            .map(|gid| face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0))
            .collect();
        let maps = collect_character_maps(&face);

        let os2 = face.raw_face().table(OS2_TAG);
        let avg_char_width = os2.and_then(|t| read_i16(t, 2)).unwrap_or(0);
        let fs_type = os2.and_then(|t| read_u16(t, 8));

        Ok(Self {
            family,
            postscript,
            weight: face.weight().to_number(),
            italic: face.is_italic(),
            monospaced: face.is_monospaced(),
            units_per_em: face.units_per_em().max(1),
            ascender: face.ascender(),
            descender: face.descender(),
            line_gap: face.line_gap(),
            cap_height: face.capital_height(),
            x_height: face.x_height(),
            avg_char_width,
            italic_angle: face.italic_angle().unwrap_or(0.0),
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            advances,
            maps,
            fs_type,
            data,
        })
    }
}

impl fmt::Debug for TtfFontProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtfFontProgram")
            .field("family", &self.family)
            .field("postscript", &self.postscript)
            .field("weight", &self.weight)
            .field("italic", &self.italic)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl FontProgram for TtfFontProgram {
    fn family_name(&self) -> &str {
        &self.family
    }

    fn postscript_name(&self) -> &str {
        &self.postscript
    }

    fn weight(&self) -> u16 {
        self.weight
    }

    fn is_italic(&self) -> bool {
        self.italic
    }

    fn is_monospaced(&self) -> bool {
        self.monospaced
    }

    fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    fn ascender(&self) -> i16 {
        self.ascender
    }

    fn descender(&self) -> i16 {
        self.descender
    }

    fn line_gap(&self) -> i16 {
        self.line_gap
    }

    fn cap_height(&self) -> Option<i16> {
        self.cap_height
    }

    fn x_height(&self) -> Option<i16> {
        self.x_height
    }

    fn avg_char_width(&self) -> i16 {
        self.avg_char_width
    }

    fn italic_angle(&self) -> f32 {
        self.italic_angle
    }

    fn bounding_box(&self) -> [i16; 4] {
        self.bbox
    }

    fn glyph_count(&self) -> u16 {
        self.advances.len() as u16
    }

    fn advance_width(&self, glyph: u16) -> Option<u16> {
        self.advances.get(glyph as usize).copied()
    }

    fn character_maps(&self) -> Vec<CharacterMap> {
        self.maps.iter().map(|(map, _)| *map).collect()
    }

    fn glyph_for_character(&self, map: CharacterMap, code: u32) -> Option<u16> {
        self.maps
            .iter()
            .find(|(candidate, _)| *candidate == map)
            .and_then(|(_, table)| table.get(&code).copied())
            .filter(|gid| *gid != 0)
    }

    fn restriction_flags(&self) -> Option<u16> {
        self.fs_type
    }

    fn raw_bytes(&self) -> &[u8] {
        &self.data
    }
}

fn collect_character_maps(face: &ttf_parser::Face<'_>) -> Vec<(CharacterMap, HashMap<u32, u16>)> {
    let mut maps: Vec<(CharacterMap, HashMap<u32, u16>)> = Vec::new();
    let Some(cmap) = face.tables().cmap else {
        return maps;
    };
    for subtable in cmap.subtables {
        let Some(map) = CharacterMap::from_subtable(subtable.platform_id, subtable.encoding_id)
        else {
            continue;
        };
        if maps.iter().any(|(existing, _)| *existing == map) {
            continue;
        }
        let mut table = HashMap::new();
        subtable.codepoints(|code| {
            if let Some(gid) = subtable.glyph_index(code) {
                table.insert(code, gid.0);
            }
        });
        maps.push((map, table));
    }
    maps
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_i16(data: &[u8], offset: usize) -> Option<i16> {
    read_u16(data, offset).map(|value| value as i16)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "EmbeddedFont".to_string())
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, String) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut typographic = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        let slot = match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY => &mut typographic,
            name_id::FAMILY => &mut family,
            name_id::FULL_NAME => &mut full,
            name_id::POST_SCRIPT_NAME => &mut post,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(name);
        }
    }

    let stem = file_stem(path);
    let family = typographic
        .or(family)
        .or_else(|| full.clone())
        .unwrap_or_else(|| stem.clone());
    let postscript = post
        .or(full)
        .map(|name| name.replace(' ', ""))
        .unwrap_or_else(|| family.replace(' ', ""));
    (family, postscript)
}
