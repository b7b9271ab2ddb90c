//! Width tables for simple (byte-encoded) and composite (CID-keyed) fonts.
//!
//! All widths are integers in 1000-units-per-em glyph space.

use crate::font_program::{CharacterMap, FontProgram};
use crate::writer::PdfWriter;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Ranges per `beginbfrange` block; readers reject larger blocks.
const BFRANGE_BLOCK: usize = 100;

pub(crate) const DEFAULT_CID_WIDTH: i64 = 1000;

pub(crate) fn scale_width(advance: u16, units_per_em: u16) -> i64 {
    let units = units_per_em.max(1) as f64;
    (advance as f64 * 1000.0 / units).round() as i64
}

/// Operations every width strategy supports.
pub trait GlyphWidths {
    /// Records that `ch` is drawn and returns the character that will actually
    /// be shown, which is a replacement when `ch` cannot be encoded.
    fn register_glyph(&mut self, ch: char) -> char;

    /// Advance of `ch` in 1000-unit space, `None` if the strategy has no metrics.
    fn width_of(&self, ch: char) -> Option<i64>;

    /// Writes the width entries into the open font dictionary.
    fn write_widths(&self, writer: &mut PdfWriter);
}

/// Single-byte encodings used by simple fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteEncoding {
    WinAnsi,
    MacRoman,
}

impl ByteEncoding {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ByteEncoding::WinAnsi => "WinAnsiEncoding",
            ByteEncoding::MacRoman => "MacRomanEncoding",
        }
    }

    pub fn encode(self, ch: char) -> Option<u8> {
        let code = ch as u32;
        match self {
            ByteEncoding::MacRoman => {
                if code < 0x80 {
                    return Some(code as u8);
                }
                MAC_ROMAN_HIGH
                    .iter()
                    .position(|mapped| *mapped == code && code != 0)
                    .map(|index| 0x80 + index as u8)
            }
            ByteEncoding::WinAnsi => {
                if code < 0x80 || (0xA0..=0xFF).contains(&code) {
                    return Some(code as u8);
                }
                CP1252_HIGH
                    .iter()
                    .position(|mapped| *mapped == code && code != 0)
                    .map(|index| 0x80 + index as u8)
            }
        }
    }

    /// The Unicode value a byte stands for, used to query Unicode cmaps.
    pub fn decode(self, byte: u8) -> Option<u32> {
        match (self, byte) {
            (_, 0x00..=0x7F) => Some(byte as u32),
            (ByteEncoding::WinAnsi, 0x80..=0x9F) => {
                let mapped = CP1252_HIGH[(byte - 0x80) as usize];
                (mapped != 0).then_some(mapped)
            }
            (ByteEncoding::WinAnsi, _) => Some(byte as u32),
            (ByteEncoding::MacRoman, _) => {
                let mapped = MAC_ROMAN_HIGH[(byte - 0x80) as usize];
                (mapped != 0).then_some(mapped)
            }
        }
    }
}

/// Windows-1252 code points for 0x80..=0x9F; 0 marks an unassigned byte.
const CP1252_HIGH: [u32; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039,
    0x0152, 0, 0x017D, 0, 0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC,
    0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

/// Code points for 0x80..=0xFF under the PDF MacRomanEncoding; 0 marks an
/// unassigned byte.
const MAC_ROMAN_HIGH: [u32; 128] = [
    0x00C4, 0x00C5, 0x00C7, 0x00C9, 0x00D1, 0x00D6, 0x00DC, 0x00E1, 0x00E0, 0x00E2, 0x00E4,
    0x00E3, 0x00E5, 0x00E7, 0x00E9, 0x00E8, 0x00EA, 0x00EB, 0x00ED, 0x00EC, 0x00EE, 0x00EF,
    0x00F1, 0x00F3, 0x00F2, 0x00F4, 0x00F6, 0x00F5, 0x00FA, 0x00F9, 0x00FB, 0x00FC, 0x2020,
    0x00B0, 0x00A2, 0x00A3, 0x00A7, 0x2022, 0x00B6, 0x00DF, 0x00AE, 0x00A9, 0x2122, 0x00B4,
    0x00A8, 0x2260, 0x00C6, 0x00D8, 0x221E, 0x00B1, 0x2264, 0x2265, 0x00A5, 0x00B5, 0x2202,
    0x2211, 0x220F, 0x03C0, 0x222B, 0x00AA, 0x00BA, 0x03A9, 0x00E6, 0x00F8, 0x00BF, 0x00A1,
    0x00AC, 0x221A, 0x0192, 0x2248, 0x2206, 0x00AB, 0x00BB, 0x2026, 0x00A0, 0x00C0, 0x00C3,
    0x00D5, 0x0152, 0x0153, 0x2013, 0x2014, 0x201C, 0x201D, 0x2018, 0x2019, 0x00F7, 0x25CA,
    0x00FF, 0x0178, 0x2044, 0x00A4, 0x2039, 0x203A, 0xFB01, 0xFB02, 0x2021, 0x00B7, 0x201A,
    0x201E, 0x2030, 0x00C2, 0x00CA, 0x00C1, 0x00CB, 0x00C8, 0x00CD, 0x00CE, 0x00CF, 0x00CC,
    0x00D3, 0x00D4, 0, 0x00D2, 0x00DA, 0x00DB, 0x00D9, 0x0131, 0x02C6, 0x02DC, 0x00AF,
    0x02D8, 0x02D9, 0x02DA, 0x00B8, 0x02DD, 0x02DB, 0x02C7,
];

/// Dense table for codes 0..=255.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayWidths {
    first_char: u8,
    last_char: u8,
    widths: Vec<i64>,
    space_width: i64,
    encoding: ByteEncoding,
}

impl ArrayWidths {
    pub fn from_program(
        program: &dyn FontProgram,
        map: CharacterMap,
        encoding: ByteEncoding,
    ) -> Self {
        let first_char = 0u8;
        let last_char = 255u8;
        let units = program.units_per_em();
        let last_glyph = program.glyph_count().saturating_sub(1);
        let widths: Vec<i64> = (first_char..=last_char)
            .map(|code| {
                let lookup = if map.is_unicode() {
                    encoding.decode(code)
                } else {
                    Some(code as u32)
                };
                let glyph = lookup
                    .and_then(|value| program.glyph_for_character(map, value))
                    .unwrap_or(0)
                    .min(last_glyph);
                let advance = program.advance_width(glyph).unwrap_or(0);
                scale_width(advance, units)
            })
            .collect();
        let space_width = widths[(b' ' - first_char) as usize];
        Self {
            first_char,
            last_char,
            widths,
            space_width,
            encoding,
        }
    }

    pub fn first_char(&self) -> u8 {
        self.first_char
    }

    pub fn last_char(&self) -> u8 {
        self.last_char
    }

    pub fn widths(&self) -> &[i64] {
        &self.widths
    }

    pub fn space_width(&self) -> i64 {
        self.space_width
    }

    pub fn encoding(&self) -> ByteEncoding {
        self.encoding
    }

    fn width_of_code(&self, code: u8) -> Option<i64> {
        if code < self.first_char || code > self.last_char {
            return None;
        }
        self.widths.get((code - self.first_char) as usize).copied()
    }
}

impl GlyphWidths for ArrayWidths {
    fn register_glyph(&mut self, ch: char) -> char {
        if self.encoding.encode(ch).is_some() {
            ch
        } else {
            '?'
        }
    }

    fn width_of(&self, ch: char) -> Option<i64> {
        self.encoding
            .encode(ch)
            .and_then(|code| self.width_of_code(code))
    }

    fn write_widths(&self, writer: &mut PdfWriter) {
        writer.entry_int("FirstChar", self.first_char as i64);
        writer.entry_int("LastChar", self.last_char as i64);
        writer.begin_entry("Widths");
        let widths_ref = writer.begin_object();
        writer.begin_array();
        for width in &self.widths {
            writer.write_int(*width);
        }
        writer.end_array();
        writer.end_object();
        writer.write_ref(widths_ref);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GlyphUse {
    width: i64,
    ch: char,
}

/// Sparse CID table filled as glyphs are registered.
#[derive(Debug, Clone)]
pub struct CompositeWidths {
    program: Arc<dyn FontProgram>,
    map: CharacterMap,
    glyphs: BTreeMap<u16, GlyphUse>,
    replacement: char,
}

impl CompositeWidths {
    pub fn new(program: Arc<dyn FontProgram>, map: CharacterMap) -> Self {
        let replacement = if program.glyph_for_character(map, 0xFFFD).is_some() {
            '\u{FFFD}'
        } else {
            '?'
        };
        Self {
            program,
            map,
            glyphs: BTreeMap::new(),
            replacement,
        }
    }

    pub fn replacement(&self) -> char {
        self.replacement
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Glyph id for `ch` without recording it; unencodable characters use the
    /// replacement's glyph.
    pub fn glyph_id(&self, ch: char) -> u16 {
        self.lookup(ch)
            .or_else(|| self.lookup(self.replacement))
            .unwrap_or(0)
    }

    /// Two-byte Identity-H codes for `text`.
    pub fn encode_text(&self, text: &str) -> Vec<u8> {
        text.chars()
            .flat_map(|ch| self.glyph_id(ch).to_be_bytes())
            .collect()
    }

    fn lookup(&self, ch: char) -> Option<u16> {
        let code = ch as u32;
        if code > 0xFFFF {
            return None;
        }
        self.program.glyph_for_character(self.map, code)
    }

    fn glyph_width(&self, glyph: u16) -> i64 {
        let advance = self.program.advance_width(glyph).unwrap_or(0);
        scale_width(advance, self.program.units_per_em())
    }

    /// Body of the ToUnicode CMap stream for the registered glyphs.
    pub fn to_unicode_cmap(&self) -> String {
        let ranges = self.bf_ranges();
        let mut out = String::new();
        out.push_str("/CIDInit /ProcSet findresource begin\n");
        out.push_str("12 dict begin\n");
        out.push_str("begincmap\n");
        out.push_str(
            "/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n",
        );
        out.push_str("/CMapName /Adobe-Identity-UCS def\n");
        out.push_str("/CMapType 2 def\n");
        out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");
        for block in ranges.chunks(BFRANGE_BLOCK) {
            let _ = writeln!(out, "{} beginbfrange", block.len());
            for (start, end, ch) in block {
                let _ = writeln!(out, "<{:04X}> <{:04X}> <{}>", start, end, utf16_hex(*ch));
            }
            out.push_str("endbfrange\n");
        }
        out.push_str("endcmap\n");
        out.push_str("CMapName currentdict /CMap defineresource pop\n");
        out.push_str("end\nend\n");
        out
    }

    /// `(first gid, last gid, first char)` runs where both gid and character
    /// advance by one and stay inside one high byte.
    fn bf_ranges(&self) -> Vec<(u16, u16, char)> {
        let mut ranges: Vec<(u16, u16, char)> = Vec::new();
        for (gid, glyph) in &self.glyphs {
            if let Some((start, end, first)) = ranges.last_mut() {
                let next_gid = *end as u32 + 1;
                let span = (*end - *start) as u32 + 1;
                let next_char = *first as u32 + span;
                let mergeable = *gid as u32 == next_gid
                    && glyph.ch as u32 == next_char
                    && gid >> 8 == *start >> 8
                    && next_char <= 0xFFFF
                    && next_char >> 8 == *first as u32 >> 8;
                if mergeable {
                    *end = *gid;
                    continue;
                }
            }
            ranges.push((*gid, *gid, glyph.ch));
        }
        ranges
    }
}

impl GlyphWidths for CompositeWidths {
    fn register_glyph(&mut self, ch: char) -> char {
        let (shown, glyph) = match self.lookup(ch) {
            Some(glyph) => (ch, glyph),
            None => {
                let replacement = self.replacement;
                (replacement, self.lookup(replacement).unwrap_or(0))
            }
        };
        if !self.glyphs.contains_key(&glyph) {
            let width = self.glyph_width(glyph);
            self.glyphs.insert(glyph, GlyphUse { width, ch: shown });
        }
        shown
    }

    fn width_of(&self, ch: char) -> Option<i64> {
        Some(self.glyph_width(self.glyph_id(ch)))
    }

    fn write_widths(&self, writer: &mut PdfWriter) {
        writer.entry_int("DW", DEFAULT_CID_WIDTH);
        writer.begin_entry("W");
        writer.begin_array();
        let mut previous: Option<u16> = None;
        for (gid, glyph) in &self.glyphs {
            let continues = previous.is_some_and(|prev| prev as u32 + 1 == *gid as u32);
            if !continues {
                if previous.is_some() {
                    writer.end_array();
                }
                writer.write_int(*gid as i64);
                writer.begin_array();
            }
            writer.write_int(glyph.width);
            previous = Some(*gid);
        }
        if previous.is_some() {
            writer.end_array();
        }
        writer.end_array();
    }
}

fn utf16_hex(ch: char) -> String {
    let mut units = [0u16; 2];
    ch.encode_utf16(&mut units)
        .iter()
        .map(|unit| format!("{:04X}", unit))
        .collect()
}

/// The width strategy a font definition was given.
#[derive(Debug, Clone)]
pub enum FontWidths {
    /// Standard fonts: metrics come from the built-in table, nothing is written.
    Empty,
    Array(ArrayWidths),
    Composite(CompositeWidths),
}

impl FontWidths {
    pub fn is_empty(&self) -> bool {
        matches!(self, FontWidths::Empty)
    }

    /// Whether glyphs were registered that a ToUnicode map must cover.
    pub fn has_registered_glyphs(&self) -> bool {
        match self {
            FontWidths::Composite(table) => table.glyph_count() > 0,
            _ => false,
        }
    }
}

impl GlyphWidths for FontWidths {
    fn register_glyph(&mut self, ch: char) -> char {
        match self {
            FontWidths::Empty => {
                if ByteEncoding::WinAnsi.encode(ch).is_some() {
                    ch
                } else {
                    '?'
                }
            }
            FontWidths::Array(table) => table.register_glyph(ch),
            FontWidths::Composite(table) => table.register_glyph(ch),
        }
    }

    fn width_of(&self, ch: char) -> Option<i64> {
        match self {
            FontWidths::Empty => None,
            FontWidths::Array(table) => table.width_of(ch),
            FontWidths::Composite(table) => table.width_of(ch),
        }
    }

    fn write_widths(&self, writer: &mut PdfWriter) {
        match self {
            FontWidths::Empty => {}
            FontWidths::Array(table) => table.write_widths(writer),
            FontWidths::Composite(table) => table.write_widths(writer),
        }
    }
}
