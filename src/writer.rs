//! Stack-disciplined PDF object writer.
//!
//! Every indirect object lives in an append-only arena; an [`ObjRef`] is its
//! index. Objects may be opened while another is still open (a font
//! dictionary can open its widths array object mid-entry), so each object
//! buffers its own body and stream bytes and the file is laid out only in
//! [`PdfWriter::finish`].
//!
//! Scope misuse (ending a dictionary that was never begun, writing stream
//! bytes outside a stream, finishing with open scopes) is a defect in the
//! calling code and panics.

use fixed::types::I32F32;
use std::fmt;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(usize);

impl ObjRef {
    /// The PDF object number (arena index + 1; object 0 is the free-list head).
    pub fn number(self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 0 R", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdfVersion {
    Pdf14,
    #[default]
    Pdf17,
}

fn pdf_header_bytes(version: PdfVersion) -> &'static [u8] {
    match version {
        PdfVersion::Pdf14 => b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n",
        PdfVersion::Pdf17 => b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n",
    }
}

/// How a stream's `/Length` entry is written once the stream is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamLength {
    /// `/Length 123`
    #[default]
    Direct,
    /// `/Length 9 0 R` with the count in its own object.
    Indirect,
}

#[derive(Debug, Default)]
struct IndirectObject {
    body: Vec<u8>,
    stream: Option<Vec<u8>>,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Object(usize),
    Dictionary,
    Array,
    Stream(usize),
}

impl Scope {
    fn label(self) -> &'static str {
        match self {
            Scope::Object(_) => "object",
            Scope::Dictionary => "dictionary",
            Scope::Array => "array",
            Scope::Stream(_) => "stream",
        }
    }
}

#[derive(Debug)]
pub struct PdfWriter {
    version: PdfVersion,
    objects: Vec<IndirectObject>,
    scopes: Vec<Scope>,
}

impl PdfWriter {
    pub fn new(version: PdfVersion) -> Self {
        Self {
            version,
            objects: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_idle(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn begin_object(&mut self) -> ObjRef {
        let index = self.objects.len();
        self.objects.push(IndirectObject::default());
        self.scopes.push(Scope::Object(index));
        ObjRef(index)
    }

    pub fn end_object(&mut self) {
        match self.scopes.pop() {
            Some(Scope::Object(index)) => {
                self.objects[index].closed = true;
            }
            other => scope_violation("object", other),
        }
    }

    pub fn begin_dictionary(&mut self) {
        self.token(b"<<");
        self.target().push(b' ');
        self.scopes.push(Scope::Dictionary);
    }

    pub fn end_dictionary(&mut self) {
        match self.scopes.pop() {
            Some(Scope::Dictionary) => {}
            other => scope_violation("dictionary", other),
        }
        let buf = self.target();
        if buf.last() != Some(&b' ') {
            buf.push(b' ');
        }
        buf.extend_from_slice(b">>");
    }

    pub fn begin_array(&mut self) {
        self.token(b"[");
        self.scopes.push(Scope::Array);
    }

    pub fn end_array(&mut self) {
        match self.scopes.pop() {
            Some(Scope::Array) => {}
            other => scope_violation("array", other),
        }
        self.target().push(b']');
    }

    /// Opens the stream of the innermost open object. Bytes written with
    /// [`write_stream_data`](Self::write_stream_data) are counted from here.
    pub fn begin_stream(&mut self) {
        let Some(index) = self.current_object() else {
            panic!("begin_stream called outside of an object");
        };
        let object = &mut self.objects[index];
        if object.stream.is_some() {
            panic!("object {} already has a stream", index + 1);
        }
        object.stream = Some(Vec::new());
        self.scopes.push(Scope::Stream(index));
    }

    /// Closes the open stream and returns the exact byte count written to it.
    pub fn end_stream(&mut self) -> usize {
        match self.scopes.pop() {
            Some(Scope::Stream(index)) => self.objects[index]
                .stream
                .as_ref()
                .map(|data| data.len())
                .unwrap_or(0),
            other => scope_violation("stream", other),
        }
    }

    pub fn write_stream_data(&mut self, data: &[u8]) {
        match self.scopes.last() {
            Some(Scope::Stream(index)) => {
                let index = *index;
                if let Some(stream) = self.objects[index].stream.as_mut() {
                    stream.extend_from_slice(data);
                }
            }
            other => scope_violation("stream", other.copied()),
        }
    }

    /// Writes the `/Length` entry for a just-closed stream into the open dictionary.
    pub fn write_stream_length(&mut self, length: usize, mode: StreamLength) {
        match mode {
            StreamLength::Direct => self.entry_int("Length", length as i64),
            StreamLength::Indirect => {
                let length_ref = self.begin_object();
                self.write_int(length as i64);
                self.end_object();
                self.entry_ref("Length", length_ref);
            }
        }
    }

    /// Writes a whole stream object. `entries` fills the dictionary; the
    /// `/Filter` and `/Length` entries are added here.
    pub fn write_stream_object(
        &mut self,
        data: &[u8],
        compress: bool,
        length: StreamLength,
        entries: impl FnOnce(&mut PdfWriter),
    ) -> ObjRef {
        let reference = self.begin_object();
        self.begin_dictionary();
        entries(self);
        let encoded = if compress { flate_compress(data) } else { Vec::new() };
        let compressed = compress && (!encoded.is_empty() || data.is_empty());
        if compressed {
            self.entry_name("Filter", "FlateDecode");
        }
        self.begin_stream();
        self.write_stream_data(if compressed { &encoded } else { data });
        let written = self.end_stream();
        self.write_stream_length(written, length);
        self.end_dictionary();
        self.end_object();
        reference
    }

    pub fn write_name(&mut self, name: &str) {
        let token = format!("/{}", escape_pdf_name(name));
        self.token(token.as_bytes());
    }

    pub fn write_int(&mut self, value: i64) {
        self.token(value.to_string().as_bytes());
    }

    pub fn write_real(&mut self, value: f32) {
        self.token(fmt(value).as_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.token(if value { b"true" } else { b"false" });
    }

    pub fn write_ref(&mut self, reference: ObjRef) {
        self.token(reference.to_string().as_bytes());
    }

    pub fn write_string(&mut self, value: &str) {
        let token = format!("({})", escape_pdf_string(value));
        self.token(token.as_bytes());
    }

    pub fn write_hex_string(&mut self, data: &[u8]) {
        let mut token = String::with_capacity(data.len() * 2 + 2);
        token.push('<');
        for byte in data {
            token.push_str(&format!("{:02X}", byte));
        }
        token.push('>');
        self.token(token.as_bytes());
    }

    /// Writes the key of a dictionary entry; the value is whatever is written next.
    pub fn begin_entry(&mut self, key: &str) {
        match self.scopes.last() {
            Some(Scope::Dictionary) => {}
            other => scope_violation("dictionary", other.copied()),
        }
        self.write_name(key);
    }

    pub fn entry_name(&mut self, key: &str, value: &str) {
        self.begin_entry(key);
        self.write_name(value);
    }

    pub fn entry_int(&mut self, key: &str, value: i64) {
        self.begin_entry(key);
        self.write_int(value);
    }

    pub fn entry_real(&mut self, key: &str, value: f32) {
        self.begin_entry(key);
        self.write_real(value);
    }

    pub fn entry_bool(&mut self, key: &str, value: bool) {
        self.begin_entry(key);
        self.write_bool(value);
    }

    pub fn entry_ref(&mut self, key: &str, value: ObjRef) {
        self.begin_entry(key);
        self.write_ref(value);
    }

    pub fn entry_string(&mut self, key: &str, value: &str) {
        self.begin_entry(key);
        self.write_string(value);
    }

    pub fn entry_reals(&mut self, key: &str, values: &[f32]) {
        self.begin_entry(key);
        self.begin_array();
        for value in values {
            self.write_real(*value);
        }
        self.end_array();
    }

    pub fn entry_ints(&mut self, key: &str, values: &[i64]) {
        self.begin_entry(key);
        self.begin_array();
        for value in values {
            self.write_int(*value);
        }
        self.end_array();
    }

    /// Lays out the whole file: header, every object in number order, a
    /// classic xref table and the trailer.
    pub fn finish(self, root: Option<ObjRef>) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out, root);
        out
    }

    pub fn write_to<W: Write>(&self, writer: &mut W, root: Option<ObjRef>) -> io::Result<usize> {
        if let Some(scope) = self.scopes.last() {
            panic!(
                "cannot finish document with an open {} ({} scopes pending)",
                scope.label(),
                self.scopes.len()
            );
        }
        let mut offset = 0usize;
        let mut offsets = vec![0usize; self.objects.len()];
        write_bytes(writer, pdf_header_bytes(self.version), &mut offset)?;
        for (index, object) in self.objects.iter().enumerate() {
            debug_assert!(object.closed);
            offsets[index] = offset;
            write_pdf_object(writer, &mut offset, index + 1, object)?;
        }

        let xref_start = offset;
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.objects.len() + 1);
        for object_offset in &offsets {
            xref.push_str(&format!("{:010} 00000 n \n", object_offset));
        }
        write_bytes(writer, xref.as_bytes(), &mut offset)?;

        let mut trailer = format!("trailer\n<< /Size {}", self.objects.len() + 1);
        if let Some(root) = root {
            trailer.push_str(&format!(" /Root {}", root));
        }
        trailer.push_str(&format!(" >>\nstartxref\n{}\n%%EOF\n", xref_start));
        write_bytes(writer, trailer.as_bytes(), &mut offset)?;
        Ok(offset)
    }

    fn current_object(&self) -> Option<usize> {
        self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::Object(index) => Some(*index),
            _ => None,
        })
    }

    fn target(&mut self) -> &mut Vec<u8> {
        let Some(index) = self.current_object() else {
            panic!("write outside of any object");
        };
        &mut self.objects[index].body
    }

    fn token(&mut self, bytes: &[u8]) {
        if matches!(self.scopes.last(), Some(Scope::Stream(_))) {
            panic!("structured token written inside a stream; use write_stream_data");
        }
        let buf = self.target();
        if let Some(last) = buf.last() {
            if !matches!(last, b' ' | b'\n' | b'[') {
                buf.push(b' ');
            }
        }
        buf.extend_from_slice(bytes);
    }
}

fn scope_violation(expected: &str, actual: Option<Scope>) -> ! {
    match actual {
        Some(scope) => panic!("expected an open {expected}, found an open {}", scope.label()),
        None => panic!("expected an open {expected}, but no scope is open"),
    }
}

fn write_pdf_object<W: Write>(
    writer: &mut W,
    offset: &mut usize,
    obj_id: usize,
    object: &IndirectObject,
) -> io::Result<()> {
    write_bytes(writer, format!("{} 0 obj\n", obj_id).as_bytes(), offset)?;
    write_bytes(writer, &object.body, offset)?;
    if let Some(stream) = &object.stream {
        write_bytes(writer, b"\nstream\n", offset)?;
        write_bytes(writer, stream, offset)?;
        write_bytes(writer, b"\nendstream", offset)?;
    }
    write_bytes(writer, b"\nendobj\n", offset)?;
    Ok(())
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

pub(crate) fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Formats a real with at most three decimals and no trailing zeros.
pub(crate) fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let clamped = value.clamp(-2_000_000.0, 2_000_000.0);
    let fixed = I32F32::from_num(clamped);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

pub(crate) fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

pub(crate) fn escape_pdf_string(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn escape_pdf_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        let delimiter = matches!(
            byte,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
        );
        if (0x21..=0x7E).contains(&byte) && !delimiter {
            out.push(byte as char);
        } else {
            out.push_str(&format!("#{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
pub(crate) fn count_token(bytes: &[u8], token: &[u8]) -> usize {
    if token.is_empty() || bytes.len() < token.len() {
        return 0;
    }
    bytes.windows(token.len()).filter(|w| *w == token).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn dictionary_tokens_are_space_separated() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        let r = w.begin_object();
        w.begin_dictionary();
        w.entry_name("Type", "Font");
        w.entry_ints("W", &[3, 500]);
        w.begin_entry("Empty");
        w.begin_array();
        w.end_array();
        w.entry_real("Scale", 0.5);
        w.end_dictionary();
        w.end_object();
        assert_eq!(r.number(), 1);
        let out = text(&w.finish(None));
        assert!(out.contains("1 0 obj\n<< /Type /Font /W [3 500] /Empty [] /Scale 0.5 >>\nendobj\n"));
    }

    #[test]
    fn nested_objects_allocate_in_begin_order() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        let outer = w.begin_object();
        w.begin_dictionary();
        w.begin_entry("Widths");
        let inner = w.begin_object();
        w.begin_array();
        w.write_int(250);
        w.end_array();
        w.end_object();
        w.write_ref(inner);
        w.end_dictionary();
        w.end_object();
        assert_eq!((outer.number(), inner.number()), (1, 2));
        let out = text(&w.finish(None));
        assert!(out.contains("1 0 obj\n<< /Widths 2 0 R >>"));
        assert!(out.contains("2 0 obj\n[250]\nendobj"));
    }

    #[test]
    fn end_stream_reports_exact_length() {
        let mut w = PdfWriter::new(PdfVersion::Pdf14);
        w.begin_object();
        w.begin_dictionary();
        w.begin_stream();
        w.write_stream_data(b"BT /F1 12 Tf ET");
        w.write_stream_data(b"\n");
        let len = w.end_stream();
        w.write_stream_length(len, StreamLength::Direct);
        w.end_dictionary();
        w.end_object();
        assert_eq!(len, 16);
        let out = text(&w.finish(None));
        assert!(out.starts_with("%PDF-1.4\n"));
        assert!(out.contains("<< /Length 16 >>\nstream\nBT /F1 12 Tf ET\n\nendstream\nendobj"));
    }

    #[test]
    fn indirect_length_gets_its_own_object() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        w.begin_object();
        w.begin_dictionary();
        w.begin_stream();
        w.write_stream_data(b"abc");
        let len = w.end_stream();
        w.write_stream_length(len, StreamLength::Indirect);
        w.end_dictionary();
        w.end_object();
        let out = text(&w.finish(None));
        assert!(out.contains("<< /Length 2 0 R >>"));
        assert!(out.contains("2 0 obj\n3\nendobj"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        for value in [1, 22, 333] {
            w.begin_object();
            w.write_int(value);
            w.end_object();
        }
        let bytes = w.finish(None);
        let xref_at = bytes
            .windows(5)
            .position(|window| window == b"xref\n")
            .expect("xref");
        let table = text(&bytes[xref_at..]);
        let entries: Vec<&str> = table.lines().skip(3).take(3).collect();
        for (index, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().expect("offset");
            let expected = format!("{} 0 obj", index + 1);
            assert!(bytes[offset..].starts_with(expected.as_bytes()));
        }
        assert!(table.contains(&format!("startxref\n{}\n%%EOF", xref_at)));
        assert_eq!(count_token(&bytes, b" 00000 n \n"), 3);
    }

    #[test]
    fn stream_object_compresses_and_counts_encoded_bytes() {
        let payload = b"0 0 m 100 100 l S\n".repeat(20);
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        let plain = w.write_stream_object(&payload, false, StreamLength::Direct, |w| {
            w.entry_name("Type", "XObject");
        });
        let packed = w.write_stream_object(&payload, true, StreamLength::Direct, |_| {});
        assert_eq!((plain.number(), packed.number()), (1, 2));
        let encoded = flate_compress(&payload);
        assert!(encoded.len() < payload.len());
        let out = text(&w.finish(None));
        assert!(out.contains(&format!("<< /Type /XObject /Length {} >>", payload.len())));
        assert!(out.contains(&format!(
            "<< /Filter /FlateDecode /Length {} >>",
            encoded.len()
        )));

        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(encoded.as_slice())
            .read_to_end(&mut inflated)
            .expect("inflate");
        assert_eq!(inflated, payload);
    }

    #[test]
    fn strings_and_names_are_escaped() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        w.begin_object();
        w.begin_dictionary();
        w.entry_string("Title", "a (b) \\ c");
        w.entry_name("BaseFont", "Open Sans#1");
        w.begin_entry("Id");
        w.write_hex_string(&[0x0A, 0xFF]);
        w.end_dictionary();
        w.end_object();
        let out = text(&w.finish(None));
        assert!(out.contains("/Title (a \\(b\\) \\\\ c)"));
        assert!(out.contains("/BaseFont /Open#20Sans#231"));
        assert!(out.contains("/Id <0AFF>"));
    }

    #[test]
    fn numbers_use_milli_precision() {
        assert_eq!(fmt(0.0), "0");
        assert_eq!(fmt(1.5), "1.5");
        assert_eq!(fmt(-0.1254), "-0.125");
        assert_eq!(fmt(96.5), "96.5");
        assert_eq!(fmt(f32::NAN), "0");
        assert_eq!(format_milli(12_000), "12");
    }

    #[test]
    #[should_panic(expected = "expected an open dictionary")]
    fn mismatched_end_panics() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        w.begin_object();
        w.begin_array();
        w.end_dictionary();
    }

    #[test]
    #[should_panic(expected = "cannot finish document")]
    fn finishing_with_open_scope_panics() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        w.begin_object();
        let _ = w.finish(None);
    }

    #[test]
    #[should_panic(expected = "outside of an object")]
    fn stream_requires_object() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        w.begin_stream();
    }

    #[test]
    fn output_loads_with_lopdf() {
        let mut w = PdfWriter::new(PdfVersion::Pdf17);
        let pages = w.begin_object();
        w.begin_dictionary();
        w.entry_name("Type", "Pages");
        w.entry_ints("Kids", &[]);
        w.entry_int("Count", 0);
        w.end_dictionary();
        w.end_object();
        let catalog = w.begin_object();
        w.begin_dictionary();
        w.entry_name("Type", "Catalog");
        w.entry_ref("Pages", pages);
        w.end_dictionary();
        w.end_object();
        let bytes = w.finish(Some(catalog));
        let doc = lopdf::Document::load_mem(&bytes).expect("parse");
        let root = doc.trailer.get(b"Root").and_then(|o| o.as_reference()).expect("root");
        assert_eq!(root, (2, 0));
    }
}
