use crate::document::RenderOptions;
use crate::error::ResourceError;
use crate::writer::{ObjRef, PdfWriter};
use base64::Engine;
use image::GenericImageView;
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageEncoding {
    /// JPEG bytes passed through unchanged.
    Dct,
    /// Raw 8-bit samples, Flate-compressed when streams are compressed.
    Samples,
}

/// A decoded image ready to be written as an Image XObject.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImageData {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) color_space: &'static str,
    pub(crate) encoding: ImageEncoding,
    pub(crate) data: Vec<u8>,
    /// 8-bit DeviceGray soft mask, present when any pixel is not opaque.
    pub(crate) alpha: Option<Vec<u8>>,
}

/// Registry key for an image source: the lowercased path, or a digest of a
/// `data:` URI payload.
pub(crate) fn image_key(source: &str) -> String {
    match source.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((_, payload)) => {
            let mut hasher = Sha256::new();
            hasher.update(payload.as_bytes());
            let digest = hasher.finalize();
            let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
            format!("sha256:{hex}")
        }
        None => source.to_lowercase(),
    }
}

pub(crate) fn load_image(source: &str) -> Result<ImageData, ResourceError> {
    if source.starts_with("data:") {
        let (mime, data) = parse_data_uri(source)?;
        return decode_image_bytes(&data, Some(&mime), &format!("data:{mime}"));
    }

    let path = Path::new(source);
    let bytes = std::fs::read(path).map_err(|err| ResourceError::Image {
        source: source.to_string(),
        message: format!("unreadable: {err}"),
    })?;
    decode_image_bytes(&bytes, None, source)
}

fn decode_image_bytes(
    data: &[u8],
    mime: Option<&str>,
    source: &str,
) -> Result<ImageData, ResourceError> {
    let format = match mime {
        Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => {
            Some(image::ImageFormat::Jpeg)
        }
        _ => image::guess_format(data).ok(),
    };

    let decoded = match format {
        Some(format) => image::load_from_memory_with_format(data, format),
        None => image::load_from_memory(data),
    }
    .map_err(|err| ResourceError::Image {
        source: source.to_string(),
        message: err.to_string(),
    })?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(ResourceError::Image {
            source: source.to_string(),
            message: "image has no pixels".to_string(),
        });
    }

    let passthrough = match format {
        Some(image::ImageFormat::Jpeg) => dct_color_space(data),
        _ => None,
    };
    if let Some(color_space) = passthrough {
        return Ok(ImageData {
            width,
            height,
            color_space,
            encoding: ImageEncoding::Dct,
            data: data.to_vec(),
            alpha: None,
        });
    }

    let rgba = decoded.to_rgba8();
    let pixels = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = Vec::with_capacity(pixels);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    Ok(ImageData {
        width,
        height,
        color_space: "DeviceRGB",
        encoding: ImageEncoding::Samples,
        data: rgb,
        alpha: has_alpha.then_some(alpha),
    })
}

/// Colour space for passing JPEG data through unchanged. CMYK and other
/// component layouts return `None` and are re-encoded from decoded samples.
fn dct_color_space(data: &[u8]) -> Option<&'static str> {
    match jpeg_component_count(data)? {
        1 => Some("DeviceGray"),
        3 => Some("DeviceRGB"),
        _ => None,
    }
}

/// Reads the component count from the first start-of-frame segment.
fn jpeg_component_count(data: &[u8]) -> Option<u8> {
    if data.get(..2)? != [0xFF, 0xD8] {
        return None;
    }
    let mut pos = 2;
    loop {
        if *data.get(pos)? != 0xFF {
            return None;
        }
        let marker = *data.get(pos + 1)?;
        pos += 2;
        match marker {
            // Fill bytes and standalone markers carry no length.
            0xFF => pos -= 1,
            0x01 | 0xD0..=0xD7 => {}
            0xD9 | 0xDA => return None,
            _ => {
                let length = u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]) as usize;
                let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
                if is_frame {
                    return data.get(pos + 7).copied();
                }
                pos += length;
            }
        }
    }
}

fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>), ResourceError> {
    let invalid = |message: String| ResourceError::Image {
        source: "data URI".to_string(),
        message,
    };
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| invalid("not a data URI".to_string()))?;
    let (header, data_part) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' separator".to_string()))?;
    let mime = header
        .split(';')
        .next()
        .filter(|mime| !mime.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part.trim())
            .map_err(|err| invalid(format!("invalid base64 payload: {err}")))?
    } else {
        data_part.as_bytes().to_vec()
    };
    Ok((mime, data))
}

/// Writes the soft mask (if any) and then the image XObject.
pub(crate) fn render_image(
    writer: &mut PdfWriter,
    image: &ImageData,
    options: &RenderOptions,
) -> ObjRef {
    let smask = image.alpha.as_ref().map(|alpha| {
        writer.write_stream_object(alpha, options.compress_streams, options.stream_length, |w| {
            image_header(w, image.width, image.height, "DeviceGray");
        })
    });

    let compress = match image.encoding {
        ImageEncoding::Dct => false,
        ImageEncoding::Samples => options.compress_streams,
    };
    writer.write_stream_object(&image.data, compress, options.stream_length, |w| {
        image_header(w, image.width, image.height, image.color_space);
        if image.encoding == ImageEncoding::Dct {
            w.entry_name("Filter", "DCTDecode");
        }
        if let Some(smask) = smask {
            w.entry_ref("SMask", smask);
        }
    })
}

fn image_header(writer: &mut PdfWriter, width: u32, height: u32, color_space: &str) {
    writer.entry_name("Type", "XObject");
    writer.entry_name("Subtype", "Image");
    writer.entry_int("Width", width as i64);
    writer.entry_int("Height", height as i64);
    writer.entry_name("ColorSpace", color_space);
    writer.entry_int("BitsPerComponent", 8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{PdfVersion, StreamLength};
    use image::{GrayImage, ImageBuffer, ImageFormat, Luma, Rgba, RgbImage, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(alpha: u8) -> Vec<u8> {
        let img: RgbaImage = ImageBuffer::from_pixel(2, 2, Rgba([255, 0, 0, alpha]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("png");
        out.into_inner()
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([0, 128, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).expect("jpeg");
        out.into_inner()
    }

    fn uncompressed() -> RenderOptions {
        RenderOptions {
            compress_streams: false,
            stream_length: StreamLength::Direct,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn opaque_png_becomes_rgb_samples() {
        let image = decode_image_bytes(&png_bytes(255), None, "red.png").expect("decode");
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.encoding, ImageEncoding::Samples);
        assert_eq!(image.data, [255, 0, 0].repeat(4));
        assert!(image.alpha.is_none());
    }

    #[test]
    fn translucent_png_gets_a_soft_mask() {
        let image = decode_image_bytes(&png_bytes(128), None, "red.png").expect("decode");
        assert_eq!(image.alpha.as_deref(), Some(&[128u8; 4][..]));

        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        let reference = render_image(&mut writer, &image, &uncompressed());
        assert_eq!(reference.number(), 2);
        let out = String::from_utf8_lossy(&writer.finish(None)).into_owned();
        assert!(out.contains(
            "<< /Type /XObject /Subtype /Image /Width 2 /Height 2 /ColorSpace /DeviceGray /BitsPerComponent 8 /Length 4 >>"
        ));
        assert!(out.contains("/ColorSpace /DeviceRGB /BitsPerComponent 8 /SMask 1 0 R /Length 12 >>"));
    }

    #[test]
    fn jpeg_passes_through_with_dct_filter() {
        let bytes = jpeg_bytes();
        let image = decode_image_bytes(&bytes, None, "photo.jpg").expect("decode");
        assert_eq!(image.encoding, ImageEncoding::Dct);
        assert_eq!(image.data, bytes);
        assert_eq!(image.color_space, "DeviceRGB");

        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        render_image(&mut writer, &image, &RenderOptions::default());
        let out = writer.finish(None);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains(&format!("/Filter /DCTDecode /Length {} >>", bytes.len())));
        assert!(!text.contains("FlateDecode"));
    }

    #[test]
    fn grayscale_jpeg_passes_through_as_device_gray() {
        let img = GrayImage::from_pixel(4, 4, Luma([90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).expect("jpeg");
        let bytes = out.into_inner();
        assert_eq!(jpeg_component_count(&bytes), Some(1));
        let image = decode_image_bytes(&bytes, None, "gray.jpg").expect("decode");
        assert_eq!(image.encoding, ImageEncoding::Dct);
        assert_eq!(image.color_space, "DeviceGray");
    }

    #[test]
    fn four_component_jpeg_is_not_passed_through() {
        assert_eq!(jpeg_component_count(&jpeg_bytes()), Some(3));
        // SOI, an empty APP0 segment, then a baseline frame header with four components.
        let cmyk_header = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0xFF, 0xC0, 0x00, 0x14, 0x08, 0x00, 0x10, 0x00,
            0x10, 0x04, 0x01, 0x11, 0x00, 0x02, 0x11, 0x00, 0x03, 0x11, 0x00, 0x04, 0x11, 0x00,
        ];
        assert_eq!(jpeg_component_count(&cmyk_header), Some(4));
        assert_eq!(dct_color_space(&cmyk_header), None);
        assert_eq!(jpeg_component_count(b"not a jpeg"), None);
        assert_eq!(jpeg_component_count(&[0xFF, 0xD8, 0xFF, 0xDA]), None);
    }

    #[test]
    fn data_uri_images_decode_and_hash() {
        let payload = base64::engine::general_purpose::STANDARD.encode(png_bytes(255));
        let uri = format!("data:image/png;base64,{payload}");
        let image = load_image(&uri).expect("data uri");
        assert_eq!(image.width, 2);
        let key = image_key(&uri);
        assert!(key.starts_with("sha256:"));
        assert_eq!(key, image_key(&format!("data:image/png;base64,{payload}")));
        assert_ne!(key, image_key("data:image/png;base64,AAAA"));
    }

    #[test]
    fn path_keys_ignore_case() {
        assert_eq!(image_key("Images/Logo.PNG"), image_key("images/logo.png"));
    }

    #[test]
    fn unreadable_sources_are_image_errors() {
        let missing = load_image("/definitely/not/here.png");
        assert!(matches!(missing, Err(ResourceError::Image { ref source, .. }) if source == "/definitely/not/here.png"));
        let garbage = load_image("data:image/png;base64,bm90IGFuIGltYWdl");
        assert!(matches!(garbage, Err(ResourceError::Image { .. })));
        let bad_base64 = load_image("data:image/png;base64,***");
        assert!(matches!(bad_base64, Err(ResourceError::Image { .. })));
    }
}
