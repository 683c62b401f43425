//! KTX2 texture containers.
//!
//! Only payloads the GPU can sample without transcoding are used: plain
//! RGBA8 and the BC/ETC2/ASTC block formats the device reports. Basis
//! Universal and supercompressed payloads fall back to the glTF image
//! source.

use ::ktx2::Format;

use super::DecoderCaps;
use crate::error::LoadError;
use crate::scene::{CompressedFormat, TextureData, TextureFormat};

/// File identifier at the start of every KTX2 container
pub const MAGIC: [u8; 12] = [0xAB, 0x4B, 0x54, 0x58, 0x20, 0x32, 0x30, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A];

pub const MIME_TYPE: &str = "image/ktx2";

const BLOCK_FORMATS: &[(Format, CompressedFormat)] = &[
    (Format::BC1_RGBA_UNORM_BLOCK, CompressedFormat::Bc1RgbaUnorm),
    (Format::BC1_RGBA_SRGB_BLOCK, CompressedFormat::Bc1RgbaSrgb),
    (Format::BC3_UNORM_BLOCK, CompressedFormat::Bc3RgbaUnorm),
    (Format::BC3_SRGB_BLOCK, CompressedFormat::Bc3RgbaSrgb),
    (Format::BC4_UNORM_BLOCK, CompressedFormat::Bc4RUnorm),
    (Format::BC5_UNORM_BLOCK, CompressedFormat::Bc5RgUnorm),
    (Format::BC7_UNORM_BLOCK, CompressedFormat::Bc7RgbaUnorm),
    (Format::BC7_SRGB_BLOCK, CompressedFormat::Bc7RgbaSrgb),
    (Format::ETC2_R8G8B8_UNORM_BLOCK, CompressedFormat::Etc2Rgb8Unorm),
    (Format::ETC2_R8G8B8_SRGB_BLOCK, CompressedFormat::Etc2Rgb8Srgb),
    (Format::ETC2_R8G8B8A8_UNORM_BLOCK, CompressedFormat::Etc2Rgba8Unorm),
    (Format::ETC2_R8G8B8A8_SRGB_BLOCK, CompressedFormat::Etc2Rgba8Srgb),
    (Format::ASTC_4x4_UNORM_BLOCK, CompressedFormat::Astc4x4Unorm),
    (Format::ASTC_4x4_SRGB_BLOCK, CompressedFormat::Astc4x4Srgb),
];

pub fn is_ktx2(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

/// What to do with a KTX2 payload on this host
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ktx2Plan {
    Upload(TextureFormat),
    /// Use the regular image source instead
    Fallback(String),
}

/// Decide whether a payload of `format` can be uploaded as-is
pub fn negotiate(format: Option<Format>, supercompressed: bool, caps: &DecoderCaps) -> Ktx2Plan {
    if !caps.ktx2 {
        return Ktx2Plan::Fallback("KTX2 decoding disabled".into());
    }
    if supercompressed {
        return Ktx2Plan::Fallback("supercompressed payload".into());
    }
    let Some(format) = format else {
        return Ktx2Plan::Fallback("Basis Universal payload needs a transcoder".into());
    };
    if format == Format::R8G8B8A8_UNORM {
        return Ktx2Plan::Upload(TextureFormat::Rgba8 { srgb: false });
    }
    if format == Format::R8G8B8A8_SRGB {
        return Ktx2Plan::Upload(TextureFormat::Rgba8 { srgb: true });
    }
    match BLOCK_FORMATS.iter().find(|(f, _)| *f == format) {
        Some(&(_, compressed)) if caps.supports_family(compressed.family()) => {
            Ktx2Plan::Upload(TextureFormat::Compressed(compressed))
        }
        Some(&(_, compressed)) => {
            Ktx2Plan::Fallback(format!("{:?} not supported by the GPU", compressed.family()))
        }
        None => Ktx2Plan::Fallback(format!("format {:?}", format)),
    }
}

/// Decode a KTX2 container; `Ok(None)` asks the caller to use the fallback
/// image.
pub fn decode(bytes: &[u8], caps: &DecoderCaps) -> Result<Option<TextureData>, LoadError> {
    let reader = ::ktx2::Reader::new(bytes).map_err(|e| LoadError::TextureCodec(format!("{:?}", e)))?;
    let header = reader.header();

    if header.pixel_depth > 1 || header.face_count > 1 || header.layer_count > 1 {
        return Err(LoadError::TextureCodec("only 2D textures are supported".into()));
    }
    let (width, height) = (header.pixel_width, header.pixel_height);
    if width == 0 || height == 0 {
        return Err(LoadError::TextureCodec("zero-sized texture".into()));
    }

    let format = match negotiate(header.format, header.supercompression_scheme.is_some(), caps) {
        Ktx2Plan::Upload(format) => format,
        Ktx2Plan::Fallback(reason) => {
            tracing::debug!("KTX2 fallback: {}", reason);
            return Ok(None);
        }
    };
    if matches!(format, TextureFormat::Compressed(_)) && (width % 4 != 0 || height % 4 != 0) {
        tracing::debug!("KTX2 fallback: {}x{} is not block aligned", width, height);
        return Ok(None);
    }

    let levels: Vec<Vec<u8>> = reader.levels().map(|level| level.to_vec()).collect();
    if levels.is_empty() {
        return Err(LoadError::TextureCodec("no mip levels".into()));
    }
    for (i, level) in levels.iter().enumerate() {
        let expected = level_size(format, width >> i, height >> i);
        if level.len() < expected {
            return Err(LoadError::TextureCodec(format!(
                "level {} holds {} bytes, expected {}",
                i,
                level.len(),
                expected
            )));
        }
    }

    Ok(Some(TextureData {
        width,
        height,
        format,
        levels,
    }))
}

/// Bytes of one tightly packed level
pub fn level_size(format: TextureFormat, width: u32, height: u32) -> usize {
    let (w, h) = (width.max(1) as usize, height.max(1) as usize);
    match format {
        TextureFormat::Rgba8 { .. } => w * h * 4,
        TextureFormat::Compressed(c) => w.div_ceil(4) * h.div_ceil(4) * c.block_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps_with_bc() -> DecoderCaps {
        DecoderCaps {
            bc: true,
            ..DecoderCaps::software()
        }
    }

    #[test]
    fn test_negotiate_block_formats() {
        assert_eq!(
            negotiate(Some(Format::BC7_SRGB_BLOCK), false, &caps_with_bc()),
            Ktx2Plan::Upload(TextureFormat::Compressed(CompressedFormat::Bc7RgbaSrgb))
        );
        // Same payload on a device without BC support
        assert!(matches!(
            negotiate(Some(Format::BC7_SRGB_BLOCK), false, &DecoderCaps::software()),
            Ktx2Plan::Fallback(_)
        ));
        assert!(matches!(
            negotiate(Some(Format::ASTC_4x4_UNORM_BLOCK), false, &caps_with_bc()),
            Ktx2Plan::Fallback(_)
        ));
    }

    #[test]
    fn test_negotiate_basis_and_supercompression() {
        let caps = caps_with_bc();
        assert!(matches!(negotiate(None, false, &caps), Ktx2Plan::Fallback(_)));
        assert!(matches!(negotiate(Some(Format::BC1_RGBA_UNORM_BLOCK), true, &caps), Ktx2Plan::Fallback(_)));
        let disabled = DecoderCaps { ktx2: false, ..caps };
        assert!(matches!(negotiate(Some(Format::R8G8B8A8_SRGB), false, &disabled), Ktx2Plan::Fallback(_)));
    }

    #[test]
    fn test_negotiate_plain_rgba() {
        assert_eq!(
            negotiate(Some(Format::R8G8B8A8_SRGB), false, &DecoderCaps::software()),
            Ktx2Plan::Upload(TextureFormat::Rgba8 { srgb: true })
        );
    }

    #[test]
    fn test_level_size() {
        let bc1 = TextureFormat::Compressed(CompressedFormat::Bc1RgbaUnorm);
        assert_eq!(level_size(bc1, 8, 8), 4 * 8);
        // Levels below one block still occupy a whole block
        assert_eq!(level_size(bc1, 2, 1), 8);
        assert_eq!(level_size(TextureFormat::Rgba8 { srgb: false }, 3, 2), 24);
    }

    #[test]
    fn test_magic() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[0; 64]);
        assert!(is_ktx2(&bytes));
        assert!(!is_ktx2(b"\x89PNG\r\n\x1a\n"));
        // Magic with a truncated header is a codec error, not a panic
        assert!(matches!(decode(&bytes[..20], &DecoderCaps::software()), Err(LoadError::TextureCodec(_))));
    }
}
