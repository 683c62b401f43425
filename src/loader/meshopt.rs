//! `EXT_meshopt_compression` buffer view decoding.
//!
//! The vertex and index codecs come from the `meshopt` crate; the
//! post-decode filters are applied here in place on the decoded bytes.

use serde::Deserialize;

use crate::error::LoadError;

pub const EXT_NAME: &str = "EXT_meshopt_compression";
pub const KHR_NAME: &str = "KHR_meshopt_compression";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Attributes,
    Triangles,
    Indices,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Filter {
    #[default]
    None,
    Octahedral,
    Quaternion,
    Exponential,
}

/// Extension object of a compressed buffer view
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedView {
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: usize,
    pub count: usize,
    pub mode: Mode,
    #[serde(default)]
    pub filter: Filter,
}

impl CompressedView {
    /// Parse the extension from a buffer view's extension map, if present
    pub fn from_extensions(
        extensions: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Option<Self>, LoadError> {
        let Some(value) = extensions.and_then(|e| e.get(EXT_NAME).or_else(|| e.get(KHR_NAME))) else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| LoadError::MeshCodec(format!("bad extension object: {}", e)))
    }

    /// Size of the decoded data
    pub fn decoded_len(&self) -> Option<usize> {
        self.count.checked_mul(self.byte_stride)
    }
}

/// Whether a buffer is a placeholder to be filled by decompression
pub fn is_fallback_buffer(extensions: Option<&serde_json::Map<String, serde_json::Value>>) -> bool {
    extensions
        .and_then(|e| e.get(EXT_NAME).or_else(|| e.get(KHR_NAME)))
        .and_then(|v| v.get("fallback"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn codec_error(e: impl std::fmt::Display) -> LoadError {
    LoadError::MeshCodec(e.to_string())
}

macro_rules! decode_strided {
    ($encoded:expr, $count:expr, $stride:expr, $($words:literal)*) => {
        match $stride / 4 {
            $(
                $words => ::meshopt::encoding::decode_vertex_buffer::<[u32; $words]>($encoded, $count)
                    .map(|v| bytemuck::cast_slice::<[u32; $words], u8>(&v).to_vec())
                    .map_err(codec_error),
            )*
            _ => Err(LoadError::MeshCodec(format!("unsupported vertex stride {}", $stride))),
        }
    };
}

/// Decode a compressed view into `count * byte_stride` bytes
pub fn decode(view: &CompressedView, encoded: &[u8]) -> Result<Vec<u8>, LoadError> {
    let stride = view.byte_stride;
    let mut data = match view.mode {
        Mode::Attributes => {
            if stride == 0 || stride % 4 != 0 {
                return Err(LoadError::MeshCodec(format!("vertex stride {} is not a multiple of 4", stride)));
            }
            decode_strided!(
                encoded, view.count, stride,
                1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
                17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32
            )?
        }
        Mode::Triangles => match stride {
            2 => ::meshopt::encoding::decode_index_buffer::<u16>(encoded, view.count)
                .map(|v| bytemuck::cast_slice::<u16, u8>(&v).to_vec())
                .map_err(codec_error)?,
            4 => ::meshopt::encoding::decode_index_buffer::<u32>(encoded, view.count)
                .map(|v| bytemuck::cast_slice::<u32, u8>(&v).to_vec())
                .map_err(codec_error)?,
            _ => return Err(LoadError::MeshCodec(format!("index stride {}", stride))),
        },
        Mode::Indices => {
            return Err(LoadError::MeshCodec("INDICES mode is not supported".into()));
        }
    };

    if view.mode == Mode::Attributes {
        apply_filter(view.filter, &mut data, stride)?;
    }
    Ok(data)
}

/// Undo an encoding filter in place
pub fn apply_filter(filter: Filter, data: &mut [u8], stride: usize) -> Result<(), LoadError> {
    match (filter, stride) {
        (Filter::None, _) => {}
        (Filter::Octahedral, 4) => data.chunks_exact_mut(4).for_each(decode_oct_i8),
        (Filter::Octahedral, 8) => data.chunks_exact_mut(8).for_each(decode_oct_i16),
        (Filter::Quaternion, 8) => data.chunks_exact_mut(8).for_each(decode_quat),
        (Filter::Exponential, s) if s % 4 == 0 => data.chunks_exact_mut(4).for_each(decode_exp),
        (f, s) => return Err(LoadError::MeshCodec(format!("{:?} filter with stride {}", f, s))),
    }
    Ok(())
}

/// Unfold an octahedral-encoded normal and renormalize to `one`
fn unfold_oct(x: f32, y: f32, z: f32, one: f32) -> [f32; 3] {
    let z = z - x.abs() - y.abs();
    let t = z.min(0.0);
    let x = x + if x >= 0.0 { t } else { -t };
    let y = y + if y >= 0.0 { t } else { -t };
    let len = (x * x + y * y + z * z).sqrt();
    let s = if len > 0.0 { one / len } else { 0.0 };
    [(x * s).round(), (y * s).round(), (z * s).round()]
}

fn decode_oct_i8(v: &mut [u8]) {
    let [x, y, z] = unfold_oct(v[0] as i8 as f32, v[1] as i8 as f32, v[2] as i8 as f32, 127.0);
    v[0] = x as i8 as u8;
    v[1] = y as i8 as u8;
    v[2] = z as i8 as u8;
}

fn get_i16(v: &[u8], i: usize) -> i16 {
    i16::from_le_bytes([v[i * 2], v[i * 2 + 1]])
}

fn put_i16(v: &mut [u8], i: usize, value: i16) {
    v[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
}

fn decode_oct_i16(v: &mut [u8]) {
    let [x, y, z] = unfold_oct(get_i16(v, 0) as f32, get_i16(v, 1) as f32, get_i16(v, 2) as f32, 32767.0);
    put_i16(v, 0, x as i16);
    put_i16(v, 1, y as i16);
    put_i16(v, 2, z as i16);
}

/// Rebuild the dropped quaternion component; the low two bits of the
/// fourth value select which component was dropped
fn decode_quat(v: &mut [u8]) {
    let scale = std::f32::consts::FRAC_1_SQRT_2;
    let q3 = get_i16(v, 3);
    let sf = (q3 | 3) as f32;
    let ss = scale / sf;

    let x = get_i16(v, 0) as f32 * ss;
    let y = get_i16(v, 1) as f32 * ss;
    let z = get_i16(v, 2) as f32 * ss;
    let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();

    let quantize = |f: f32| (f * 32767.0 + if f >= 0.0 { 0.5 } else { -0.5 }) as i16;
    let qc = (q3 & 3) as usize;
    put_i16(v, (qc + 1) & 3, quantize(x));
    put_i16(v, (qc + 2) & 3, quantize(y));
    put_i16(v, (qc + 3) & 3, quantize(z));
    put_i16(v, qc, quantize(w));
}

/// 24-bit signed mantissa, 8-bit signed exponent
fn decode_exp(v: &mut [u8]) {
    let bits = i32::from_le_bytes([v[0], v[1], v[2], v[3]]);
    let mantissa = (bits << 8) >> 8;
    let exponent = bits >> 24;
    let value = f32::from_bits(((exponent + 127) as u32) << 23) * mantissa as f32;
    v.copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oct_filter() {
        let mut up = [0u8, 0, 127, 0];
        apply_filter(Filter::Octahedral, &mut up, 4).unwrap();
        assert_eq!(up, [0, 0, 127, 0]);

        let mut side = [127u8, 0, 127, 9];
        apply_filter(Filter::Octahedral, &mut side, 4).unwrap();
        assert_eq!(side, [127, 0, 0, 9]);
    }

    #[test]
    fn test_oct_filter_i16() {
        let mut data = [0u8; 8];
        put_i16(&mut data, 0, -32767);
        put_i16(&mut data, 2, 32767);
        apply_filter(Filter::Octahedral, &mut data, 8).unwrap();
        assert_eq!(get_i16(&data, 0), -32767);
        assert_eq!(get_i16(&data, 1), 0);
        assert_eq!(get_i16(&data, 2), 0);
    }

    #[test]
    fn test_quat_filter_identity() {
        let mut data = [0u8; 8];
        put_i16(&mut data, 3, 3);
        apply_filter(Filter::Quaternion, &mut data, 8).unwrap();
        assert_eq!([get_i16(&data, 0), get_i16(&data, 1), get_i16(&data, 2)], [0, 0, 0]);
        assert_eq!(get_i16(&data, 3), 32767);
    }

    #[test]
    fn test_exp_filter() {
        let bits: i32 = (-1i32 << 24) | 3;
        let mut data = bits.to_le_bytes();
        apply_filter(Filter::Exponential, &mut data, 4).unwrap();
        assert_eq!(f32::from_le_bytes(data), 1.5);

        let bits: i32 = (2i32 << 24) | (0xff_ffff & -5i32);
        let mut data = bits.to_le_bytes();
        apply_filter(Filter::Exponential, &mut data, 4).unwrap();
        assert_eq!(f32::from_le_bytes(data), -20.0);
    }

    #[test]
    fn test_filter_stride_mismatch() {
        let mut data = [0u8; 12];
        assert!(apply_filter(Filter::Quaternion, &mut data, 12).is_err());
        assert!(apply_filter(Filter::Octahedral, &mut data, 12).is_err());
    }

    #[test]
    fn test_extension_parse() {
        let json = serde_json::json!({
            "EXT_meshopt_compression": {
                "buffer": 0, "byteOffset": 16, "byteLength": 100,
                "byteStride": 8, "count": 24, "mode": "ATTRIBUTES", "filter": "OCTAHEDRAL"
            }
        });
        let view = CompressedView::from_extensions(json.as_object()).unwrap().unwrap();
        assert_eq!(view.byte_offset, 16);
        assert_eq!(view.mode, Mode::Attributes);
        assert_eq!(view.filter, Filter::Octahedral);
        assert_eq!(view.decoded_len(), Some(192));

        assert!(CompressedView::from_extensions(None).unwrap().is_none());
        let bad = serde_json::json!({ "EXT_meshopt_compression": { "buffer": 0 } });
        assert!(CompressedView::from_extensions(bad.as_object()).is_err());
    }

    #[test]
    fn test_fallback_flag() {
        let json = serde_json::json!({ "EXT_meshopt_compression": { "fallback": true } });
        assert!(is_fallback_buffer(json.as_object()));
        assert!(!is_fallback_buffer(None));
    }

    #[test]
    fn test_index_roundtrip_through_codec() {
        let indices: Vec<u32> = vec![0, 1, 2, 2, 1, 3, 4, 5, 6];
        let encoded = ::meshopt::encoding::encode_index_buffer(&indices, 7).unwrap();
        let view = CompressedView {
            buffer: 0,
            byte_offset: 0,
            byte_length: encoded.len(),
            byte_stride: 4,
            count: indices.len(),
            mode: Mode::Triangles,
            filter: Filter::None,
        };
        let decoded = decode(&view, &encoded).unwrap();
        let words: Vec<u32> = decoded
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(words, indices);
    }
}
