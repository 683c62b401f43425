//! Typed reads of glTF accessors from loaded buffers.
//!
//! Handles strided views, normalized and quantized integer components
//! (`KHR_mesh_quantization`), accessors without a view and sparse overrides.

use gltf::accessor::{DataType, Dimensions};
use gltf::Accessor;

use crate::error::LoadError;

fn component_count(dims: Dimensions) -> usize {
    dims.multiplicity()
}

fn component_size(ty: DataType) -> usize {
    ty.size()
}

/// Decode one component at `bytes[..size]` to f32
fn read_component(bytes: &[u8], ty: DataType, normalized: bool) -> f32 {
    match ty {
        DataType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        DataType::I8 => {
            let v = bytes[0] as i8 as f32;
            if normalized { (v / 127.0).max(-1.0) } else { v }
        }
        DataType::U8 => {
            let v = bytes[0] as f32;
            if normalized { v / 255.0 } else { v }
        }
        DataType::I16 => {
            let v = i16::from_le_bytes([bytes[0], bytes[1]]) as f32;
            if normalized { (v / 32767.0).max(-1.0) } else { v }
        }
        DataType::U16 => {
            let v = u16::from_le_bytes([bytes[0], bytes[1]]) as f32;
            if normalized { v / 65535.0 } else { v }
        }
        DataType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
    }
}

fn read_index(bytes: &[u8], ty: DataType) -> Result<u32, LoadError> {
    Ok(match ty {
        DataType::U8 => bytes[0] as u32,
        DataType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        DataType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        other => return Err(LoadError::MissingData(format!("index component type {:?}", other))),
    })
}

/// Slice of `len` bytes at `offset` within buffer `index`
fn buffer_range<'a>(buffers: &'a [Vec<u8>], index: usize, offset: usize, len: usize) -> Result<&'a [u8], LoadError> {
    let buffer = buffers
        .get(index)
        .ok_or_else(|| LoadError::MissingData(format!("buffer {}", index)))?;
    offset
        .checked_add(len)
        .and_then(|end| buffer.get(offset..end))
        .ok_or_else(|| LoadError::MissingData(format!("buffer {} range {}+{}", index, offset, len)))
}

/// Out-of-range error for accessor `index`
fn out_of_range(index: usize, what: &str) -> LoadError {
    LoadError::MissingData(format!("accessor {} {} exceeds its buffer view", index, what))
}

/// Bytes covered by `count` elements of `elem_size` spaced `stride` apart
fn strided_span(count: usize, stride: usize, elem_size: usize) -> Option<usize> {
    match count {
        0 => Some(0),
        n => stride.checked_mul(n - 1)?.checked_add(elem_size),
    }
}

/// Upper bound for data the loader allocates on behalf of an accessor or a
/// decompressed buffer, as opposed to data read from the asset itself
pub const MAX_DECODED_BYTES: usize = 1 << 30;

/// `count` copies of `value`, failing instead of aborting when the
/// allocation is absurd or cannot be satisfied
pub(crate) fn filled<T: Clone>(value: T, count: usize) -> Result<Vec<T>, LoadError> {
    if count.checked_mul(std::mem::size_of::<T>()).is_none_or(|bytes| bytes > MAX_DECODED_BYTES) {
        return Err(LoadError::MissingData(format!("{} elements exceed the decode limit", count)));
    }
    let mut out = Vec::new();
    out.try_reserve_exact(count)
        .map_err(|_| LoadError::MissingData(format!("cannot allocate {} elements", count)))?;
    out.resize(count, value);
    Ok(out)
}

/// Raw element bytes of an accessor: (slice starting at element 0, stride)
fn element_bytes<'a>(accessor: &Accessor, buffers: &'a [Vec<u8>]) -> Result<Option<(&'a [u8], usize)>, LoadError> {
    let Some(view) = accessor.view() else {
        return Ok(None);
    };
    let elem_size = component_size(accessor.data_type()) * component_count(accessor.dimensions());
    let stride = view.stride().unwrap_or(elem_size).max(elem_size);
    let span = strided_span(accessor.count(), stride, elem_size)
        .filter(|span| accessor.offset().checked_add(*span).is_some_and(|end| end <= view.length()))
        .ok_or_else(|| out_of_range(accessor.index(), "data"))?;
    let start = view
        .offset()
        .checked_add(accessor.offset())
        .ok_or_else(|| out_of_range(accessor.index(), "offset"))?;
    let bytes = buffer_range(buffers, view.buffer().index(), start, span)?;
    Ok(Some((bytes, stride)))
}

/// Bytes of `count` tightly packed sparse entries at `offset` within `view`
fn sparse_range<'a>(
    buffers: &'a [Vec<u8>],
    accessor: usize,
    view: &gltf::buffer::View,
    offset: usize,
    count: usize,
    elem_size: usize,
) -> Result<&'a [u8], LoadError> {
    let start = view.offset().checked_add(offset);
    let len = count.checked_mul(elem_size);
    match (start, len) {
        (Some(start), Some(len)) if offset.checked_add(len).is_some_and(|end| end <= view.length()) => {
            buffer_range(buffers, view.buffer().index(), start, len)
        }
        _ => Err(out_of_range(accessor, "sparse data")),
    }
}

/// Read an accessor as `N`-component float vectors
pub fn read_vec<const N: usize>(accessor: &Accessor, buffers: &[Vec<u8>]) -> Result<Vec<[f32; N]>, LoadError> {
    let components = component_count(accessor.dimensions());
    if components < N {
        return Err(LoadError::MissingData(format!(
            "accessor {} has {} components, expected {}",
            accessor.index(),
            components,
            N
        )));
    }
    let ty = accessor.data_type();
    let size = component_size(ty);
    let normalized = accessor.normalized();

    // Validate the view before allocating anything sized by `count`
    let elements = element_bytes(accessor, buffers)?;
    let mut out = filled([0.0f32; N], accessor.count())?;
    if let Some((bytes, stride)) = elements {
        for (i, v) in out.iter_mut().enumerate() {
            let elem = &bytes[i * stride..];
            for (c, slot) in v.iter_mut().enumerate() {
                *slot = read_component(&elem[c * size..], ty, normalized);
            }
        }
    }

    if let Some(sparse) = accessor.sparse() {
        let count = sparse.count() as usize;
        let indices = sparse.indices();
        let index_ty = match indices.index_type() {
            gltf::accessor::sparse::IndexType::U8 => DataType::U8,
            gltf::accessor::sparse::IndexType::U16 => DataType::U16,
            gltf::accessor::sparse::IndexType::U32 => DataType::U32,
        };
        let index_size = component_size(index_ty);
        let elem_size = size * components;
        let index = accessor.index();
        let index_bytes = sparse_range(buffers, index, &indices.view(), indices.offset() as usize, count, index_size)?;
        let values = sparse.values();
        let value_bytes = sparse_range(buffers, index, &values.view(), values.offset() as usize, count, elem_size)?;
        for k in 0..count {
            let target = read_index(&index_bytes[k * index_size..], index_ty)? as usize;
            let v = out
                .get_mut(target)
                .ok_or_else(|| LoadError::MissingData(format!("sparse index {} out of range", target)))?;
            let elem = &value_bytes[k * elem_size..];
            for (c, slot) in v.iter_mut().enumerate() {
                *slot = read_component(&elem[c * size..], ty, normalized);
            }
        }
    }
    Ok(out)
}

/// Read a scalar index accessor
pub fn read_indices(accessor: &Accessor, buffers: &[Vec<u8>]) -> Result<Vec<u32>, LoadError> {
    if accessor.dimensions() != Dimensions::Scalar {
        return Err(LoadError::MissingData(format!("index accessor {} is not scalar", accessor.index())));
    }
    let ty = accessor.data_type();
    let Some((bytes, stride)) = element_bytes(accessor, buffers)? else {
        return filled(0, accessor.count());
    };
    (0..accessor.count())
        .map(|i| read_index(&bytes[i * stride..], ty))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_components() {
        assert_eq!(read_component(&[255], DataType::U8, true), 1.0);
        assert_eq!(read_component(&[0x80], DataType::I8, true), -1.0);
        assert_eq!(read_component(&[0xff, 0x7f], DataType::I16, true), 1.0);
        assert_eq!(read_component(&[0xff, 0x7f], DataType::I16, false), 32767.0);
        assert_eq!(read_component(&1.5f32.to_le_bytes(), DataType::F32, false), 1.5);
    }

    #[test]
    fn test_index_types() {
        assert_eq!(read_index(&[7], DataType::U8).unwrap(), 7);
        assert_eq!(read_index(&[1, 1], DataType::U16).unwrap(), 257);
        assert!(read_index(&[0; 4], DataType::F32).is_err());
    }

    #[test]
    fn test_buffer_range_bounds() {
        let buffers = vec![vec![0u8; 16]];
        assert_eq!(buffer_range(&buffers, 0, 8, 8).unwrap().len(), 8);
        assert!(buffer_range(&buffers, 0, 9, 8).is_err());
        assert!(buffer_range(&buffers, 1, 0, 1).is_err());
        assert!(buffer_range(&buffers, 0, usize::MAX, 2).is_err());
    }
}
