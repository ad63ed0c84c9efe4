use crate::error::IngestError;

/// Decodes little endian indices of `width` bytes into 32 bit indices.
pub fn decode_indices(bytes: &[u8], width: usize) -> Result<Vec<u32>, IngestError> {
    if !matches!(width, 1 | 2 | 4) {
        return Err(IngestError::UnsupportedIndexWidth(width));
    }
    if bytes.len() % width != 0 {
        return Err(IngestError::InvalidRawData(format!(
            "{} index bytes are not a multiple of the index width {}",
            bytes.len(),
            width
        )));
    }

    let indices = match width {
        1 => bytes.iter().map(|&i| i as u32).collect(),
        2 => bytes
            .chunks_exact(2)
            .map(|i| u16::from_le_bytes([i[0], i[1]]) as u32)
            .collect(),
        _ => bytes
            .chunks_exact(4)
            .map(|i| u32::from_le_bytes([i[0], i[1], i[2], i[3]]))
            .collect(),
    };
    Ok(indices)
}

/// Byte width of a glTF index accessor. Only unsigned integer types are valid indices.
pub fn gltf_index_width(accessor: &gltf::Accessor<'_>) -> Result<usize, IngestError> {
    use gltf::accessor::DataType;
    match accessor.data_type() {
        DataType::U8 => Ok(1),
        DataType::U16 => Ok(2),
        DataType::U32 => Ok(4),
        other => Err(IngestError::UnsupportedIndexWidth(other.size())),
    }
}

pub fn validate_indices(indices: &[u32], vertex_count: usize) -> Result<(), IngestError> {
    match indices.iter().find(|&&i| i as usize >= vertex_count) {
        Some(&index) => Err(IngestError::IndexOutOfRange {
            index,
            vertex_count,
        }),
        None => Ok(()),
    }
}
