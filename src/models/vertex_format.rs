//! Vertex layouts (`VLay` blobs) and per-element attribute decoding.
//!
//! A layout is a list of named elements (`POSITION0`, `NORMAL0`,
//! `TEXCOORD0`..) each bound to an input slot and stored in a DXGI format.
//! Elements sharing an input slot are packed back to back, in layout order,
//! inside that slot's vertex stride.

use crate::data::stream::BinaryStream;
use crate::error::{DecodeError, DecodeResult};
use crate::recognized::Recognized;

/// Number of UV sets a mesh can carry.
pub const MAX_UV_SETS: usize = 5;

/// DXGI formats seen in vertex elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementFormat {
    /// 3 x f32 = 12 bytes
    R32G32B32Float,
    /// 4 x f16 = 8 bytes
    R16G16B16A16Float,
    /// 4 x snorm16 = 8 bytes (quantized positions)
    R16G16B16A16Snorm,
    /// 10:10:10:2 unorm = 4 bytes
    R10G10B10A2Unorm,
    /// 4 x unorm8 = 4 bytes
    R8G8B8A8Unorm,
    /// 2 x unorm16 = 4 bytes (UVs)
    R16G16Unorm,
    /// 2 x snorm16 = 4 bytes (packed normals)
    R16G16Snorm,
}

impl ElementFormat {
    pub fn from_dxgi(code: u32) -> Recognized<ElementFormat> {
        match code {
            6 => Recognized::Known(ElementFormat::R32G32B32Float),
            10 => Recognized::Known(ElementFormat::R16G16B16A16Float),
            13 => Recognized::Known(ElementFormat::R16G16B16A16Snorm),
            24 => Recognized::Known(ElementFormat::R10G10B10A2Unorm),
            28 => Recognized::Known(ElementFormat::R8G8B8A8Unorm),
            35 => Recognized::Known(ElementFormat::R16G16Unorm),
            37 => Recognized::Known(ElementFormat::R16G16Snorm),
            other => Recognized::Unknown(other),
        }
    }

    pub fn dxgi(self) -> u32 {
        match self {
            ElementFormat::R32G32B32Float => 6,
            ElementFormat::R16G16B16A16Float => 10,
            ElementFormat::R16G16B16A16Snorm => 13,
            ElementFormat::R10G10B10A2Unorm => 24,
            ElementFormat::R8G8B8A8Unorm => 28,
            ElementFormat::R16G16Unorm => 35,
            ElementFormat::R16G16Snorm => 37,
        }
    }

    pub fn size(self) -> usize {
        match self {
            ElementFormat::R32G32B32Float => 12,
            ElementFormat::R16G16B16A16Float | ElementFormat::R16G16B16A16Snorm => 8,
            ElementFormat::R10G10B10A2Unorm
            | ElementFormat::R8G8B8A8Unorm
            | ElementFormat::R16G16Unorm
            | ElementFormat::R16G16Snorm => 4,
        }
    }
}

/// Byte size of an element; unknown formats occupy no space.
pub fn element_size(format: Recognized<ElementFormat>) -> usize {
    format.known().map(|f| f.size()).unwrap_or(0)
}

/// Semantic meaning of a vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    Position,
    Normal,
    Tangent,
    TexCoord(u8),
    Color,
    Other,
}

impl Semantic {
    pub fn from_name(name: &str, index: u16) -> Semantic {
        match (name.to_ascii_uppercase().as_str(), index) {
            ("POSITION", 0) => Semantic::Position,
            ("NORMAL", 0) => Semantic::Normal,
            ("TANGENT", 0) => Semantic::Tangent,
            ("COLOR", 0) => Semantic::Color,
            ("TEXCOORD", i) if (i as usize) < MAX_UV_SETS => Semantic::TexCoord(i as u8),
            _ => Semantic::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexElement {
    /// Semantic name with its index appended, e.g. `TEXCOORD1`.
    pub key: String,
    pub semantic: Semantic,
    pub input_slot: u16,
    pub format: Recognized<ElementFormat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    pub elements: Vec<VertexElement>,
}

impl VertexLayout {
    /// A position-only layout on slot 0, used when a file carries no layout.
    pub fn position_only() -> Self {
        Self {
            elements: vec![VertexElement {
                key: "POSITION0".to_string(),
                semantic: Semantic::Position,
                input_slot: 0,
                format: Recognized::Known(ElementFormat::R32G32B32Float),
            }],
        }
    }

    pub fn element(&self, semantic: Semantic) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.semantic == semantic)
    }
}

/// Parse a `VLay` blob.
///
/// Layout: `u16` name count, length-prefixed names, `u16` element count,
/// then 20-byte elements `(name index u16, semantic index u16, input slot
/// u16, pad u16, format u32, pad 8)`.
pub fn parse_vertex_layout(stream: &mut BinaryStream<'_>) -> DecodeResult<VertexLayout> {
    let name_count = stream.read_u16()? as usize;
    let mut names = Vec::with_capacity(name_count.min(64));
    for _ in 0..name_count {
        names.push(stream.read_string()?);
    }

    let element_count = stream.read_u16()? as usize;
    let mut elements = Vec::with_capacity(element_count.min(64));
    for _ in 0..element_count {
        let name_index = stream.read_u16()? as usize;
        let semantic_index = stream.read_u16()?;
        let input_slot = stream.read_u16()?;
        stream.skip(2)?;
        let format = ElementFormat::from_dxgi(stream.read_u32()?);
        stream.skip(8)?;

        let name = names.get(name_index).ok_or(DecodeError::IndexOutOfRange {
            what: "vertex element name",
            index: name_index as i64,
            count: names.len(),
        })?;
        elements.push(VertexElement {
            key: format!("{name}{semantic_index}"),
            semantic: Semantic::from_name(name, semantic_index),
            input_slot,
            format,
        });
    }

    Ok(VertexLayout { elements })
}

/// Read a position. Returns the xyz components and the fourth (w) component,
/// which quantized layouts use to carry the normal's X.
pub fn read_position(
    stream: &mut BinaryStream<'_>,
    format: Recognized<ElementFormat>,
    scale: &[f32; 4],
    translate: &[f32; 4],
) -> DecodeResult<([f32; 3], f32)> {
    if format.is(&ElementFormat::R16G16B16A16Snorm) {
        let x = stream.read_sn16()? * scale[0] + translate[0];
        let y = stream.read_sn16()? * scale[1] + translate[1];
        let z = stream.read_sn16()? * scale[2] + translate[2];
        let w = stream.read_sn16()?;
        Ok(([x, y, z], w))
    } else {
        Ok((
            [stream.read_f32()?, stream.read_f32()?, stream.read_f32()?],
            1.0,
        ))
    }
}

/// Read a normal. `position_w` supplies X for 2-component packed normals.
pub fn read_normal(
    stream: &mut BinaryStream<'_>,
    format: Recognized<ElementFormat>,
    position_w: f32,
) -> DecodeResult<[f32; 3]> {
    if format.is(&ElementFormat::R16G16Snorm) {
        Ok([position_w, stream.read_sn16()?, stream.read_sn16()?])
    } else {
        Ok([stream.read_f16()?, stream.read_f16()?, stream.read_f16()?])
    }
}

pub fn read_tangent(
    stream: &mut BinaryStream<'_>,
    format: Recognized<ElementFormat>,
) -> DecodeResult<[f32; 4]> {
    match format.known() {
        Some(ElementFormat::R32G32B32Float) => Ok([
            stream.read_f32()?,
            stream.read_f32()?,
            stream.read_f32()?,
            1.0,
        ]),
        Some(ElementFormat::R8G8B8A8Unorm) => {
            let mut t = [0.0; 4];
            for c in &mut t {
                *c = stream.read_un8()? * 2.0 - 1.0;
            }
            Ok(t)
        }
        Some(ElementFormat::R16G16B16A16Snorm) => Ok([
            stream.read_sn16()?,
            stream.read_sn16()?,
            stream.read_sn16()?,
            stream.read_sn16()?,
        ]),
        _ => Ok([
            stream.read_f16()?,
            stream.read_f16()?,
            stream.read_f16()?,
            stream.read_f16()?,
        ]),
    }
}

/// UNORM16 texture coordinate pair.
pub fn read_uv(stream: &mut BinaryStream<'_>) -> DecodeResult<[f32; 2]> {
    Ok([stream.read_un16()?, stream.read_un16()?])
}

/// UNORM8 RGBA colour.
pub fn read_color(stream: &mut BinaryStream<'_>) -> DecodeResult<[f32; 4]> {
    Ok([
        stream.read_un8()?,
        stream.read_un8()?,
        stream.read_un8()?,
        stream.read_un8()?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_bytes(names: &[&str], elements: &[(u16, u16, u16, u32)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(names.len() as u16).to_le_bytes());
        for name in names {
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
        }
        out.extend_from_slice(&(elements.len() as u16).to_le_bytes());
        for (name, index, slot, format) in elements {
            out.extend_from_slice(&name.to_le_bytes());
            out.extend_from_slice(&index.to_le_bytes());
            out.extend_from_slice(&slot.to_le_bytes());
            out.extend_from_slice(&[0; 2]);
            out.extend_from_slice(&format.to_le_bytes());
            out.extend_from_slice(&[0; 8]);
        }
        out
    }

    #[test]
    fn parses_named_elements() {
        let data = layout_bytes(
            &["POSITION", "NORMAL", "TEXCOORD"],
            &[(0, 0, 0, 13), (1, 0, 0, 37), (2, 0, 1, 35), (2, 1, 1, 35)],
        );
        let layout = parse_vertex_layout(&mut BinaryStream::new(&data)).unwrap();
        assert_eq!(layout.elements.len(), 4);
        assert_eq!(layout.elements[0].key, "POSITION0");
        assert_eq!(layout.elements[2].semantic, Semantic::TexCoord(0));
        assert_eq!(layout.elements[3].key, "TEXCOORD1");
        assert_eq!(layout.elements[3].input_slot, 1);
        assert!(layout.elements[1].format.is(&ElementFormat::R16G16Snorm));
    }

    #[test]
    fn bad_name_index_is_rejected() {
        let data = layout_bytes(&["POSITION"], &[(3, 0, 0, 6)]);
        assert!(matches!(
            parse_vertex_layout(&mut BinaryStream::new(&data)),
            Err(DecodeError::IndexOutOfRange { index: 3, count: 1, .. })
        ));
    }

    #[test]
    fn element_sizes() {
        assert_eq!(element_size(ElementFormat::from_dxgi(6)), 12);
        assert_eq!(element_size(ElementFormat::from_dxgi(13)), 8);
        assert_eq!(element_size(ElementFormat::from_dxgi(37)), 4);
        assert_eq!(element_size(ElementFormat::from_dxgi(99)), 0);
    }

    #[test]
    fn quantized_position_feeds_normal_x() {
        let mut data = Vec::new();
        for v in [32767i16, 0, -32767, 32767] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        for v in [0i16, 32767] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let mut s = BinaryStream::new(&data);
        let (pos, w) = read_position(
            &mut s,
            ElementFormat::from_dxgi(13),
            &[2.0, 2.0, 2.0, 1.0],
            &[1.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        assert_eq!(pos, [3.0, 0.0, -2.0]);
        let n = read_normal(&mut s, ElementFormat::from_dxgi(37), w).unwrap();
        assert_eq!(n, [1.0, 0.0, 1.0]);
    }
}
