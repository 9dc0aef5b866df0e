//! `.swatchbin` textures, rewrapped as DX10 DDS files.
//!
//! A swatchbin is a bundle whose `TXCB` blob holds the raw surface data and
//! whose `TXCH` metadata describes it. The surface bytes are already in a
//! block-compressed or plain DXGI layout, so conversion is just a header.

use crate::data::bundle::{BlobTag, Bundle, MetaTag};
use crate::error::{DecodeError, DecodeResult};

/// Size of the DDS magic, header and DX10 extension.
pub const DDS_HEADER_SIZE: usize = 148;

const DDS_MAGIC: &[u8; 4] = b"DDS ";
const DDSD_FLAGS: u32 = 0x000A_1007;
const DDSCAPS: u32 = 0x0040_1008;
const DDPF_FOURCC: u32 = 0x4;
const DIMENSION_TEXTURE2D: u32 = 3;

/// Fields of the `TXCH` texture header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwatchHeader {
    pub guid: [u8; 16],
    pub width: u32,
    pub height: u32,
    pub mip_count: u8,
    pub transcoding: u32,
    pub color_profile: u32,
    pub encoding: u32,
    pub linear_size: u32,
}

impl SwatchHeader {
    /// The engine's format code, taking transcoding into account.
    pub fn encoded_format(&self) -> u32 {
        if self.transcoding <= 1 {
            self.encoding
        } else {
            self.transcoding - 2
        }
    }

    /// DXGI format of the surface; 0 (`UNKNOWN`) for unmapped encodings.
    pub fn dxgi_format(&self) -> u32 {
        let srgb = self.color_profile != 0;
        match (self.encoded_format(), srgb) {
            (0, true) => 72,
            (0, false) => 71,
            (1, true) => 75,
            (1, false) => 74,
            (2, true) => 78,
            (2, false) => 77,
            (3, _) => 80,
            (4, _) => 81,
            (5, _) => 83,
            (6, _) => 84,
            (7, _) => 95,
            (8, _) => 96,
            (9, true) => 99,
            (9, false) => 98,
            (13, true) => 29,
            (13, false) => 28,
            _ => 0,
        }
    }

    /// GUID in registry form, `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`, with
    /// the first three groups stored little-endian.
    pub fn guid_string(&self) -> String {
        let g = &self.guid;
        format!(
            "{{{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            g[3], g[2], g[1], g[0], g[5], g[4], g[7], g[6], g[8], g[9], g[10], g[11], g[12],
            g[13], g[14], g[15]
        )
    }
}

/// A decoded swatchbin: header fields plus a complete DDS file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwatchTexture {
    pub header: SwatchHeader,
    pub dds: Vec<u8>,
}

impl SwatchTexture {
    pub fn guid(&self) -> String {
        self.header.guid_string()
    }
}

pub fn decode_swatchbin(data: &[u8]) -> DecodeResult<SwatchTexture> {
    let bundle = Bundle::parse(data)?;
    let blob = bundle
        .first(BlobTag::TextureContent)
        .ok_or(DecodeError::MissingBlob("TXCB"))?;
    let meta = blob
        .meta(MetaTag::TextureHeader)
        .ok_or(DecodeError::MissingBlob("TXCH"))?;

    let mut s = meta.data;
    s.skip(8)?;
    let guid = s.read_array::<16>()?;
    let width = s.read_u32()?;
    let height = s.read_u32()?;
    s.skip(6)?;
    let mip_count = s.read_u8()?;
    s.skip(1)?;
    let transcoding = s.read_u32()?;
    s.skip(4)?;
    let color_profile = s.read_u32()?;
    s.skip(12)?;
    let encoding = s.read_u32()?;
    s.skip(8)?;
    let linear_size = s.read_u32()?;

    let header = SwatchHeader {
        guid,
        width,
        height,
        mip_count,
        transcoding,
        color_profile,
        encoding,
        linear_size,
    };
    let dds = build_dds(&header, blob.data());
    Ok(SwatchTexture { header, dds })
}

fn build_dds(header: &SwatchHeader, surface: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; DDS_HEADER_SIZE];
    let mut put = |offset: usize, value: u32| {
        out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    };
    put(4, 124);
    put(8, DDSD_FLAGS);
    put(12, header.height);
    put(16, header.width);
    put(20, header.linear_size);
    put(24, 1);
    put(28, header.mip_count as u32);
    put(76, 32);
    put(80, DDPF_FOURCC);
    put(108, DDSCAPS);
    put(128, header.dxgi_format());
    put(132, DIMENSION_TEXTURE2D);
    put(140, 1);
    put(144, 3);
    out[0..4].copy_from_slice(DDS_MAGIC);
    out[84..88].copy_from_slice(b"DX10");
    out.extend_from_slice(surface);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(transcoding: u32, color_profile: u32, encoding: u32) -> SwatchHeader {
        SwatchHeader {
            guid: [
                0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xAA, 0xBB, 0xCC,
                0xDD, 0xEE, 0xFF,
            ],
            width: 256,
            height: 128,
            mip_count: 9,
            transcoding,
            color_profile,
            encoding,
            linear_size: 0x8000,
        }
    }

    #[test]
    fn format_mapping() {
        assert_eq!(header(0, 1, 0).dxgi_format(), 72);
        assert_eq!(header(1, 0, 0).dxgi_format(), 71);
        assert_eq!(header(0, 0, 13).dxgi_format(), 28);
        // transcoded: format comes from the transcoding field
        assert_eq!(header(5, 0, 0).dxgi_format(), 80);
        assert_eq!(header(0, 1, 9).dxgi_format(), 99);
        assert_eq!(header(0, 0, 12).dxgi_format(), 0);
    }

    #[test]
    fn guid_uses_mixed_endian_groups() {
        assert_eq!(
            header(0, 0, 0).guid_string(),
            "{00112233-4455-6677-8899-AABBCCDDEEFF}"
        );
    }

    #[test]
    fn dds_header_layout() {
        let h = header(0, 0, 5);
        let dds = build_dds(&h, &[0xAB; 10]);
        let u32_at = |o: usize| u32::from_le_bytes(dds[o..o + 4].try_into().unwrap());
        assert_eq!(dds.len(), DDS_HEADER_SIZE + 10);
        assert_eq!(&dds[0..4], b"DDS ");
        assert_eq!(u32_at(4), 124);
        assert_eq!(u32_at(12), 128);
        assert_eq!(u32_at(16), 256);
        assert_eq!(u32_at(28), 9);
        assert_eq!(&dds[84..88], b"DX10");
        assert_eq!(u32_at(128), 83);
        assert_eq!(u32_at(132), 3);
        assert_eq!(dds[DDS_HEADER_SIZE], 0xAB);
    }
}
