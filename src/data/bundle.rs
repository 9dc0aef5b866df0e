//! Parser for the "Grub" bundle container.
//!
//! Every Forza asset this crate reads (`.modelbin`, `.materialbin`,
//! `.swatchbin`, and the material instances embedded in modelbins) is a
//! bundle:
//! - A header with magic, version and blob count
//! - A table of 24-byte blob entries, each tagged with a FourCC and pointing
//!   at a data range and a metadata table
//! - Metadata entries (8 bytes each) whose payload sits at a small offset
//!   from the entry itself
//!
//! All offsets are relative to the start of the bundle buffer. Blobs with a
//! tag we do not know decode as [`Recognized::Unknown`] and are otherwise
//! ignored, so newer files with extra chunk types still load.

use std::fmt;

use crate::data::Version;
use crate::data::stream::BinaryStream;
use crate::error::{DecodeError, DecodeResult};
use crate::recognized::Recognized;

/// "Grub" read as a little-endian u32.
pub const BUNDLE_MAGIC: u32 = 0x4772_7562;

/// Size of one entry in the blob table.
pub const BLOB_ENTRY_SIZE: usize = 0x18;

/// Size of one entry in a blob's metadata table.
pub const METADATA_ENTRY_SIZE: usize = 0x08;

/// Render a tag as its four ASCII characters, most significant byte first.
pub fn fourcc(tag: u32) -> String {
    tag.to_be_bytes()
        .iter()
        .map(|b| {
            if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Blob (chunk) types understood by the decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobTag {
    /// `Modl`: model header with table sizes.
    Model,
    /// `Skel`: bone hierarchy.
    Skeleton,
    /// `MatI`: material instance embedded in a modelbin.
    MaterialInstance,
    /// `Mesh`: one submesh with its LOD mask and buffer bindings.
    Mesh,
    /// `VLay`: vertex layout.
    VertexLayout,
    /// `IndB`: index buffer.
    IndexBuffer,
    /// `VerB`: vertex buffer.
    VertexBuffer,
    /// `MATI`: reference to a parent material instance.
    ParentInstance,
    /// `MATL`: reference to a parent material (shader) definition.
    ParentMaterial,
    /// `MTPR`: shader parameter overrides.
    MaterialParameters,
    /// `DFPR`: default shader parameters.
    DefaultParameters,
    /// `TXCB`: texture content.
    TextureContent,
}

impl BlobTag {
    const ALL: [BlobTag; 12] = [
        BlobTag::Model,
        BlobTag::Skeleton,
        BlobTag::MaterialInstance,
        BlobTag::Mesh,
        BlobTag::VertexLayout,
        BlobTag::IndexBuffer,
        BlobTag::VertexBuffer,
        BlobTag::ParentInstance,
        BlobTag::ParentMaterial,
        BlobTag::MaterialParameters,
        BlobTag::DefaultParameters,
        BlobTag::TextureContent,
    ];

    pub const fn raw(self) -> u32 {
        match self {
            BlobTag::Model => 0x4D6F_646C,
            BlobTag::Skeleton => 0x536B_656C,
            BlobTag::MaterialInstance => 0x4D61_7449,
            BlobTag::Mesh => 0x4D65_7368,
            BlobTag::VertexLayout => 0x564C_6179,
            BlobTag::IndexBuffer => 0x496E_6442,
            BlobTag::VertexBuffer => 0x5665_7242,
            BlobTag::ParentInstance => 0x4D41_5449,
            BlobTag::ParentMaterial => 0x4D41_544C,
            BlobTag::MaterialParameters => 0x4D54_5052,
            BlobTag::DefaultParameters => 0x4446_5052,
            BlobTag::TextureContent => 0x5458_4342,
        }
    }

    pub fn from_raw(raw: u32) -> Recognized<BlobTag> {
        BlobTag::ALL
            .into_iter()
            .find(|tag| tag.raw() == raw)
            .map(Recognized::Known)
            .unwrap_or(Recognized::Unknown(raw))
    }
}

impl fmt::Display for BlobTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fourcc(self.raw()))
    }
}

/// Metadata entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaTag {
    /// `Name`: UTF-8 name filling the whole payload.
    Name,
    /// `Id  `: signed 32-bit identifier.
    Id,
    /// `TXCH`: texture header of a swatchbin.
    TextureHeader,
}

impl MetaTag {
    pub const fn raw(self) -> u32 {
        match self {
            MetaTag::Name => 0x4E61_6D65,
            MetaTag::Id => 0x4964_2020,
            MetaTag::TextureHeader => 0x5458_4348,
        }
    }

    pub fn from_raw(raw: u32) -> Recognized<MetaTag> {
        [MetaTag::Name, MetaTag::Id, MetaTag::TextureHeader]
            .into_iter()
            .find(|tag| tag.raw() == raw)
            .map(Recognized::Known)
            .unwrap_or(Recognized::Unknown(raw))
    }
}

#[derive(Debug, Clone)]
pub struct Metadata<'a> {
    pub tag: Recognized<MetaTag>,
    /// Low nibble of the packed version/size field.
    pub version: u8,
    pub data: BinaryStream<'a>,
}

impl Metadata<'_> {
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(self.data.as_slice())
            .trim_end_matches('\0')
            .to_string()
    }

    pub fn as_i32(&self) -> DecodeResult<i32> {
        let mut data = self.data;
        data.read_i32()
    }
}

#[derive(Debug, Clone)]
pub struct Blob<'a> {
    pub tag: Recognized<BlobTag>,
    pub version: Version,
    pub metadata: Vec<Metadata<'a>>,
    data: BinaryStream<'a>,
}

impl<'a> Blob<'a> {
    /// A fresh cursor over the blob's data range.
    pub fn stream(&self) -> BinaryStream<'a> {
        self.data
    }

    pub fn data(&self) -> &'a [u8] {
        self.data.as_slice()
    }

    /// Absolute offset of the blob's data within the file.
    pub fn data_offset(&self) -> usize {
        self.data.base()
    }

    pub fn meta(&self, tag: MetaTag) -> Option<&Metadata<'a>> {
        self.metadata.iter().find(|m| m.tag.is(&tag))
    }

    pub fn name(&self) -> Option<String> {
        self.meta(MetaTag::Name).map(Metadata::as_string)
    }

    pub fn id(&self) -> Option<i32> {
        self.meta(MetaTag::Id).and_then(|m| m.as_i32().ok())
    }
}

#[derive(Debug, Clone)]
pub struct Bundle<'a> {
    pub version: Version,
    pub blobs: Vec<Blob<'a>>,
}

impl<'a> Bundle<'a> {
    pub fn parse(data: &'a [u8]) -> DecodeResult<Bundle<'a>> {
        Self::parse_stream(BinaryStream::new(data))
    }

    /// Parse a bundle nested inside another file; offsets inside `stream`
    /// are relative to its start.
    pub fn parse_stream(stream: BinaryStream<'a>) -> DecodeResult<Bundle<'a>> {
        let mut header = stream;
        let magic = header.read_u32()?;
        if magic != BUNDLE_MAGIC {
            return Err(DecodeError::UnrecognizedFormat {
                offset: stream.base(),
                expected: BUNDLE_MAGIC,
                found: magic,
            });
        }
        let version = Version::read(&mut header)?;
        let mut blob_count = header.read_u16()? as usize;
        header.skip(8)?;
        if version.is_at_least(1, 1) {
            blob_count = header.read_u32()? as usize;
        }

        if blob_count.saturating_mul(BLOB_ENTRY_SIZE) > header.remaining() {
            return Err(DecodeError::TruncatedData {
                offset: header.absolute_offset(),
                need: blob_count.saturating_mul(BLOB_ENTRY_SIZE),
                available: header.remaining(),
            });
        }

        let mut blobs = Vec::with_capacity(blob_count);
        for _ in 0..blob_count {
            blobs.push(parse_blob(&stream, &mut header)?);
        }

        Ok(Bundle { version, blobs })
    }

    pub fn blobs_of(&self, tag: BlobTag) -> impl Iterator<Item = &Blob<'a>> {
        self.blobs.iter().filter(move |b| b.tag.is(&tag))
    }

    pub fn first(&self, tag: BlobTag) -> Option<&Blob<'a>> {
        self.blobs_of(tag).next()
    }

    /// The first blob carrying either tag, preferring `primary`.
    pub fn first_of(&self, primary: BlobTag, fallback: BlobTag) -> Option<&Blob<'a>> {
        self.first(primary).or_else(|| self.first(fallback))
    }

    /// `(raw tag, declared length)` of every blob with an unrecognized tag.
    pub fn unknown_blobs(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.blobs
            .iter()
            .filter_map(|b| b.tag.unknown().map(|raw| (*raw, b.data.len())))
    }
}

fn parse_blob<'a>(
    bundle: &BinaryStream<'a>,
    table: &mut BinaryStream<'a>,
) -> DecodeResult<Blob<'a>> {
    let tag = BlobTag::from_raw(table.read_u32()?);
    let version = Version::read(table)?;
    let metadata_count = table.read_u16()? as usize;
    let metadata_offset = table.read_u32()? as usize;
    let data_offset = table.read_u32()? as usize;
    let data_size = table.read_u32()? as usize;
    table.skip(4)?;

    let mut metadata = Vec::with_capacity(metadata_count.min(64));
    for i in 0..metadata_count {
        let entry_start = metadata_offset + i * METADATA_ENTRY_SIZE;
        let mut entry = bundle.sub_stream(entry_start, METADATA_ENTRY_SIZE)?;
        let meta_tag = MetaTag::from_raw(entry.read_u32()?);
        let version_and_size = entry.read_u16()?;
        let payload_offset = entry.read_u16()? as usize;
        let size = (version_and_size >> 4) as usize;
        metadata.push(Metadata {
            tag: meta_tag,
            version: (version_and_size & 0xF) as u8,
            data: bundle.sub_stream(entry_start + payload_offset, size)?,
        });
    }

    Ok(Blob {
        tag,
        version,
        metadata,
        data: bundle.sub_stream(data_offset, data_size)?,
    })
}
