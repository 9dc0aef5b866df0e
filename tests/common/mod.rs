//! Synthetic car folders: a byte-level bundle writer plus a sink that
//! records every request.
#![allow(dead_code)]

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use forzabin::classify::{TextureChannel, UsageTag};
use forzabin::data::bundle::{BUNDLE_MAGIC, BlobTag, MetaTag};
use forzabin::import::{ImportSink, MaterialRequest, MeshRequest, TextureData, TextureRequest};
use forzabin::log::LogEntry;
use forzabin::models::materialbin::{DIFFUSE_COLOR_HASH, DIFFUSE_MAP_HASH, NORMAL_MAP_HASH};
use rootcause::Report;

struct BlobSpec {
    tag: u32,
    version: [u8; 2],
    metadata: Vec<(u32, Vec<u8>)>,
    data: Vec<u8>,
}

/// Builds a v1.0 "Grub" bundle: header, blob table, metadata tables,
/// metadata payloads and blob data, in that order.
#[derive(Default)]
pub struct BundleWriter {
    blobs: Vec<BlobSpec>,
}

impl BundleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob(mut self, tag: u32, version: (u8, u8), data: Vec<u8>) -> Self {
        self.blobs.push(BlobSpec {
            tag,
            version: [version.0, version.1],
            metadata: Vec::new(),
            data,
        });
        self
    }

    /// Attach a metadata entry to the last blob.
    pub fn meta(mut self, tag: u32, payload: Vec<u8>) -> Self {
        if let Some(blob) = self.blobs.last_mut() {
            blob.metadata.push((tag, payload));
        }
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.meta(MetaTag::Name.raw(), name.as_bytes().to_vec())
    }

    pub fn id(self, id: i32) -> Self {
        self.meta(MetaTag::Id.raw(), id.to_le_bytes().to_vec())
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pos = 16 + 24 * self.blobs.len();
        let mut meta_tables = Vec::new();
        for blob in &self.blobs {
            meta_tables.push(pos);
            pos += 8 * blob.metadata.len();
        }
        let mut meta_payloads = Vec::new();
        for blob in &self.blobs {
            let mut offsets = Vec::new();
            for (_, payload) in &blob.metadata {
                offsets.push(pos);
                pos += payload.len();
            }
            meta_payloads.push(offsets);
        }
        let mut data_offsets = Vec::new();
        for blob in &self.blobs {
            data_offsets.push(pos);
            pos += blob.data.len();
        }

        let mut out = Vec::with_capacity(pos);
        out.extend_from_slice(&BUNDLE_MAGIC.to_le_bytes());
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(self.blobs.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0; 8]);
        for (i, blob) in self.blobs.iter().enumerate() {
            out.extend_from_slice(&blob.tag.to_le_bytes());
            out.extend_from_slice(&blob.version);
            out.extend_from_slice(&(blob.metadata.len() as u16).to_le_bytes());
            out.extend_from_slice(&(meta_tables[i] as u32).to_le_bytes());
            out.extend_from_slice(&(data_offsets[i] as u32).to_le_bytes());
            out.extend_from_slice(&(blob.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&[0; 4]);
        }
        for (i, blob) in self.blobs.iter().enumerate() {
            for (j, (tag, payload)) in blob.metadata.iter().enumerate() {
                let entry = meta_tables[i] + 8 * j;
                out.extend_from_slice(&tag.to_le_bytes());
                out.extend_from_slice(&((payload.len() as u16) << 4).to_le_bytes());
                out.extend_from_slice(&((meta_payloads[i][j] - entry) as u16).to_le_bytes());
            }
        }
        for blob in &self.blobs {
            for (_, payload) in &blob.metadata {
                out.extend_from_slice(payload);
            }
        }
        for blob in &self.blobs {
            out.extend_from_slice(&blob.data);
        }
        out
    }
}

/// Tag value for a four-character code written most significant byte first.
pub fn tag(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

fn string_7bit(value: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut len = value.len();
    loop {
        let byte = (len & 0x7F) as u8;
        len >>= 7;
        if len == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out.extend_from_slice(value.as_bytes());
    out
}

/// Shader parameters of a material bundle.
pub enum Param<'a> {
    Texture(u32, &'a str),
    Color(u32, [f32; 4]),
    /// Only a hash and a type byte, no payload.
    Untyped(u32, u8),
}

pub fn diffuse_map(path: &str) -> Param<'_> {
    Param::Texture(DIFFUSE_MAP_HASH, path)
}

pub fn normal_map(path: &str) -> Param<'_> {
    Param::Texture(NORMAL_MAP_HASH, path)
}

pub fn diffuse_color(rgba: [f32; 4]) -> Param<'static> {
    Param::Color(DIFFUSE_COLOR_HASH, rgba)
}

/// A material bundle (`.materialbin` or `MatI` payload).
pub fn material_bundle(parent: Option<&str>, params: &[Param<'_>]) -> Vec<u8> {
    let mut writer = BundleWriter::new();
    if let Some(parent) = parent {
        writer = writer.blob(BlobTag::ParentInstance.raw(), (1, 0), string_7bit(parent));
    }
    let mut table = vec![params.len() as u8];
    for param in params {
        table.extend_from_slice(&[2, 0]);
        match param {
            Param::Texture(hash, path) => {
                table.extend_from_slice(&hash.to_le_bytes());
                table.push(6);
                table.extend_from_slice(&string_7bit(path));
                table.extend_from_slice(&[0; 4]);
            }
            Param::Color(hash, rgba) => {
                table.extend_from_slice(&hash.to_le_bytes());
                table.push(1);
                for c in rgba {
                    table.extend_from_slice(&c.to_le_bytes());
                }
            }
            Param::Untyped(hash, ty) => {
                table.extend_from_slice(&hash.to_le_bytes());
                table.push(*ty);
            }
        }
    }
    writer
        .blob(BlobTag::MaterialParameters.raw(), (2, 0), table)
        .build()
}

/// A submesh of a [`ModelSpec`]: one triangle on the shared buffers.
pub struct SubmeshSpec<'a> {
    pub name: &'a str,
    pub material: i16,
    pub lod_mask: u16,
    pub render_pass: u16,
}

impl<'a> SubmeshSpec<'a> {
    pub fn new(name: &'a str, material: i16) -> Self {
        Self {
            name,
            material,
            lod_mask: 0b1,
            render_pass: 0x10,
        }
    }
}

/// Everything a synthetic `.modelbin` contains.
#[derive(Default)]
pub struct ModelSpec<'a> {
    pub submeshes: Vec<SubmeshSpec<'a>>,
    /// `(name, material bundle)` per material slot.
    pub materials: Vec<(&'a str, Vec<u8>)>,
    /// Extra blobs with unknown tags.
    pub unknown_chunks: Vec<(u32, Vec<u8>)>,
    /// Index buffer contents; empty means the triangle `[0, 1, 2]`.
    pub indices: Vec<u16>,
}

/// Position (f32 x3), normal (f16 x4) and UV (unorm16 x2): 24 bytes.
pub const VERTEX_STRIDE: u16 = 24;

fn layout_blob() -> Vec<u8> {
    let mut p = Vec::new();
    let names = ["POSITION", "NORMAL", "TEXCOORD"];
    p.extend_from_slice(&(names.len() as u16).to_le_bytes());
    for name in names {
        p.extend_from_slice(&(name.len() as u32).to_le_bytes());
        p.extend_from_slice(name.as_bytes());
    }
    let elements = [(0u16, 6u32), (1, 10), (2, 35)];
    p.extend_from_slice(&(elements.len() as u16).to_le_bytes());
    for (name_index, format) in elements {
        p.extend_from_slice(&name_index.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&[0; 2]);
        p.extend_from_slice(&format.to_le_bytes());
        p.extend_from_slice(&[0; 8]);
    }
    p
}

fn buffer_blob(length: u32, stride: u16, data: &[u8]) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&length.to_le_bytes());
    p.extend_from_slice(&(data.len() as u32).to_le_bytes());
    p.extend_from_slice(&stride.to_le_bytes());
    p.extend_from_slice(&[0; 2]);
    p.extend_from_slice(&0u32.to_le_bytes());
    p.extend_from_slice(data);
    p
}

fn vertex_data() -> Vec<u8> {
    let vertices = [
        ([0.0f32, 0.0, 0.0], [0u16, 0]),
        ([1.0, 0.0, 0.0], [u16::MAX, 0]),
        ([0.0, 1.0, 0.0], [0, u16::MAX]),
    ];
    let mut out = Vec::new();
    for (position, uv) in vertices {
        for v in position {
            out.extend_from_slice(&v.to_le_bytes());
        }
        // normal (0, 1, 0) as f16, w = 0
        for bits in [0u16, 0x3C00, 0, 0] {
            out.extend_from_slice(&bits.to_le_bytes());
        }
        for v in uv {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

fn mesh_blob(spec: &SubmeshSpec<'_>) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&spec.material.to_le_bytes());
    p.extend_from_slice(&0i16.to_le_bytes());
    p.extend_from_slice(&spec.lod_mask.to_le_bytes());
    p.extend_from_slice(&[0; 2]);
    p.extend_from_slice(&spec.render_pass.to_le_bytes());
    p.extend_from_slice(&[0; 4]);
    p.extend_from_slice(&0i32.to_le_bytes()); // index buffer
    p.extend_from_slice(&[0; 4]);
    p.extend_from_slice(&0i32.to_le_bytes()); // start index
    p.extend_from_slice(&0i32.to_le_bytes()); // base vertex
    p.extend_from_slice(&3u32.to_le_bytes()); // index count
    p.extend_from_slice(&[0; 4]);
    p.extend_from_slice(&0u32.to_le_bytes()); // layout
    p.extend_from_slice(&1u32.to_le_bytes()); // bindings
    for v in [0i32, 0, VERTEX_STRIDE as i32, 0] {
        p.extend_from_slice(&v.to_le_bytes());
    }
    p.extend_from_slice(&0u32.to_le_bytes());
    p
}

/// Serialize a modelbin. Without submeshes the file still carries the
/// buffers, which decode through the whole-buffer fallback.
pub fn modelbin(spec: &ModelSpec<'_>) -> Vec<u8> {
    let mut header = Vec::new();
    for count in [
        spec.submeshes.len() as i16,
        2,
        1,
        spec.materials.len() as i16,
    ] {
        header.extend_from_slice(&count.to_le_bytes());
    }
    header.extend_from_slice(&[0; 4]);
    header.extend_from_slice(&1u16.to_le_bytes());

    let mut writer = BundleWriter::new()
        .blob(BlobTag::Model.raw(), (1, 0), header)
        .blob(BlobTag::VertexLayout.raw(), (1, 0), layout_blob());

    for (unknown, payload) in &spec.unknown_chunks {
        writer = writer.blob(*unknown, (1, 0), payload.clone());
    }

    let indices: &[u16] = if spec.indices.is_empty() {
        &[0, 1, 2]
    } else {
        &spec.indices
    };
    let index_bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
    writer = writer
        .blob(
            BlobTag::IndexBuffer.raw(),
            (1, 0),
            buffer_blob(indices.len() as u32, 2, &index_bytes),
        )
        .blob(
            BlobTag::VertexBuffer.raw(),
            (1, 0),
            buffer_blob(3, VERTEX_STRIDE, &vertex_data()),
        )
        .id(0);

    for (slot, (name, bundle)) in spec.materials.iter().enumerate() {
        writer = writer
            .blob(BlobTag::MaterialInstance.raw(), (1, 0), bundle.clone())
            .name(name)
            .id(slot as i32);
    }

    for submesh in &spec.submeshes {
        writer = writer
            .blob(BlobTag::Mesh.raw(), (1, 0), mesh_blob(submesh))
            .name(submesh.name);
    }

    writer.build()
}

/// A swatchbin with an 8x8 BC1 surface.
pub fn swatchbin(guid: [u8; 16]) -> Vec<u8> {
    let mut header = vec![0u8; 8];
    header.extend_from_slice(&guid);
    header.extend_from_slice(&8u32.to_le_bytes());
    header.extend_from_slice(&8u32.to_le_bytes());
    header.extend_from_slice(&[0; 6]);
    header.push(1); // mips
    header.push(0);
    header.extend_from_slice(&0u32.to_le_bytes()); // transcoding
    header.extend_from_slice(&[0; 4]);
    header.extend_from_slice(&1u32.to_le_bytes()); // sRGB
    header.extend_from_slice(&[0; 12]);
    header.extend_from_slice(&0u32.to_le_bytes()); // encoding BC1
    header.extend_from_slice(&[0; 8]);
    header.extend_from_slice(&32u32.to_le_bytes());

    BundleWriter::new()
        .blob(BlobTag::TextureContent.raw(), (1, 0), vec![0; 32])
        .meta(MetaTag::TextureHeader.raw(), header)
        .build()
}

pub fn write(root: &Path, relative: &str, data: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, data).unwrap();
    path
}

#[derive(Debug)]
pub struct RecordedTexture {
    pub path: PathBuf,
    pub name: String,
    pub guid: Option<String>,
    pub non_color: bool,
}

#[derive(Debug)]
pub struct RecordedMaterial {
    pub name: String,
    pub internal_name: String,
    pub usage: UsageTag,
    pub usage_property: Option<String>,
    pub base_color: Option<[f32; 4]>,
    pub uv_tiling: Option<[f32; 2]>,
    pub textures: Vec<(TextureChannel, Rc<RecordedTexture>)>,
}

impl RecordedMaterial {
    pub fn texture(&self, channel: TextureChannel) -> Option<&Rc<RecordedTexture>> {
        self.textures
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, t)| t)
    }
}

#[derive(Debug)]
pub struct RecordedMesh {
    pub name: String,
    pub lod: u8,
    pub vertex_count: usize,
    pub triangles: Vec<[u32; 3]>,
    pub material: Option<Rc<RecordedMaterial>>,
}

/// Sink that keeps every created object, with `Rc` handles so tests can
/// check identity.
#[derive(Default)]
pub struct RecordingSink {
    pub meshes: Vec<RecordedMesh>,
    pub materials: Vec<Rc<RecordedMaterial>>,
    pub textures: Vec<Rc<RecordedTexture>>,
    pub log: Vec<LogEntry>,
    pub texture_loads: Cell<usize>,
    /// Fail every texture load whose file name contains this string.
    pub fail_textures_named: Option<String>,
}

impl ImportSink for RecordingSink {
    type Mesh = ();
    type Material = Rc<RecordedMaterial>;
    type Texture = Rc<RecordedTexture>;

    fn create_mesh(&mut self, request: MeshRequest<'_, Self::Material>) -> Result<(), Report> {
        self.meshes.push(RecordedMesh {
            name: request.name.to_string(),
            lod: request.mesh.lod,
            vertex_count: request.mesh.vertex_count(),
            triangles: request.mesh.triangles.clone(),
            material: request.material.cloned(),
        });
        Ok(())
    }

    fn create_material(
        &mut self,
        request: MaterialRequest<Self::Texture>,
    ) -> Result<Self::Material, Report> {
        let material = Rc::new(RecordedMaterial {
            usage_property: request.properties.get("forza_usage").cloned(),
            name: request.name,
            internal_name: request.internal_name,
            usage: request.usage,
            base_color: request.base_color,
            uv_tiling: request.uv_tiling,
            textures: request
                .textures
                .iter()
                .map(|t| (t.channel(), t.texture.clone()))
                .collect(),
        });
        self.materials.push(material.clone());
        Ok(material)
    }

    fn load_texture(&mut self, request: TextureRequest<'_>) -> Result<Self::Texture, Report> {
        self.texture_loads.set(self.texture_loads.get() + 1);
        if let Some(needle) = &self.fail_textures_named
            && request.path.to_string_lossy().contains(needle.as_str())
        {
            return Err(rootcause::report!("corrupt image"));
        }
        let texture = Rc::new(RecordedTexture {
            path: request.path.to_path_buf(),
            name: request.name,
            guid: match request.data {
                TextureData::Dds { guid, .. } => Some(guid),
                TextureData::File => None,
            },
            non_color: request.non_color,
        });
        self.textures.push(texture.clone());
        Ok(texture)
    }

    fn append_log(&mut self, entry: &LogEntry) {
        self.log.push(entry.clone());
    }
}
