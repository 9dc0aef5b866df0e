//! `.modelbin` decoding: bundle blobs into [`RawMesh`] geometry.
//!
//! Parsing happens in two steps. [`ModelBin::parse`] walks the blob table and
//! decodes every structural blob (header, skeleton, layouts, buffers and
//! submeshes) without touching vertex data. [`ModelBin::decode_meshes`] then
//! reads the vertices and indices of every submesh on the requested LODs.

use std::fmt;

use itertools::Itertools;
use tracing::debug;

use crate::data::Version;
use crate::data::bundle::{Blob, BlobTag, Bundle, fourcc};
use crate::data::stream::BinaryStream;
use crate::error::{DecodeError, DecodeResult};
use crate::models::vertex_format::{
    self, ElementFormat, MAX_UV_SETS, Semantic, VertexLayout, element_size, parse_vertex_layout,
};
use crate::recognized::Recognized;

/// Number of LOD levels a submesh mask can address.
pub const LOD_COUNT: u8 = 8;

/// Render pass bit of the main (opaque/visible) pass.
pub const MAIN_RENDER_PASS: u16 = 0x10;

/// `Modl` blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelHeader {
    pub mesh_count: i16,
    pub buffer_count: i16,
    pub layout_count: i16,
    pub material_count: i16,
    pub lod_mask: u16,
    pub decompress_flags: Option<u8>,
}

impl ModelHeader {
    pub fn parse(blob: &Blob<'_>) -> DecodeResult<Self> {
        let mut s = blob.stream();
        let mesh_count = s.read_i16()?;
        let buffer_count = s.read_i16()?;
        let layout_count = s.read_i16()?;
        let material_count = s.read_i16()?;
        s.skip(4)?;
        let lod_mask = s.read_u16()?;
        let decompress_flags = if blob.version.is_at_least(1, 2) {
            Some(s.read_u8()?)
        } else {
            None
        };
        Ok(Self {
            mesh_count,
            buffer_count,
            layout_count,
            material_count,
            lod_mask,
            decompress_flags,
        })
    }
}

/// An `IndB` or `VerB` blob.
#[derive(Debug, Clone, Copy)]
pub struct ModelBuffer<'a> {
    /// Number of elements.
    pub length: u32,
    /// Size of the data in bytes.
    pub size: u32,
    pub stride: u16,
    pub format: Option<u32>,
    pub data: BinaryStream<'a>,
}

impl<'a> ModelBuffer<'a> {
    pub fn parse(blob: &Blob<'a>) -> DecodeResult<Self> {
        let stream = blob.stream();
        let mut s = stream;
        let length = s.read_u32()?;
        let size = s.read_u32()?;
        let stride = s.read_u16()?;
        s.skip(2)?;
        let (format, data_start) = if blob.version.is_at_least(1, 0) {
            (Some(s.read_u32()?), 0x10)
        } else {
            (None, 0x0C)
        };
        Ok(Self {
            length,
            size,
            stride,
            format,
            data: stream.sub_stream(data_start, size as usize)?,
        })
    }

    /// Element count actually backed by data.
    fn available_elements(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            (self.length as usize).min(self.data.len() / self.stride as usize)
        }
    }
}

/// A vertex buffer bound to one input slot of a submesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub buffer_id: i32,
    pub stride: i32,
    pub offset: i32,
}

/// Affine remap applied to one UV set: `u * u_scale + u_offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub u_offset: f32,
    pub u_scale: f32,
    pub v_offset: f32,
    pub v_scale: f32,
}

impl UvTransform {
    pub fn apply(&self, [u, v]: [f32; 2]) -> [f32; 2] {
        [u * self.u_scale + self.u_offset, v * self.v_scale + self.v_offset]
    }
}

/// A `Mesh` blob: one draw call of the model, present on one or more LODs.
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    pub name: String,
    pub material_id: i16,
    pub bone_index: i16,
    pub lod_mask: u16,
    pub render_pass: u16,
    pub index_buffer_id: i32,
    pub start_index: i32,
    pub base_vertex: i32,
    pub index_count: u32,
    pub layout_id: u32,
    /// Indexed by input slot.
    pub bindings: Vec<Option<VertexBinding>>,
    pub uv_transforms: [Option<UvTransform>; MAX_UV_SETS],
    pub scale: [f32; 4],
    pub translate: [f32; 4],
}

impl Submesh {
    pub fn parse(blob: &Blob<'_>) -> DecodeResult<Self> {
        let version = blob.version;
        let mut s = blob.stream();

        let mut material_id = s.read_i16()?;
        if version.is_at_least(1, 9) {
            material_id = s.read_i16()?;
            s.skip(4)?;
        }
        let bone_index = s.read_i16()?;
        let lod_mask = s.read_u16()?;
        s.skip(2)?;
        let render_pass = s.read_u16()?;
        s.skip(1)?;
        if version.is_at_least(1, 2) {
            s.skip(2)?;
        }
        if version.is_at_least(1, 3) {
            s.skip(1)?;
        }
        s.skip(3)?;

        let index_buffer_id = s.read_i32()?;
        s.skip(4)?;
        let start_index = s.read_i32()?;
        let base_vertex = s.read_i32()?;
        let index_count = s.read_u32()?;
        s.skip(4)?;
        if version.is_at_least(1, 6) {
            s.skip(8)?;
        }

        let layout_id = s.read_u32()?;
        let binding_count = s.read_u32()? as usize;
        let mut bindings = vec![None; binding_count.min(32)];
        for _ in 0..binding_count {
            let buffer_id = s.read_i32()?;
            let input_slot = s.read_i32()?;
            let stride = s.read_i32()?;
            let offset = s.read_i32()?;
            let slot = usize::try_from(input_slot)
                .ok()
                .filter(|slot| *slot < bindings.len())
                .ok_or(DecodeError::IndexOutOfRange {
                    what: "vertex input slot",
                    index: input_slot as i64,
                    count: bindings.len(),
                })?;
            bindings[slot] = Some(VertexBinding {
                buffer_id,
                stride,
                offset,
            });
        }

        if version.is_at_least(1, 4) {
            s.skip(8)?;
        }
        s.read_u32()?;
        if version.is_at_least(1, 1) {
            s.skip(4)?;
        }

        let mut uv_transforms = [None; MAX_UV_SETS];
        if version.is_at_least(1, 5) {
            for transform in &mut uv_transforms {
                *transform = Some(UvTransform {
                    u_offset: s.read_f32()?,
                    u_scale: s.read_f32()?,
                    v_offset: s.read_f32()?,
                    v_scale: s.read_f32()?,
                });
            }
        }

        let mut scale = [1.0; 4];
        let mut translate = [0.0; 4];
        if version.is_at_least(1, 8) {
            for v in &mut scale {
                *v = s.read_f32()?;
            }
            for v in &mut translate {
                *v = s.read_f32()?;
            }
        }

        Ok(Self {
            name: blob.name().unwrap_or_else(|| "Unnamed".to_string()),
            material_id,
            bone_index,
            lod_mask,
            render_pass,
            index_buffer_id,
            start_index,
            base_vertex,
            index_count,
            layout_id,
            bindings,
            uv_transforms,
            scale,
            translate,
        })
    }

    /// LODs this submesh is drawn on. A mask with no LOD bits set means LOD0.
    pub fn lods(&self) -> Vec<u8> {
        let lods = (0..LOD_COUNT)
            .filter(|lod| self.lod_mask & (1 << lod) != 0)
            .collect::<Vec<_>>();
        if lods.is_empty() { vec![0] } else { lods }
    }

    pub fn in_main_pass(&self) -> bool {
        self.render_pass & MAIN_RENDER_PASS != 0
    }
}

/// Row-major 4x4 transform applied to row vectors (`v * M`).
pub type Matrix4 = [[f32; 4]; 4];

pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

fn mul(a: &Matrix4, b: &Matrix4) -> Matrix4 {
    let mut out = [[0.0; 4]; 4];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    /// Model-space transform, already composed with the parent chain.
    pub transform: Matrix4,
}

impl Bone {
    fn transform_point(&self, p: [f32; 3]) -> [f32; 3] {
        let m = &self.transform;
        std::array::from_fn(|j| p[0] * m[0][j] + p[1] * m[1][j] + p[2] * m[2][j] + m[3][j])
    }

    fn transform_vector(&self, v: [f32; 3]) -> [f32; 3] {
        let m = &self.transform;
        std::array::from_fn(|j| v[0] * m[0][j] + v[1] * m[1][j] + v[2] * m[2][j])
    }
}

/// `Skel` blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn parse(blob: &Blob<'_>) -> DecodeResult<Self> {
        let mut s = blob.stream();
        let count = s.read_u16()? as usize;
        let mut bones: Vec<Bone> = Vec::with_capacity(count);
        for _ in 0..count {
            let name = s.read_string()?;
            let parent = s.read_i16()?;
            s.skip(4)?;
            let mut local = IDENTITY;
            for row in &mut local {
                for cell in row.iter_mut() {
                    *cell = s.read_f32()?;
                }
            }

            // parents always precede their children
            let parent = usize::try_from(parent).ok().filter(|p| *p < bones.len());
            let transform = match parent {
                Some(p) => mul(&local, &bones[p].transform),
                None => local,
            };
            bones.push(Bone {
                name,
                parent,
                transform,
            });
        }
        Ok(Self { bones })
    }
}

/// An embedded material instance (`MatI` blob). The record itself is
/// decoded by [`crate::models::materialbin`].
#[derive(Debug, Clone, Copy)]
pub struct MaterialSlot<'a> {
    pub slot: usize,
    pub data: BinaryStream<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UvLayer {
    /// Layout element name, e.g. `TEXCOORD0`.
    pub name: String,
    pub coords: Vec<[f32; 2]>,
}

/// Decoded geometry of one submesh on one LOD.
///
/// Positions, normals and tangents are in a Z-up right-handed frame; all
/// per-vertex arrays have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMesh {
    /// `"{submesh name} {material name}"`.
    pub name: String,
    pub lod: u8,
    pub material_slot: Option<usize>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uv_layers: Vec<UvLayer>,
    pub tangents: Option<Vec<[f32; 4]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub triangles: Vec<[u32; 3]>,
}

impl RawMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// The first UV set, if the layout has one.
    pub fn uvs(&self) -> Option<&[[f32; 2]]> {
        self.uv_layers.first().map(|l| l.coords.as_slice())
    }
}

/// Something the decoder recovered from, reported to the import log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeNote {
    UnknownChunk { tag: u32, length: usize },
    SkippedRenderPass { mesh: String, render_pass: u16 },
    EmptyMesh { mesh: String },
    UnboundElement { mesh: String, element: String },
    FallbackMesh,
}

impl fmt::Display for DecodeNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeNote::UnknownChunk { tag, length } => write!(
                f,
                "skipped unknown chunk '{}' (0x{tag:08X}, {length} bytes)",
                fourcc(*tag)
            ),
            DecodeNote::SkippedRenderPass { mesh, render_pass } => write!(
                f,
                "skipped mesh '{mesh}': render pass 0x{render_pass:X} is not the main pass"
            ),
            DecodeNote::EmptyMesh { mesh } => write!(f, "mesh '{mesh}' has no indices"),
            DecodeNote::UnboundElement { mesh, element } => write!(
                f,
                "mesh '{mesh}': vertex element {element} has no bound buffer"
            ),
            DecodeNote::FallbackMesh => f.write_str(
                "no LOD table entries; decoded the whole index buffer as a single LOD0 mesh",
            ),
        }
    }
}

/// Output of [`ModelBin::decode_meshes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMeshes {
    pub meshes: Vec<RawMesh>,
    pub notes: Vec<DecodeNote>,
}

/// A parsed `.modelbin` file, borrowing vertex and index data from the
/// input buffer.
#[derive(Debug, Clone)]
pub struct ModelBin<'a> {
    pub version: Version,
    pub header: ModelHeader,
    pub skeleton: Skeleton,
    pub layouts: Vec<VertexLayout>,
    pub index_buffer: Option<ModelBuffer<'a>>,
    /// Vertex buffers keyed by their `Id` metadata (-1 when absent).
    pub vertex_buffers: Vec<(i32, ModelBuffer<'a>)>,
    pub submeshes: Vec<Submesh>,
    /// Material names by slot, from the `Name` metadata of `MatI` blobs.
    pub material_names: Vec<Option<String>>,
    pub material_slots: Vec<MaterialSlot<'a>>,
    /// `(tag, declared length)` of every chunk that was skipped.
    pub unknown_chunks: Vec<(u32, usize)>,
}

impl<'a> ModelBin<'a> {
    pub fn parse(data: &'a [u8]) -> DecodeResult<Self> {
        let bundle = Bundle::parse(data)?;
        Self::from_bundle(&bundle)
    }

    pub fn from_bundle(bundle: &Bundle<'a>) -> DecodeResult<Self> {
        let header = bundle
            .first(BlobTag::Model)
            .ok_or(DecodeError::MissingBlob("Modl"))
            .and_then(ModelHeader::parse)?;

        let skeleton = match bundle.first(BlobTag::Skeleton) {
            Some(blob) => Skeleton::parse(blob)?,
            None => Skeleton::default(),
        };

        let layouts = bundle
            .blobs_of(BlobTag::VertexLayout)
            .map(|blob| parse_vertex_layout(&mut blob.stream()))
            .collect::<DecodeResult<Vec<_>>>()?;

        let index_buffer = bundle
            .first(BlobTag::IndexBuffer)
            .map(ModelBuffer::parse)
            .transpose()?;

        let vertex_buffers = bundle
            .blobs_of(BlobTag::VertexBuffer)
            .map(|blob| Ok((blob.id().unwrap_or(-1), ModelBuffer::parse(blob)?)))
            .collect::<DecodeResult<Vec<_>>>()?;

        let submeshes = bundle
            .blobs_of(BlobTag::Mesh)
            .map(Submesh::parse)
            .collect::<DecodeResult<Vec<_>>>()?;

        let material_count = usize::try_from(header.material_count).unwrap_or(0);
        let mut material_names = vec![None; material_count];
        let mut material_slots = Vec::new();
        for blob in bundle.blobs_of(BlobTag::MaterialInstance) {
            let slot = blob.id().unwrap_or(0);
            let Some(slot) = usize::try_from(slot).ok().filter(|s| *s < material_count) else {
                debug!("material instance id {slot} outside {material_count} slots");
                continue;
            };
            material_names[slot] = Some(blob.name().unwrap_or_else(|| "Material".to_string()));
            material_slots.push(MaterialSlot {
                slot,
                data: blob.stream(),
            });
        }

        let unknown_chunks = bundle.unknown_blobs().collect();

        Ok(Self {
            version: bundle.version,
            header,
            skeleton,
            layouts,
            index_buffer,
            vertex_buffers,
            submeshes,
            material_names,
            material_slots,
            unknown_chunks,
        })
    }

    pub fn material_name(&self, slot: usize) -> Option<&str> {
        self.material_names.get(slot)?.as_deref()
    }

    fn vertex_buffer(&self, id: i32) -> DecodeResult<&ModelBuffer<'a>> {
        self.vertex_buffers
            .iter()
            .find(|(buffer_id, _)| *buffer_id == id)
            .map(|(_, buffer)| buffer)
            .ok_or(DecodeError::IndexOutOfRange {
                what: "vertex buffer id",
                index: id as i64,
                count: self.vertex_buffers.len(),
            })
    }

    /// Decode every submesh on a LOD accepted by `wants_lod`, producing one
    /// [`RawMesh`] per (submesh, LOD) pair. A file without any `Mesh` blobs
    /// yields a single LOD0 mesh covering the whole index buffer.
    pub fn decode_meshes(&self, wants_lod: impl Fn(u8) -> bool) -> DecodeResult<DecodedMeshes> {
        let mut out = DecodedMeshes::default();
        out.notes.extend(
            self.unknown_chunks
                .iter()
                .map(|&(tag, length)| DecodeNote::UnknownChunk { tag, length }),
        );

        if self.submeshes.is_empty() {
            out.notes.push(DecodeNote::FallbackMesh);
            if wants_lod(0) {
                let submesh = self.fallback_submesh()?;
                let layout = self
                    .layouts
                    .first()
                    .cloned()
                    .unwrap_or_else(VertexLayout::position_only);
                if let Some(mesh) = self.decode_submesh(&submesh, &layout, 0, &mut out.notes)? {
                    out.meshes.push(mesh);
                }
            }
            return Ok(out);
        }

        for submesh in &self.submeshes {
            let lods = submesh
                .lods()
                .into_iter()
                .filter(|lod| wants_lod(*lod))
                .collect_vec();
            if lods.is_empty() {
                continue;
            }
            if !submesh.in_main_pass() {
                out.notes.push(DecodeNote::SkippedRenderPass {
                    mesh: submesh.name.clone(),
                    render_pass: submesh.render_pass,
                });
                continue;
            }

            let layout = self
                .layouts
                .get(submesh.layout_id as usize)
                .ok_or(DecodeError::IndexOutOfRange {
                    what: "vertex layout",
                    index: submesh.layout_id as i64,
                    count: self.layouts.len(),
                })?;

            let Some(mesh) = self.decode_submesh(submesh, layout, lods[0], &mut out.notes)? else {
                continue;
            };
            let copies = lods[1..]
                .iter()
                .map(|&lod| RawMesh {
                    lod,
                    ..mesh.clone()
                })
                .collect_vec();
            out.meshes.push(mesh);
            out.meshes.extend(copies);
        }

        Ok(out)
    }

    fn fallback_submesh(&self) -> DecodeResult<Submesh> {
        let index_buffer = self.index_buffer.ok_or(DecodeError::MissingBlob("IndB"))?;
        let (buffer_id, vertex_buffer) = self
            .vertex_buffers
            .first()
            .ok_or(DecodeError::MissingBlob("VerB"))?;
        Ok(Submesh {
            name: "Mesh".to_string(),
            material_id: 0,
            bone_index: 0,
            lod_mask: 1,
            render_pass: MAIN_RENDER_PASS,
            index_buffer_id: 0,
            start_index: 0,
            base_vertex: 0,
            index_count: index_buffer.available_elements() as u32,
            layout_id: 0,
            bindings: vec![Some(VertexBinding {
                buffer_id: *buffer_id,
                stride: vertex_buffer.stride as i32,
                offset: 0,
            })],
            uv_transforms: [None; MAX_UV_SETS],
            scale: [1.0; 4],
            translate: [0.0; 4],
        })
    }

    fn read_indices(&self, submesh: &Submesh) -> DecodeResult<Vec<u32>> {
        let buffer = self.index_buffer.ok_or(DecodeError::MissingBlob("IndB"))?;
        let stride = match buffer.stride {
            2 | 4 => buffer.stride as usize,
            other => return Err(DecodeError::UnsupportedIndexStride(other)),
        };

        let start = usize::try_from(submesh.start_index).map_err(|_| DecodeError::IndexOutOfRange {
            what: "start index",
            index: submesh.start_index as i64,
            count: buffer.length as usize,
        })?;
        let count = submesh.index_count as usize;
        if start + count > buffer.length as usize {
            return Err(DecodeError::IndexOutOfRange {
                what: "index range end",
                index: (start + count) as i64,
                count: buffer.length as usize,
            });
        }

        let mut s = buffer.data.sub_stream(start * stride, count * stride)?;
        (0..count)
            .map(|_| {
                if stride == 4 {
                    s.read_u32()
                } else {
                    s.read_u16().map(u32::from)
                }
            })
            .collect()
    }

    fn decode_submesh(
        &self,
        submesh: &Submesh,
        layout: &VertexLayout,
        lod: u8,
        notes: &mut Vec<DecodeNote>,
    ) -> DecodeResult<Option<RawMesh>> {
        let indices = self.read_indices(submesh)?;
        let (Some(&vmin), Some(&vmax)) = (indices.iter().min(), indices.iter().max()) else {
            notes.push(DecodeNote::EmptyMesh {
                mesh: submesh.name.clone(),
            });
            return Ok(None);
        };
        self.check_vertex_range(submesh, vmin, vmax, indices.len())?;
        let vertex_count = (vmax - vmin) as usize + 1;

        let triangles = indices
            .chunks_exact(3)
            .map(|t| [t[0] - vmin, t[2] - vmin, t[1] - vmin])
            .collect_vec();

        let elements = self.bind_elements(submesh, layout, vmin, notes)?;
        let find = |semantic: Semantic| elements.iter().find(|e| e.semantic == semantic);

        let bone = if self.skeleton.bones.is_empty() {
            None
        } else {
            let index = usize::try_from(submesh.bone_index)
                .ok()
                .filter(|i| *i < self.skeleton.bones.len())
                .ok_or(DecodeError::IndexOutOfRange {
                    what: "bone",
                    index: submesh.bone_index as i64,
                    count: self.skeleton.bones.len(),
                })?;
            Some(&self.skeleton.bones[index])
        };

        let position = find(Semantic::Position);
        let normal = find(Semantic::Normal);
        let tangent = find(Semantic::Tangent);
        let color = find(Semantic::Color);
        let uv_elements = (0..MAX_UV_SETS as u8)
            .filter_map(|i| find(Semantic::TexCoord(i)))
            .collect_vec();

        let mut positions = Vec::with_capacity(vertex_count);
        let mut normals = Vec::with_capacity(vertex_count);
        let mut tangents = tangent.map(|_| Vec::with_capacity(vertex_count));
        let mut colors = color.map(|_| Vec::with_capacity(vertex_count));
        let mut uv_layers = uv_elements
            .iter()
            .map(|e| UvLayer {
                name: e.key.clone(),
                coords: Vec::with_capacity(vertex_count),
            })
            .collect_vec();

        for local in 0..vertex_count {
            let (mut p, w) = match position {
                Some(e) => vertex_format::read_position(
                    &mut e.at(local)?,
                    e.format,
                    &submesh.scale,
                    &submesh.translate,
                )?,
                None => ([0.0; 3], 1.0),
            };
            let mut n = match normal {
                Some(e) => vertex_format::read_normal(&mut e.at(local)?, e.format, w)?,
                None => [0.0, 0.0, 1.0],
            };

            if let Some(bone) = bone {
                p = bone.transform_point(p);
                n = bone.transform_vector(n);
            }
            positions.push(to_z_up(p));
            normals.push(to_z_up(normalize(n)));

            if let (Some(e), Some(out)) = (tangent, tangents.as_mut()) {
                let t = vertex_format::read_tangent(&mut e.at(local)?, e.format)?;
                let mut xyz = [t[0], t[1], t[2]];
                if let Some(bone) = bone {
                    xyz = bone.transform_vector(xyz);
                }
                let [x, y, z] = to_z_up(normalize(xyz));
                out.push([x, y, z, t[3]]);
            }

            if let (Some(e), Some(out)) = (color, colors.as_mut()) {
                out.push(vertex_format::read_color(&mut e.at(local)?)?);
            }

            for (e, layer) in uv_elements.iter().zip(uv_layers.iter_mut()) {
                let mut uv = vertex_format::read_uv(&mut e.at(local)?)?;
                if let Semantic::TexCoord(set) = e.semantic
                    && let Some(transform) = submesh.uv_transforms[set as usize]
                {
                    uv = transform.apply(uv);
                }
                layer.coords.push([uv[0], 1.0 - uv[1]]);
            }
        }

        let name = match usize::try_from(submesh.material_id)
            .ok()
            .and_then(|slot| self.material_name(slot))
        {
            Some(material) => format!("{} {}", submesh.name, material),
            None => submesh.name.clone(),
        };
        let material_count = usize::try_from(self.header.material_count).unwrap_or(0);
        let material_slot = usize::try_from(submesh.material_id)
            .ok()
            .filter(|slot| *slot < material_count);

        Ok(Some(RawMesh {
            name,
            lod,
            material_slot,
            positions,
            normals,
            uv_layers,
            tangents,
            colors,
            triangles,
        }))
    }

    /// Reject indices reaching past the data of any bound vertex buffer.
    /// Without bindings no vertex can lie beyond the index count.
    fn check_vertex_range(
        &self,
        submesh: &Submesh,
        vmin: u32,
        vmax: u32,
        index_count: usize,
    ) -> DecodeResult<()> {
        let last = vmax as i64 + submesh.base_vertex as i64;
        let mut bound = false;
        for binding in submesh.bindings.iter().flatten() {
            let buffer = self.vertex_buffer(binding.buffer_id)?;
            bound = true;
            let count = buffer.available_elements();
            if last < 0 || last >= count as i64 {
                return Err(DecodeError::IndexOutOfRange {
                    what: "vertex",
                    index: last,
                    count,
                });
            }
        }
        if !bound && (vmax - vmin) as usize >= index_count {
            return Err(DecodeError::IndexOutOfRange {
                what: "vertex",
                index: vmax as i64,
                count: index_count,
            });
        }
        Ok(())
    }

    /// Locate every layout element inside its vertex buffer.
    fn bind_elements(
        &self,
        submesh: &Submesh,
        layout: &VertexLayout,
        vmin: u32,
        notes: &mut Vec<DecodeNote>,
    ) -> DecodeResult<Vec<BoundElement<'a>>> {
        let mut slot_offsets = vec![0usize; submesh.bindings.len()];
        let mut bound = Vec::with_capacity(layout.elements.len());

        for element in &layout.elements {
            let slot = element.input_slot as usize;
            let Some(binding) = submesh.bindings.get(slot).copied().flatten() else {
                notes.push(DecodeNote::UnboundElement {
                    mesh: submesh.name.clone(),
                    element: element.key.clone(),
                });
                continue;
            };
            let buffer = self.vertex_buffer(binding.buffer_id)?;
            let stride = buffer.stride as i64;
            let start = binding.offset as i64
                + (vmin as i64 + submesh.base_vertex as i64) * stride
                + slot_offsets[slot] as i64;
            let start = usize::try_from(start).map_err(|_| DecodeError::IndexOutOfRange {
                what: "vertex offset",
                index: start,
                count: buffer.data.len(),
            })?;
            slot_offsets[slot] += element_size(element.format);

            bound.push(BoundElement {
                key: element.key.clone(),
                semantic: element.semantic,
                format: element.format,
                buffer: buffer.data,
                start,
                stride: buffer.stride as usize,
            });
        }

        Ok(bound)
    }
}

/// A layout element resolved to a byte position inside a vertex buffer.
struct BoundElement<'a> {
    key: String,
    semantic: Semantic,
    format: Recognized<ElementFormat>,
    buffer: BinaryStream<'a>,
    start: usize,
    stride: usize,
}

impl<'a> BoundElement<'a> {
    fn at(&self, local_vertex: usize) -> DecodeResult<BinaryStream<'a>> {
        self.buffer.tail(self.start + local_vertex * self.stride)
    }
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        v
    }
}

/// Game space (Y-up) to Z-up right-handed.
fn to_z_up([x, y, z]: [f32; 3]) -> [f32; 3] {
    [-x, -z, y]
}

/// Convenience wrapper: parse and decode every LOD.
pub fn decode_modelbin(data: &[u8]) -> DecodeResult<DecodedMeshes> {
    ModelBin::parse(data)?.decode_meshes(|_| true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_bytes(version: (u8, u8), payload: &[u8]) -> Vec<u8> {
        // a single-blob bundle wrapping `payload`, no metadata
        let mut out = Vec::new();
        out.extend_from_slice(&crate::data::bundle::BUNDLE_MAGIC.to_le_bytes());
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&BlobTag::Mesh.raw().to_le_bytes());
        out.extend_from_slice(&[version.0, version.1]);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&40u32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(payload);
        out
    }

    fn mesh_v10(lod_mask: u16, render_pass: u16) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&2i16.to_le_bytes()); // material
        p.extend_from_slice(&0i16.to_le_bytes()); // bone
        p.extend_from_slice(&lod_mask.to_le_bytes());
        p.extend_from_slice(&[0; 2]);
        p.extend_from_slice(&render_pass.to_le_bytes());
        p.extend_from_slice(&[0; 4]);
        p.extend_from_slice(&0i32.to_le_bytes()); // index buffer
        p.extend_from_slice(&[0; 4]);
        p.extend_from_slice(&6i32.to_le_bytes()); // start index
        p.extend_from_slice(&10i32.to_le_bytes()); // base vertex
        p.extend_from_slice(&9u32.to_le_bytes()); // index count
        p.extend_from_slice(&[0; 4]);
        p.extend_from_slice(&1u32.to_le_bytes()); // layout
        p.extend_from_slice(&2u32.to_le_bytes()); // bindings
        for (id, slot, stride, offset) in [(0i32, 1i32, 8i32, 0i32), (1, 0, 20, 16)] {
            for v in [id, slot, stride, offset] {
                p.extend_from_slice(&v.to_le_bytes());
            }
        }
        p.extend_from_slice(&0u32.to_le_bytes());
        p
    }

    #[test]
    fn parses_v10_submesh() {
        let data = blob_bytes((1, 0), &mesh_v10(0b0101, 0x10));
        let bundle = Bundle::parse(&data).unwrap();
        let mesh = Submesh::parse(bundle.first(BlobTag::Mesh).unwrap()).unwrap();
        assert_eq!(mesh.name, "Unnamed");
        assert_eq!(mesh.material_id, 2);
        assert_eq!(mesh.start_index, 6);
        assert_eq!(mesh.base_vertex, 10);
        assert_eq!(mesh.index_count, 9);
        assert_eq!(mesh.layout_id, 1);
        assert_eq!(
            mesh.bindings[0],
            Some(VertexBinding {
                buffer_id: 1,
                stride: 20,
                offset: 16
            })
        );
        assert_eq!(mesh.bindings[1].map(|b| b.buffer_id), Some(0));
        assert_eq!(mesh.lods(), vec![0, 2]);
        assert!(mesh.in_main_pass());
        assert_eq!(mesh.scale, [1.0; 4]);
        assert!(mesh.uv_transforms.iter().all(Option::is_none));
    }

    #[test]
    fn empty_lod_mask_means_lod0() {
        let data = blob_bytes((1, 0), &mesh_v10(0, 0x13));
        let bundle = Bundle::parse(&data).unwrap();
        let mesh = Submesh::parse(bundle.first(BlobTag::Mesh).unwrap()).unwrap();
        assert_eq!(mesh.lods(), vec![0]);
    }

    #[test]
    fn truncated_submesh_fails() {
        let mut payload = mesh_v10(1, 0x10);
        payload.truncate(30);
        let data = blob_bytes((1, 0), &payload);
        let bundle = Bundle::parse(&data).unwrap();
        assert!(matches!(
            Submesh::parse(bundle.first(BlobTag::Mesh).unwrap()),
            Err(DecodeError::TruncatedData { .. })
        ));
    }

    #[test]
    fn skeleton_composes_parent_transforms() {
        let mut p = 2u16.to_le_bytes().to_vec();
        for (name, parent, tx) in [("root", -1i16, 1.0f32), ("child", 0, 2.0)] {
            p.extend_from_slice(&(name.len() as u32).to_le_bytes());
            p.extend_from_slice(name.as_bytes());
            p.extend_from_slice(&parent.to_le_bytes());
            p.extend_from_slice(&[0; 4]);
            let mut m = IDENTITY;
            m[3][0] = tx;
            for row in m {
                for v in row {
                    p.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        let mut data = blob_bytes((1, 0), &p);
        data[16..20].copy_from_slice(&BlobTag::Skeleton.raw().to_le_bytes());
        let bundle = Bundle::parse(&data).unwrap();
        let skeleton = Skeleton::parse(bundle.first(BlobTag::Skeleton).unwrap()).unwrap();
        assert_eq!(skeleton.bones.len(), 2);
        assert_eq!(skeleton.bones[1].parent, Some(0));
        assert_eq!(skeleton.bones[1].transform[3][0], 3.0);
        assert_eq!(skeleton.bones[1].transform_point([0.0, 0.0, 0.0]), [3.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_model_header() {
        let data = blob_bytes((1, 0), &mesh_v10(1, 0x10));
        assert!(matches!(
            ModelBin::parse(&data),
            Err(DecodeError::MissingBlob("Modl"))
        ));
    }

    #[test]
    fn coordinate_conversion() {
        assert_eq!(to_z_up([1.0, 2.0, 3.0]), [-1.0, -3.0, 2.0]);
        assert_eq!(normalize([0.0, 3.0, 4.0]), [0.0, 0.6, 0.8]);
    }
}
