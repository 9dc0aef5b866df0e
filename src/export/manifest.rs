//! An [`ImportSink`] that records what an import would create as a JSON
//! manifest, for inspecting car folders without a 3D host.

use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rootcause::Report;
use serde::Serialize;

use crate::classify::{TextureChannel, UsageTag};
use crate::import::{
    ImportSink, ImportSummary, MaterialRequest, MeshRequest, TextureData, TextureRequest,
};
use crate::log::LogEntry;
use crate::models::materialbin::ParamValue;
use crate::resolve::ResolutionMethod;

#[derive(Debug, Clone, Serialize)]
pub struct MeshEntry {
    pub name: String,
    pub lod: u8,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub uv_layers: Vec<String>,
    pub has_tangents: bool,
    pub has_colors: bool,
    /// Index into [`Manifest::materials`].
    pub material: Option<usize>,
    /// Axis-aligned `[min, max]` of the positions.
    pub bounds: Option<[[f32; 3]; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialTexture {
    pub channel: TextureChannel,
    pub slot_name: String,
    /// Index into [`Manifest::textures`].
    pub texture: usize,
    pub method: ResolutionMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialEntry {
    pub name: String,
    pub internal_name: String,
    pub source_file: Option<String>,
    pub usage: UsageTag,
    pub properties: IndexMap<String, String>,
    pub base_color: Option<[f32; 4]>,
    pub uv_tiling: Option<[f32; 2]>,
    pub textures: Vec<MaterialTexture>,
    pub parameters: IndexMap<String, ParamValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextureEntry {
    pub name: String,
    pub path: PathBuf,
    pub guid: Option<String>,
    pub non_color: bool,
    /// PNG written for swatchbin textures when extraction is enabled.
    pub extracted: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    pub summary: Option<ImportSummary>,
    pub meshes: Vec<MeshEntry>,
    pub materials: Vec<MaterialEntry>,
    pub textures: Vec<TextureEntry>,
    pub log: Vec<LogEntry>,
}

impl Manifest {
    pub fn write_json(&self, writer: impl Write) -> Result<(), Report> {
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| rootcause::report!("failed to write manifest: {e}"))
    }
}

/// Sink whose handles are indices into a [`Manifest`].
#[derive(Debug, Default)]
pub struct ManifestSink {
    manifest: Manifest,
    texture_dir: Option<PathBuf>,
}

impl ManifestSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also convert swatchbin textures to PNG files in `dir`.
    #[cfg(feature = "textures")]
    pub fn extract_textures_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_dir = Some(dir.into());
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn finish(mut self, summary: ImportSummary) -> Manifest {
        self.manifest.summary = Some(summary);
        self.manifest
    }

    fn extract(&self, name: &str, data: &TextureData) -> Result<Option<PathBuf>, Report> {
        let (Some(dir), TextureData::Dds { bytes, .. }) = (&self.texture_dir, data) else {
            return Ok(None);
        };
        let out = dir.join(format!("{}.png", sanitize_file_name(name)));
        write_png(bytes, &out)?;
        Ok(Some(out))
    }
}

#[cfg(feature = "textures")]
fn write_png(dds: &[u8], out: &Path) -> Result<(), Report> {
    super::texture::write_dds_as_png(dds, out).map_err(|e| rootcause::report!("{e}"))
}

#[cfg(not(feature = "textures"))]
fn write_png(_dds: &[u8], out: &Path) -> Result<(), Report> {
    Err(rootcause::report!(
        "cannot write '{}': built without texture support",
        out.display()
    ))
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn bounds(positions: &[[f32; 3]]) -> Option<[[f32; 3]; 2]> {
    let (first, rest) = positions.split_first()?;
    Some(rest.iter().fold([*first, *first], |[mut lo, mut hi], p| {
        for axis in 0..3 {
            lo[axis] = lo[axis].min(p[axis]);
            hi[axis] = hi[axis].max(p[axis]);
        }
        [lo, hi]
    }))
}

impl ImportSink for ManifestSink {
    type Mesh = usize;
    type Material = usize;
    type Texture = usize;

    fn create_mesh(&mut self, request: MeshRequest<'_, usize>) -> Result<usize, Report> {
        let mesh = request.mesh;
        self.manifest.meshes.push(MeshEntry {
            name: request.name.to_string(),
            lod: mesh.lod,
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangles.len(),
            uv_layers: mesh.uv_layers.iter().map(|l| l.name.clone()).collect(),
            has_tangents: mesh.tangents.is_some(),
            has_colors: mesh.colors.is_some(),
            material: request.material.copied(),
            bounds: bounds(&mesh.positions),
        });
        Ok(self.manifest.meshes.len() - 1)
    }

    fn create_material(&mut self, request: MaterialRequest<usize>) -> Result<usize, Report> {
        let textures = request
            .textures
            .iter()
            .map(|t| MaterialTexture {
                channel: t.channel(),
                slot_name: t.resolved.slot_name.clone(),
                texture: t.texture,
                method: t.resolved.method,
            })
            .collect();
        self.manifest.materials.push(MaterialEntry {
            name: request.name,
            internal_name: request.internal_name,
            source_file: request.source_file,
            usage: request.usage,
            properties: request.properties,
            base_color: request.base_color,
            uv_tiling: request.uv_tiling,
            textures,
            parameters: request.parameters,
        });
        Ok(self.manifest.materials.len() - 1)
    }

    fn load_texture(&mut self, request: TextureRequest<'_>) -> Result<usize, Report> {
        let extracted = self.extract(&request.name, &request.data)?;
        let guid = match request.data {
            TextureData::Dds { guid, .. } => Some(guid),
            TextureData::File => None,
        };
        self.manifest.textures.push(TextureEntry {
            name: request.name,
            path: request.path.to_path_buf(),
            guid,
            non_color: request.non_color,
            extracted,
        });
        Ok(self.manifest.textures.len() - 1)
    }

    fn append_log(&mut self, entry: &LogEntry) {
        self.manifest.log.push(entry.clone());
    }
}
