//! The boundary between the importer and whatever builds scene objects.
//!
//! The importer never creates anything itself: it decodes, resolves and
//! classifies, then hands fully described requests to an [`ImportSink`].
//! Handles returned by the sink are opaque to the importer; material and
//! texture handles are cloned when shared between meshes and materials.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rootcause::Report;

use crate::classify::{TextureChannel, UsageTag};
use crate::log::LogEntry;
use crate::models::materialbin::ParamValue;
use crate::models::modelbin::RawMesh;
use crate::resolve::ResolutionMethod;

/// A texture channel bound to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolvedTexture {
    /// Texture slot (parameter) name, or `auto` for folder matches.
    pub slot_name: String,
    pub channel: TextureChannel,
    pub path: PathBuf,
    pub method: ResolutionMethod,
}

/// Texel source for a [`TextureRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureData {
    /// A regular image file; the sink reads it from `path`.
    File,
    /// A swatchbin converted to an in-memory DDS file.
    Dds { guid: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct TextureRequest<'a> {
    pub path: &'a Path,
    /// Suggested image name.
    pub name: String,
    pub data: TextureData,
    /// Texels are data (normals, masks), not colour.
    pub non_color: bool,
}

#[derive(Debug, Clone)]
pub struct ChannelAssignment<T> {
    pub texture: T,
    pub resolved: ResolvedTexture,
}

impl<T> ChannelAssignment<T> {
    pub fn channel(&self) -> TextureChannel {
        self.resolved.channel
    }
}

#[derive(Debug, Clone)]
pub struct MaterialRequest<T> {
    /// Name the material is created under; unique within a run.
    pub name: String,
    /// Name stored inside the model file.
    pub internal_name: String,
    pub source_file: Option<String>,
    pub usage: UsageTag,
    /// Custom properties to persist on the material (`forza_usage`).
    pub properties: IndexMap<String, String>,
    pub base_color: Option<[f32; 4]>,
    /// At most one entry per channel.
    pub textures: Vec<ChannelAssignment<T>>,
    /// UV scale for tiled materials.
    pub uv_tiling: Option<[f32; 2]>,
    pub parameters: IndexMap<String, ParamValue>,
}

impl<T> MaterialRequest<T> {
    pub fn texture(&self, channel: TextureChannel) -> Option<&ChannelAssignment<T>> {
        self.textures.iter().find(|t| t.channel() == channel)
    }
}

#[derive(Debug)]
pub struct MeshRequest<'a, M> {
    /// Object name, `"{mesh} {material} LOD{n}"`.
    pub name: &'a str,
    pub mesh: &'a RawMesh,
    pub material: Option<&'a M>,
}

pub trait ImportSink {
    type Mesh;
    type Material: Clone;
    type Texture: Clone;

    fn create_mesh(
        &mut self,
        request: MeshRequest<'_, Self::Material>,
    ) -> Result<Self::Mesh, Report>;

    fn create_material(
        &mut self,
        request: MaterialRequest<Self::Texture>,
    ) -> Result<Self::Material, Report>;

    /// Load an image. Called at most once per distinct file per run.
    fn load_texture(&mut self, request: TextureRequest<'_>) -> Result<Self::Texture, Report>;

    /// Receives every log entry of the run, in order.
    fn append_log(&mut self, _entry: &LogEntry) {}
}
