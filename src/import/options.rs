use std::fmt;
use std::path::{Path, PathBuf};

use bon::Builder;
use thiserror::Error;

use crate::models::modelbin::LOD_COUNT;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("LOD {0} is out of range (expected 0-{max})", max = LOD_COUNT - 1)]
pub struct LodOutOfRange(pub u8);

/// A set of LOD levels, 0 (most detailed) through 7.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LodSelection(u8);

impl LodSelection {
    pub const LOD0: LodSelection = LodSelection(1);
    pub const ALL: LodSelection = LodSelection(u8::MAX);

    pub fn from_mask(mask: u8) -> Self {
        Self(mask)
    }

    pub fn from_lods(lods: impl IntoIterator<Item = u8>) -> Result<Self, LodOutOfRange> {
        lods.into_iter().try_fold(Self(0), |set, lod| {
            if lod < LOD_COUNT {
                Ok(Self(set.0 | 1 << lod))
            } else {
                Err(LodOutOfRange(lod))
            }
        })
    }

    pub fn contains(&self, lod: u8) -> bool {
        lod < LOD_COUNT && self.0 & (1 << lod) != 0
    }

    pub fn mask(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..LOD_COUNT).filter(|lod| self.contains(*lod))
    }
}

impl Default for LodSelection {
    fn default() -> Self {
        Self::LOD0
    }
}

impl fmt::Debug for LodSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl TryFrom<&[u8]> for LodSelection {
    type Error = LodOutOfRange;

    fn try_from(lods: &[u8]) -> Result<Self, Self::Error> {
        Self::from_lods(lods.iter().copied())
    }
}

/// Knobs of one import run.
#[derive(Builder, Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImportOptions {
    #[builder(default)]
    lods: LodSelection,
    /// Decode material instances and request materials from the sink.
    #[builder(default = true)]
    import_materials: bool,
    /// Name materials after their parent `.materialbin` file rather than
    /// their internal name.
    #[builder(default = true)]
    use_materialbin_names: bool,
    /// Fill unset texture channels from a folder named like the material.
    #[builder(default)]
    auto_assign_textures: bool,
    /// Directory substituted for the `Game:` prefix of virtual paths.
    #[builder(into)]
    media_root: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ImportOptions {
    pub fn lods(&self) -> LodSelection {
        self.lods
    }

    pub fn import_materials(&self) -> bool {
        self.import_materials
    }

    pub fn use_materialbin_names(&self) -> bool {
        self.use_materialbin_names
    }

    pub fn auto_assign_textures(&self) -> bool {
        self.auto_assign_textures
    }

    pub fn media_root(&self) -> Option<&Path> {
        self.media_root.as_deref()
    }
}
