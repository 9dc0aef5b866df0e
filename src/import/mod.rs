//! Car folder import: discovery, decoding, resolution and sink requests.
//!
//! [`import_car_folder`] is the entry point. It walks the folder for
//! `.modelbin` files and imports each one in isolation: a file that fails to
//! read or decode is logged and counted, and the run moves on. Materials are
//! created once per name and textures loaded once per file for the whole run.

/// Texture handle cache
pub mod cache;
/// Run configuration
pub mod options;
/// Host-facing sink interface
pub mod sink;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rootcause::Report;
use thiserror::Error;

use crate::classify::texture::TextureChannel;
use crate::classify::tiling::{USAGE_PROPERTY, match_usage};
use crate::classify::classify_texture_file;
use crate::error::{DecodeError, ImportError};
use crate::log::{ImportLog, LogLevel};
use crate::models::materialbin::{
    DEFAULT_MATERIAL_NAME, MaterialRecord, file_stem, parse_materialbin,
};
use crate::models::modelbin::{DecodeNote, ModelBin};
use crate::models::swatchbin::decode_swatchbin;
use crate::resolve::{PathResolver, ResolutionMethod, walk_sorted};

pub use cache::{CacheMiss, TextureCache};
pub use options::{ImportOptions, LodOutOfRange, LodSelection};
pub use sink::{
    ChannelAssignment, ImportSink, MaterialRequest, MeshRequest, ResolvedTexture, TextureData,
    TextureRequest,
};

/// Parent material chains deeper than this are cut off.
pub const MAX_PARENT_DEPTH: usize = 8;

/// Directory depth searched for `.modelbin` files.
pub const MAX_DISCOVERY_DEPTH: usize = 32;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportSummary {
    pub files_found: usize,
    pub files_failed: usize,
    pub meshes_created: usize,
    pub materials_created: usize,
    pub textures_resolved: usize,
    pub textures_missing: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} modelbin file(s) found ({} failed), {} mesh(es), {} material(s), {} texture(s) resolved, {} missing",
            self.files_found,
            self.files_failed,
            self.meshes_created,
            self.materials_created,
            self.textures_resolved,
            self.textures_missing
        )
    }
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    pub log: ImportLog,
}

/// Per-file failure; logged, never returned from a run.
#[derive(Error, Debug)]
enum FileError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// All `.modelbin` files below `root`, in sorted walk order.
pub fn discover_modelbins(root: &Path) -> Vec<PathBuf> {
    walk_sorted(root, MAX_DISCOVERY_DEPTH)
        .into_iter()
        .filter(|e| {
            !e.is_dir
                && e.path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("modelbin"))
        })
        .map(|e| e.path)
        .collect()
}

/// Import every `.modelbin` below `root` into `sink`.
///
/// Only an invalid root fails the run; everything else is logged in the
/// returned [`ImportLog`] and counted in the [`ImportSummary`].
pub fn import_car_folder<S: ImportSink>(
    root: &Path,
    options: &ImportOptions,
    sink: &mut S,
) -> Result<ImportOutcome, Report<ImportError>> {
    if !root.is_dir() {
        return Err(Report::new(ImportError::InvalidRoot {
            path: root.to_path_buf(),
        }));
    }

    let mut importer = Importer::new(root, options, sink);
    importer.run();
    Ok(ImportOutcome {
        summary: importer.summary,
        log: importer.log,
    })
}

struct Importer<'a, S: ImportSink> {
    root: &'a Path,
    options: &'a ImportOptions,
    sink: &'a mut S,
    resolver: PathResolver,
    log: ImportLog,
    /// Next log sequence number the sink has not seen.
    forwarded: u64,
    textures: TextureCache<S::Texture>,
    /// Created materials by name; `None` when creation failed.
    materials: HashMap<String, Option<S::Material>>,
    summary: ImportSummary,
}

impl<'a, S: ImportSink> Importer<'a, S> {
    fn new(root: &'a Path, options: &'a ImportOptions, sink: &'a mut S) -> Self {
        Self {
            root,
            options,
            sink,
            resolver: PathResolver::new(root, options.media_root().map(Path::to_path_buf)),
            log: ImportLog::new(),
            forwarded: 0,
            textures: TextureCache::new(),
            materials: HashMap::new(),
            summary: ImportSummary::default(),
        }
    }

    fn flush_log(&mut self) {
        for entry in self.log.entries_since(self.forwarded) {
            self.sink.append_log(entry);
        }
        self.forwarded = self.log.next_seq();
    }

    fn run(&mut self) {
        self.log.clear();
        self.log.info(format!(
            "importing '{}' (LODs {:?}, materials {}, auto textures {})",
            self.root.display(),
            self.options.lods(),
            if self.options.import_materials() { "on" } else { "off" },
            if self.options.auto_assign_textures() { "on" } else { "off" },
        ));
        if let Some(media_root) = self.options.media_root() {
            self.log
                .info(format!("media root: '{}'", media_root.display()));
        }
        if self.options.lods().is_empty() {
            self.log
                .warn("LOD selection is empty; no meshes will be created");
        }

        let files = discover_modelbins(self.root);
        self.summary.files_found = files.len();
        if files.is_empty() {
            self.log.warn("no .modelbin files found; nothing to import");
        } else {
            self.log.info(format!("found {} .modelbin file(s)", files.len()));
        }
        self.flush_log();

        for path in &files {
            if let Err(e) = self.import_file(path) {
                self.summary.files_failed += 1;
                self.log
                    .error(format!("failed to import '{}': {e}", path.display()));
            }
            self.flush_log();
        }

        self.log.info(format!("done: {}", self.summary));
        self.flush_log();
    }

    fn import_file(&mut self, path: &Path) -> Result<(), FileError> {
        self.log.info(format!("reading '{}'", path.display()));
        let data = fs::read(path)?;
        let model = ModelBin::parse(&data)?;
        self.log.debug(format!(
            "bundle v{}: {} submesh(es), {} layout(s), {} vertex buffer(s), {} material slot(s)",
            model.version,
            model.submeshes.len(),
            model.layouts.len(),
            model.vertex_buffers.len(),
            model.material_names.len()
        ));

        let lods = self.options.lods();
        let decoded = model.decode_meshes(|lod| lods.contains(lod))?;
        for note in &decoded.notes {
            let level = match note {
                DecodeNote::SkippedRenderPass { .. } => LogLevel::Debug,
                _ => LogLevel::Warning,
            };
            self.log.push(level, note.to_string());
        }

        let mut slot_materials: HashMap<usize, Option<S::Material>> = HashMap::new();
        for mesh in &decoded.meshes {
            let material = match mesh.material_slot {
                Some(slot) if self.options.import_materials() => slot_materials
                    .entry(slot)
                    .or_insert_with(|| self.material_for_slot(&model, slot))
                    .clone(),
                _ => None,
            };

            let name = format!("{} LOD{}", mesh.name, mesh.lod);
            let request = MeshRequest {
                name: &name,
                mesh,
                material: material.as_ref(),
            };
            match self.sink.create_mesh(request) {
                Ok(_) => {
                    self.summary.meshes_created += 1;
                    self.log.debug(format!(
                        "created mesh '{name}': {} vertices, {} triangles",
                        mesh.vertex_count(),
                        mesh.triangles.len()
                    ));
                }
                Err(e) => self.log.error(format!("could not create mesh '{name}': {e}")),
            }
        }
        Ok(())
    }

    fn material_for_slot(&mut self, model: &ModelBin<'_>, slot: usize) -> Option<S::Material> {
        let Some(source) = model.material_slots.iter().find(|m| m.slot == slot) else {
            self.log
                .debug(format!("material slot {slot} has no material instance"));
            return None;
        };
        let internal_name = model.material_name(slot).unwrap_or(DEFAULT_MATERIAL_NAME);

        let mut record = match MaterialRecord::parse(internal_name, source.data) {
            Ok(record) => {
                self.warn_partial_parameters(&record, internal_name);
                record
            }
            Err(e) => {
                self.log.warn(format!(
                    "material '{internal_name}' could not be decoded ({e}); creating it without parameters"
                ));
                MaterialRecord {
                    name: internal_name.to_string(),
                    ..Default::default()
                }
            }
        };

        let name = record
            .display_name(self.options.use_materialbin_names())
            .to_string();
        if let Some(existing) = self.materials.get(&name) {
            self.log.debug(format!("reusing material '{name}'"));
            return existing.clone();
        }

        self.apply_parents(&mut record);
        let created = self.create_material(&name, &record);
        self.materials.insert(name, created.clone());
        created
    }

    fn warn_partial_parameters(&mut self, record: &MaterialRecord, source: &str) {
        if let Some(e) = &record.parameter_error {
            self.log.warn(format!(
                "material '{source}': parameters cut short after {} entries ({e})",
                record.parameters.len()
            ));
        }
    }

    /// Load the parent chain and layer `record` over it, farthest ancestor
    /// first.
    fn apply_parents(&mut self, record: &mut MaterialRecord) {
        let mut chain: Vec<MaterialRecord> = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut next = record.parent_path.clone();

        while let Some(reference) = next.take() {
            if chain.len() == MAX_PARENT_DEPTH {
                self.log.warn(format!(
                    "material '{}': parent chain deeper than {MAX_PARENT_DEPTH}, stopping at '{reference}'",
                    record.name
                ));
                break;
            }
            let resolution = match self.resolver.resolve(&reference, &mut self.log) {
                Ok(resolution) => resolution,
                Err(e) => {
                    self.log
                        .warn(format!("material '{}': parent material: {e}", record.name));
                    break;
                }
            };
            if !seen.insert(resolution.path.clone()) {
                self.log.warn(format!(
                    "material '{}': parent cycle at '{}'",
                    record.name,
                    resolution.path.display()
                ));
                break;
            }
            let parent = fs::read(&resolution.path)
                .map_err(FileError::from)
                .and_then(|data| Ok(parse_materialbin(&data, file_stem(&reference))?));
            match parent {
                Ok(parent) => {
                    let source = resolution.path.display().to_string();
                    self.warn_partial_parameters(&parent, &source);
                    self.log.debug(format!(
                        "material '{}': loaded parent '{}'",
                        record.name,
                        resolution.path.display()
                    ));
                    next = parent.parent_path.clone();
                    chain.push(parent);
                }
                Err(e) => {
                    self.log.warn(format!(
                        "material '{}': parent '{}' failed to load: {e}",
                        record.name,
                        resolution.path.display()
                    ));
                    break;
                }
            }
        }

        let mut merged: Option<MaterialRecord> = None;
        for mut parent in chain.into_iter().rev() {
            if let Some(base) = &merged {
                parent.inherit(base);
            }
            merged = Some(parent);
        }
        if let Some(base) = &merged {
            record.inherit(base);
        }
    }

    fn create_material(&mut self, name: &str, record: &MaterialRecord) -> Option<S::Material> {
        let usage = match_usage(name);
        match usage.keyword {
            Some(keyword) => self.log.debug(format!(
                "material '{name}': {} (keyword '{keyword}')",
                usage.usage
            )),
            None => self
                .log
                .debug(format!("material '{name}': {} (default)", usage.usage)),
        }

        let slots = record.channel_slots();
        for (lost, kept) in &slots.discarded {
            self.log.warn(format!(
                "material '{name}': slot '{}' also maps to {}; keeping the more specific '{kept}'",
                lost.slot_name, lost.channel
            ));
        }
        for (slot, reference) in &slots.unclassified {
            self.log.info(format!(
                "material '{name}': texture slot '{slot}' ('{reference}') has no known channel; skipped"
            ));
        }

        let mut textures = Vec::new();
        for slot in &slots.assigned {
            match self.resolver.resolve(&slot.reference, &mut self.log) {
                Ok(resolution) => {
                    self.summary.textures_resolved += 1;
                    let resolved = ResolvedTexture {
                        slot_name: slot.slot_name.clone(),
                        channel: slot.channel,
                        path: resolution.path,
                        method: resolution.method,
                    };
                    let image_name = file_stem(&resolved.path.to_string_lossy()).to_string();
                    if let Some(texture) = self.load_texture(&resolved, image_name) {
                        textures.push(ChannelAssignment { texture, resolved });
                    }
                }
                Err(e) => {
                    self.summary.textures_missing += 1;
                    self.log
                        .warn(format!("material '{name}': {} texture: {e}", slot.channel));
                }
            }
        }

        if self.options.auto_assign_textures() {
            self.auto_assign(name, &mut textures);
        }

        let mut properties = IndexMap::new();
        properties.insert(USAGE_PROPERTY.to_string(), usage.usage.as_str().to_string());

        let request = MaterialRequest {
            name: name.to_string(),
            internal_name: record.name.clone(),
            source_file: record.source_file.clone(),
            usage: usage.usage,
            properties,
            base_color: record.base_color(),
            textures,
            uv_tiling: usage.usage.tiling_scale(),
            parameters: record.parameters.clone(),
        };
        let texture_count = request.textures.len();
        match self.sink.create_material(request) {
            Ok(material) => {
                self.summary.materials_created += 1;
                self.log.info(format!(
                    "created material '{name}' ({}, {texture_count} texture(s))",
                    usage.usage
                ));
                Some(material)
            }
            Err(e) => {
                self.log
                    .error(format!("could not create material '{name}': {e}"));
                None
            }
        }
    }

    /// Fill channels no texture slot provided from a folder named like the
    /// material.
    fn auto_assign(&mut self, name: &str, textures: &mut Vec<ChannelAssignment<S::Texture>>) {
        let Some(folder) = self.resolver.find_material_folder(name, &mut self.log) else {
            self.log
                .debug(format!("auto textures: no folder for material '{name}'"));
            return;
        };

        let mut filled: HashSet<TextureChannel> = textures.iter().map(|t| t.channel()).collect();
        for path in PathResolver::folder_texture_candidates(&folder) {
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            let channel = classify_texture_file(&file);
            if channel == TextureChannel::Unknown {
                self.log
                    .info(format!("auto textures: could not classify '{file}'; skipped"));
                continue;
            }
            if filled.contains(&channel) {
                self.log.debug(format!(
                    "auto textures: skipped '{file}', {channel} already assigned"
                ));
                continue;
            }

            let resolved = ResolvedTexture {
                slot_name: "auto".to_string(),
                channel,
                path,
                method: ResolutionMethod::FolderMatch,
            };
            let image_name = format!("{name}_{}", channel.short_name());
            if let Some(texture) = self.load_texture(&resolved, image_name) {
                self.summary.textures_resolved += 1;
                self.log
                    .info(format!("auto textures: '{file}' -> {channel} for '{name}'"));
                filled.insert(channel);
                textures.push(ChannelAssignment { texture, resolved });
            }
        }
    }

    fn load_texture(&mut self, resolved: &ResolvedTexture, name: String) -> Option<S::Texture> {
        let path = resolved.path.as_path();
        let non_color = resolved.channel.is_non_color();
        let sink = &mut *self.sink;
        let result = self.textures.get_or_load(path, || {
            let is_swatch = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("swatchbin"));
            let (name, data) = if is_swatch {
                let bytes = fs::read(path)
                    .map_err(|e| rootcause::report!("could not read swatchbin: {e}"))?;
                let swatch = decode_swatchbin(&bytes)
                    .map_err(|e| rootcause::report!("could not decode swatchbin: {e}"))?;
                let guid = swatch.guid();
                (
                    guid.clone(),
                    TextureData::Dds {
                        guid,
                        bytes: swatch.dds,
                    },
                )
            } else {
                (name, TextureData::File)
            };
            sink.load_texture(TextureRequest {
                path,
                name,
                data,
                non_color,
            })
        });

        match result {
            Ok(texture) => Some(texture),
            Err(CacheMiss::Failed(e)) => {
                self.log.warn(format!(
                    "could not load texture '{}': {e}",
                    path.display()
                ));
                None
            }
            Err(CacheMiss::FailedBefore) => None,
        }
    }
}
