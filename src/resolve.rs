//! Mapping in-game references to files on disk.
//!
//! Materials refer to textures and parent materials by virtual paths such as
//! `Game:\Media\Cars\_Library\Textures\carbon_01.swatchbin`, or sometimes by
//! bare file name. Users usually copy every file a car needs into one folder
//! without preserving that tree, so a reference is tried as a direct path,
//! then against the configured media root, then against the folders above
//! the car folder, and finally by file name anywhere below the car folder.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::classify::texture::{has_texture_extension, texture_extension_rank};
use crate::error::ResolveError;
use crate::log::ImportLog;

/// Directory levels below the car folder searched by file name.
pub const MAX_SEARCH_DEPTH: usize = 8;

/// Directory levels above the car folder tried for relative references.
pub const PARENT_SEARCH_LEVELS: usize = 5;

/// Virtual prefix of the game's media tree, compared case-insensitively.
pub const MEDIA_PREFIX: &str = "game:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResolutionMethod {
    DirectPath,
    MediaRootTranslated,
    ParentSearch,
    RecursiveSearch,
    FolderMatch,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolutionMethod::DirectPath => "direct path",
            ResolutionMethod::MediaRootTranslated => "media root",
            ResolutionMethod::ParentSearch => "parent folder",
            ResolutionMethod::RecursiveSearch => "file name search",
            ResolutionMethod::FolderMatch => "folder match",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub path: PathBuf,
    pub method: ResolutionMethod,
}

/// Strip the media prefix (if any) and turn the rest into a relative path.
/// Returns the relative path and whether the prefix was present.
pub fn split_virtual_path(reference: &str) -> (PathBuf, bool) {
    let trimmed = reference.trim();
    let (rest, virtual_path) = match trimmed.get(..MEDIA_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(MEDIA_PREFIX) => {
            (&trimmed[MEDIA_PREFIX.len()..], true)
        }
        _ => (trimmed, false),
    };
    let relative = rest
        .split(['\\', '/'])
        .filter(|c| !c.is_empty() && *c != ".")
        .collect::<PathBuf>();
    (relative, virtual_path)
}

/// An entry met while walking a directory tree.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub depth: usize,
}

/// Breadth-first walk below `root`, entries of each directory in name
/// order. Symlinked directories are not followed and unreadable ones are
/// skipped.
pub fn walk_sorted(root: &Path, max_depth: usize) -> Vec<WalkEntry> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([(root.to_path_buf(), 1usize)]);
    while let Some((dir, depth)) = queue.pop_front() {
        let Ok(read) = fs::read_dir(&dir) else {
            continue;
        };
        let entries = read
            .filter_map(Result::ok)
            .map(|e| {
                let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
                (e.file_name(), e.path(), is_dir)
            })
            .sorted_by(|a, b| a.0.cmp(&b.0));
        for (_, path, is_dir) in entries {
            if is_dir && depth < max_depth {
                queue.push_back((path.clone(), depth + 1));
            }
            out.push(WalkEntry {
                path,
                is_dir,
                depth,
            });
        }
    }
    out
}

fn lower_file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_lowercase())
}

fn lower_file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|n| n.to_string_lossy().to_lowercase())
}

/// Case-insensitive file name index of the car folder.
#[derive(Debug, Default)]
struct FileIndex {
    /// First path (in walk order) per lower-cased file name.
    by_name: HashMap<String, PathBuf>,
    /// Every path per lower-cased stem, in walk order.
    by_stem: HashMap<String, Vec<PathBuf>>,
    files: usize,
}

impl FileIndex {
    fn build(root: &Path) -> Self {
        let mut index = FileIndex::default();
        for entry in walk_sorted(root, MAX_SEARCH_DEPTH) {
            if entry.is_dir {
                continue;
            }
            index.files += 1;
            if let Some(name) = lower_file_name(&entry.path) {
                index
                    .by_name
                    .entry(name)
                    .or_insert_with(|| entry.path.clone());
            }
            if let Some(stem) = lower_file_stem(&entry.path) {
                index.by_stem.entry(stem).or_default().push(entry.path);
            }
        }
        index
    }
}

/// Resolves references for one import run. Results, including failures,
/// are cached per reference string; the file index is built on first use.
#[derive(Debug)]
pub struct PathResolver {
    car_root: PathBuf,
    media_root: Option<PathBuf>,
    index: Option<FileIndex>,
    cache: HashMap<String, Result<Resolution, ResolveError>>,
    folder_cache: HashMap<String, Option<PathBuf>>,
}

impl PathResolver {
    pub fn new(car_root: impl Into<PathBuf>, media_root: Option<PathBuf>) -> Self {
        Self {
            car_root: car_root.into(),
            media_root,
            index: None,
            cache: HashMap::new(),
            folder_cache: HashMap::new(),
        }
    }

    pub fn car_root(&self) -> &Path {
        &self.car_root
    }

    pub fn media_root(&self) -> Option<&Path> {
        self.media_root.as_deref()
    }

    fn index(&mut self, log: &mut ImportLog) -> &FileIndex {
        if self.index.is_none() {
            let index = FileIndex::build(&self.car_root);
            log.debug(format!(
                "indexed {} files under '{}'",
                index.files,
                self.car_root.display()
            ));
            self.index = Some(index);
        }
        self.index.get_or_insert_with(FileIndex::default)
    }

    /// Resolve `reference`, trying each strategy in order and logging every
    /// attempt.
    pub fn resolve(
        &mut self,
        reference: &str,
        log: &mut ImportLog,
    ) -> Result<Resolution, ResolveError> {
        if reference.trim().is_empty() {
            return Err(ResolveError::EmptyReference);
        }
        if let Some(cached) = self.cache.get(reference) {
            log.debug(format!("cache hit for '{reference}'"));
            return cached.clone();
        }

        let result = self.resolve_uncached(reference, log);
        match &result {
            Ok(resolution) => log.debug(format!(
                "resolved '{reference}' -> '{}' ({})",
                resolution.path.display(),
                resolution.method
            )),
            Err(e) => log.debug(e.to_string()),
        }
        self.cache.insert(reference.to_string(), result.clone());
        result
    }

    fn resolve_uncached(
        &mut self,
        reference: &str,
        log: &mut ImportLog,
    ) -> Result<Resolution, ResolveError> {
        let found = |path: PathBuf, method| Ok(Resolution { path, method });

        let native = Path::new(reference.trim());
        if native.is_absolute() && native.is_file() {
            return found(native.to_path_buf(), ResolutionMethod::DirectPath);
        }

        let (relative, is_virtual) = split_virtual_path(reference);
        if !relative.as_os_str().is_empty() {
            let candidate = self.car_root.join(&relative);
            log.debug(format!("  trying '{}'", candidate.display()));
            if candidate.is_file() {
                return found(candidate, ResolutionMethod::DirectPath);
            }

            if is_virtual && let Some(media_root) = &self.media_root {
                let candidate = media_root.join(&relative);
                log.debug(format!("  trying media root '{}'", candidate.display()));
                if candidate.is_file() {
                    return found(candidate, ResolutionMethod::MediaRootTranslated);
                }
            }

            for ancestor in self.car_root.ancestors().skip(1).take(PARENT_SEARCH_LEVELS) {
                let candidate = ancestor.join(&relative);
                log.debug(format!("  trying parent '{}'", candidate.display()));
                if candidate.is_file() {
                    return found(candidate, ResolutionMethod::ParentSearch);
                }
            }
        }

        let Some(name) = lower_file_name(&relative) else {
            return Err(ResolveError::TextureNotFound {
                reference: reference.to_string(),
            });
        };
        log.debug(format!("  searching car folder for '{name}'"));
        let index = self.index(log);
        if let Some(path) = index.by_name.get(&name) {
            return found(path.clone(), ResolutionMethod::RecursiveSearch);
        }

        // same stem, other texture format; bare names match any texture format
        if (has_texture_extension(&name) || relative.extension().is_none())
            && let Some(stem) = lower_file_stem(&relative)
            && let Some(path) = index.by_stem.get(&stem).and_then(|paths| {
                paths
                    .iter()
                    .filter(|p| has_texture_extension(&p.to_string_lossy()))
                    .min_by_key(|p| texture_extension_rank(&p.to_string_lossy()))
            })
        {
            return found(path.clone(), ResolutionMethod::RecursiveSearch);
        }

        Err(ResolveError::TextureNotFound {
            reference: reference.to_string(),
        })
    }

    /// First directory below the car folder named like `material_name`
    /// (case-insensitive), in breadth-first name order.
    pub fn find_material_folder(
        &mut self,
        material_name: &str,
        log: &mut ImportLog,
    ) -> Option<PathBuf> {
        if let Some(cached) = self.folder_cache.get(material_name) {
            return cached.clone();
        }
        let wanted = material_name.to_lowercase();
        let folder = walk_sorted(&self.car_root, MAX_SEARCH_DEPTH)
            .into_iter()
            .find(|e| e.is_dir && lower_file_name(&e.path).as_deref() == Some(wanted.as_str()))
            .map(|e| e.path);
        match &folder {
            Some(path) => log.debug(format!(
                "found folder '{}' for material '{material_name}'",
                path.display()
            )),
            None => log.debug(format!("no folder named '{material_name}'")),
        }
        self.folder_cache
            .insert(material_name.to_string(), folder.clone());
        folder
    }

    /// Texture files anywhere below `folder`, in walk order.
    pub fn folder_texture_candidates(folder: &Path) -> Vec<PathBuf> {
        walk_sorted(folder, MAX_SEARCH_DEPTH)
            .into_iter()
            .filter(|e| !e.is_dir && has_texture_extension(&e.path.to_string_lossy()))
            .map(|e| e.path)
            .collect()
    }
}
