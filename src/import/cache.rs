use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Why [`TextureCache::get_or_load`] has no texture to return.
#[derive(Debug)]
pub enum CacheMiss<E> {
    /// The loader ran and failed.
    Failed(E),
    /// An earlier load of the same path failed; the loader was not run.
    FailedBefore,
}

/// Texture handles keyed by resolved path, shared by every material of one
/// import run. Failed loads are remembered too, so a broken file is only
/// attempted (and reported) once.
#[derive(Debug)]
pub struct TextureCache<T> {
    entries: HashMap<PathBuf, Option<T>>,
    loads: usize,
}

impl<T> Default for TextureCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            loads: 0,
        }
    }
}

impl<T: Clone> TextureCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&T> {
        self.entries.get(path)?.as_ref()
    }

    pub fn get_or_load<E>(
        &mut self,
        path: &Path,
        load: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, CacheMiss<E>> {
        if let Some(entry) = self.entries.get(path) {
            return entry.clone().ok_or(CacheMiss::FailedBefore);
        }
        self.loads += 1;
        let result = load();
        self.entries
            .insert(path.to_path_buf(), result.as_ref().ok().cloned());
        result.map_err(CacheMiss::Failed)
    }

    /// Number of times a loader was actually run.
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn second_request_returns_same_handle() {
        let mut cache = TextureCache::new();
        let path = Path::new("/car/body_diff.png");
        let first = cache
            .get_or_load(path, || Ok::<_, ()>(Rc::new("image")))
            .unwrap();
        let second = cache
            .get_or_load(path, || -> Result<Rc<&str>, ()> { panic!("loaded twice") })
            .unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.loads(), 1);
        assert!(cache.get(path).is_some());
    }

    #[test]
    fn failures_are_cached() {
        let mut cache: TextureCache<Rc<&str>> = TextureCache::new();
        let path = Path::new("/car/broken.dds");
        assert!(matches!(
            cache.get_or_load(path, || Err("bad header")),
            Err(CacheMiss::Failed("bad header"))
        ));
        assert!(matches!(
            cache.get_or_load(path, || Err("bad header")),
            Err(CacheMiss::FailedBefore)
        ));
        assert_eq!(cache.loads(), 1);
        assert_eq!(cache.len(), 1);
    }
}
