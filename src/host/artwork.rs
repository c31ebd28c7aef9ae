use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "bmp", "gif"];

// Preference order when a folder holds several sidecar images.
const SIDECAR_NAMES: [&str; 5] = ["cover", "folder", "front", "album", "artwork"];

/// Copies track artwork into a cache directory the OS media overlay can read.
#[derive(Debug, Clone)]
pub struct ArtworkCache {
    dir: PathBuf,
}

impl ArtworkCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve artwork for `file_path` and return its cached copy, or `None`
    /// when the track has no artwork.
    pub fn materialize(&self, file_path: &Path) -> Result<Option<PathBuf>> {
        let Some(source) = find_artwork(file_path)? else {
            return Ok(None);
        };

        let ext = extension(&source).unwrap_or_else(|| "img".to_string());

        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create artwork cache: {}", self.dir.display())
        })?;

        // One entry per source path, refreshed in place when the source changes.
        let target = self.dir.join(format!("{}.{ext}", cache_key(&source)));
        if is_stale(&source, &target)? {
            fs::copy(&source, &target).with_context(|| {
                format!(
                    "Failed to copy artwork {} to {}",
                    source.display(),
                    target.display()
                )
            })?;
        }

        Ok(Some(target))
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn is_image(path: &Path) -> bool {
    extension(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

fn sidecar_rank(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?.to_lowercase();
    SIDECAR_NAMES.iter().position(|name| *name == stem)
}

fn find_artwork(file_path: &Path) -> Result<Option<PathBuf>> {
    if is_image(file_path) && file_path.is_file() {
        return Ok(Some(file_path.to_path_buf()));
    }

    let Some(dir) = file_path.parent().filter(|d| d.is_dir()) else {
        return Ok(None);
    };

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let best = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .filter_map(|path| sidecar_rank(&path).map(|rank| (rank, path)))
        .min();

    Ok(best.map(|(_, path)| path))
}

fn cache_key(source: &Path) -> String {
    let digest = Sha256::digest(source.as_os_str().as_encoded_bytes());
    hex::encode(&digest[..8])
}

fn is_stale(source: &Path, target: &Path) -> Result<bool> {
    let Ok(cached) = fs::metadata(target) else {
        return Ok(true);
    };
    let meta = fs::metadata(source)
        .with_context(|| format!("Failed to stat artwork: {}", source.display()))?;

    if meta.len() != cached.len() {
        return Ok(true);
    }
    Ok(match (meta.modified(), cached.modified()) {
        (Ok(source_time), Ok(cached_time)) => source_time > cached_time,
        _ => false,
    })
}
