use crate::protocol::Tile;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Flat-file tile list. Every mutation rewrites the whole file.
///
/// Mutations made through [`TileStore::update`] are serialized by an async
/// mutex, so concurrent requests inside one process don't drop each other's
/// writes. Another process writing the same file still races (last writer
/// wins).
pub struct TileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the tile list. A missing, empty or corrupt file is an empty list.
    pub async fn load(&self) -> Vec<Tile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_tiles(&content),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {:?}: {}", self.path, e);
                }
                Vec::new()
            }
        }
    }

    /// Overwrite the file with `tiles`. Written to a sibling temp file first
    /// and renamed into place.
    pub async fn save(&self, tiles: &[Tile]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(tiles)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved {} tiles to {:?}", tiles.len(), self.path);
        Ok(())
    }

    /// Load, mutate and save while holding the store lock.
    pub async fn update<F, R>(&self, mutate: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut Vec<Tile>) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let mut tiles = self.load().await;
        let out = mutate(&mut tiles);
        self.save(&tiles).await?;
        Ok(out)
    }

    pub async fn append(&self, tile: Tile) -> anyhow::Result<()> {
        self.update(|tiles| tiles.push(tile)).await
    }

    /// Drop every tile whose url equals `url`. Returns how many were removed.
    pub async fn remove_url(&self, url: &str) -> anyhow::Result<usize> {
        self.update(|tiles| {
            let before = tiles.len();
            tiles.retain(|t| t.url != url);
            before - tiles.len()
        })
        .await
    }

    /// Apply `edit` to the first tile whose url equals `original_url`.
    /// Returns whether a tile matched. The file is rewritten either way.
    pub async fn edit_first<F>(&self, original_url: &str, edit: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&mut Tile),
    {
        self.update(|tiles| match tiles.iter_mut().find(|t| t.url == original_url) {
            Some(tile) => {
                edit(tile);
                true
            }
            None => false,
        })
        .await
    }
}

pub fn parse_tiles(content: &str) -> Vec<Tile> {
    let content = content.trim();
    if content.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Tile>>(content) {
        Ok(tiles) => tiles,
        Err(e) => {
            warn!("Ignoring unreadable tile file: {}", e);
            Vec::new()
        }
    }
}
