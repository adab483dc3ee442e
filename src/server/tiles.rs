//! Tile-archive registry: one lazily opened PMTiles handle per city code.

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use pmtiles2::PMTiles;

/// Raw tile bytes plus the `Content-Encoding` they are stored with.
pub type TileData = (Vec<u8>, Option<&'static str>);

/// Thread-safe get-or-create cache of tile archives, keyed by uppercased
/// city code. The map mutex is held across archive construction so two
/// concurrent cold lookups for the same code never open duplicate handles.
/// Archives are immutable once published, so handles live for the
/// registry's lifetime and there is nothing to invalidate.
pub struct TileRegistry {
    tiles_dir: PathBuf,
    archives: Mutex<HashMap<String, Arc<Mutex<PMTiles<File>>>>>,
}

impl TileRegistry {
    pub fn new(tiles_dir: PathBuf) -> Self {
        Self { tiles_dir, archives: Mutex::new(HashMap::new()) }
    }

    /// Extract one tile. `Ok(None)` means the archive or the tile does not
    /// exist; `Err` is an archive access failure (the cached handle is kept).
    pub fn tile(&self, code: &str, z: u8, x: u64, y: u64) -> Result<Option<TileData>> {
        let Some(archive) = self.get_or_open(code)? else {
            return Ok(None);
        };

        let mut archive = archive.lock().expect("archive mutex poisoned");
        let encoding = archive.tile_compression.http_content_encoding();
        let tile = archive
            .get_tile(x, y, z)
            .with_context(|| format!("read tile {z}/{x}/{y} for {code}"))?;
        Ok(tile.map(|bytes| (bytes, encoding)))
    }

    /// Look up (or open and cache) the archive for a code. `Ok(None)` if no
    /// `<CODE>.pmtiles` file exists.
    fn get_or_open(&self, code: &str) -> Result<Option<Arc<Mutex<PMTiles<File>>>>> {
        let key = code.to_ascii_uppercase();
        let mut archives = self.archives.lock().expect("registry mutex poisoned");

        if let Some(archive) = archives.get(&key) {
            return Ok(Some(archive.clone()));
        }

        let path = self.tiles_dir.join(format!("{key}.pmtiles"));
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("open {}", path.display()));
            }
        };

        let archive = PMTiles::from_reader(file)
            .with_context(|| format!("parse {}", path.display()))?;
        let archive = Arc::new(Mutex::new(archive));
        tracing::info!(code = %key, path = %path.display(), "opened tile archive");
        archives.insert(key, archive.clone());
        Ok(Some(archive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmtiles2::util::tile_id;
    use pmtiles2::{Compression, TileType};
    use std::io::Cursor;

    fn write_archive(dir: &std::path::Path, code: &str) {
        let mut pm = PMTiles::new(TileType::Mvt, Compression::None);
        pm.add_tile(tile_id(10, 1, 2), b"tile-bytes".to_vec()).unwrap();

        let mut out = Cursor::new(Vec::new());
        pm.to_writer(&mut out).unwrap();
        std::fs::write(dir.join(format!("{code}.pmtiles")), out.into_inner()).unwrap();
    }

    #[test]
    fn extracts_present_tile() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "TST");

        let registry = TileRegistry::new(dir.path().to_path_buf());
        let (bytes, encoding) = registry.tile("TST", 10, 1, 2).unwrap().unwrap();
        assert_eq!(bytes, b"tile-bytes");
        assert_eq!(encoding, None);
    }

    #[test]
    fn absent_tile_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "TST");

        let registry = TileRegistry::new(dir.path().to_path_buf());
        assert!(registry.tile("TST", 10, 1, 3).unwrap().is_none());
    }

    #[test]
    fn missing_archive_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TileRegistry::new(dir.path().to_path_buf());
        assert!(registry.tile("ZZZ", 10, 1, 2).unwrap().is_none());
    }

    #[test]
    fn lookup_is_case_insensitive_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "TST");

        let registry = TileRegistry::new(dir.path().to_path_buf());
        assert!(registry.tile("tst", 10, 1, 2).unwrap().is_some());

        // handle is reused even if the file disappears afterwards
        std::fs::remove_file(dir.path().join("TST.pmtiles")).unwrap();
        assert!(registry.tile("TST", 10, 1, 2).unwrap().is_some());
    }
}
