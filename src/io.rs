//! Gzip-compressed JSON artifacts, written atomically.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

/// Serialize `value` as compact JSON, gzip it, and publish it at `path` via
/// write-to-temp-then-rename so a crash never leaves a partial artifact.
/// Returns the compressed size in bytes.
pub fn write_gz_json<T: Serialize>(path: &Path, value: &T) -> Result<u64> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent).context("create temp file")?;
    {
        let mut encoder = GzEncoder::new(BufWriter::new(&mut tmp), Compression::default());
        serde_json::to_writer(&mut encoder, value).context("serialize JSON")?;
        encoder.finish().context("finish gzip stream")?.flush()?;
    }
    tmp.as_file().sync_all().ok(); // best-effort fsync

    let file = tmp
        .persist(path)
        .with_context(|| format!("rename to {}", path.display()))?;
    Ok(file.metadata()?.len())
}

/// Open, decompress and parse a gzipped JSON file.
pub fn read_gz_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    serde_json::from_reader(decoder).with_context(|| format!("parse {}", path.display()))
}
