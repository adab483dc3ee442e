//! Lazy GeoJSON feature stream.
//!
//! Yields outer polygon rings one feature at a time without materializing the
//! whole FeatureCollection. The sequence is finite, single-pass, and not
//! restartable; the consumer pulls at its own pace.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use geojson::{Feature, FeatureReader, Value};

use crate::geometry::Ring;

/// Open `path` and stream the outer ring of each polygonal feature.
///
/// Recognizes `Polygon` (first ring) and `MultiPolygon` (first polygon's
/// outer ring). Features with no geometry, other geometry kinds, or a ring
/// with fewer than 3 vertices are silently skipped. A missing file fails
/// here; malformed JSON/GeoJSON surfaces as an `Err` item mid-stream. Both
/// are fatal for generation.
pub fn read_rings(path: &Path) -> Result<impl Iterator<Item = Result<Ring, geojson::Error>>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = FeatureReader::from_reader(BufReader::new(file));
    Ok(reader.features().filter_map(|feature| match feature {
        Ok(feature) => outer_ring(&feature).map(Ok),
        Err(err) => Some(Err(err)),
    }))
}

/// Select the outer ring of a feature, or `None` if it has no usable one.
fn outer_ring(feature: &Feature) -> Option<Ring> {
    let geometry = feature.geometry.as_ref()?;
    let positions = match &geometry.value {
        Value::Polygon(rings) => rings.first()?,
        // only the first polygon's outer ring; holes and further polygons
        // are intentionally ignored
        Value::MultiPolygon(polygons) => polygons.first()?.first()?,
        _ => return None,
    };
    if positions.len() < 3 {
        return None;
    }
    let ring: Ring = positions
        .iter()
        .filter(|pos| pos.len() >= 2)
        .map(|pos| [pos[0], pos[1]])
        .collect();
    (ring.len() >= 3).then_some(ring)
}
