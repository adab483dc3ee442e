//! Grid-bucketed building index.
//!
//! Buildings are bucketed into a sparse grid keyed by integer cell id
//! `row * cols + col`; a building whose bbox spans several cells is listed in
//! every one of them so a single cell lookup finds all bbox candidates.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::geometry::{Ring, foundation_depth, ring_area_deg2, ring_bbox, round2};

/// One building footprint: bbox, foundation depth (negative metres), outer ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRecord {
    #[serde(rename = "b")]
    pub bbox: [f64; 4],
    #[serde(rename = "f")]
    pub depth: f64,
    #[serde(rename = "p")]
    pub ring: Ring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: u32,
    /// Absolute value of the most negative foundation depth.
    #[serde(rename = "maxDepth")]
    pub max_depth: f64,
}

/// Immutable spatial index over all buildings of one city.
///
/// Built once per city code and regenerated wholesale; never patched.
/// `cells` holds only non-empty cells and iterates in key order, which keeps
/// the serialized form deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingIndex {
    /// Cell size in degrees.
    pub cs: f64,
    /// Global [minLon, minLat, maxLon, maxLat] over all buildings.
    pub bbox: [f64; 4],
    /// [cols, rows].
    pub grid: [u32; 2],
    /// Sparse cell id -> building indices whose bbox overlaps the cell.
    pub cells: BTreeMap<u32, Vec<u32>>,
    pub buildings: Vec<BuildingRecord>,
    pub stats: IndexStats,
}

impl BuildingIndex {
    #[inline] pub fn cols(&self) -> u32 { self.grid[0] }

    #[inline] pub fn rows(&self) -> u32 { self.grid[1] }

    /// Cell id containing a point, or `None` outside the grid.
    pub fn cell_id(&self, lon: f64, lat: f64) -> Option<u32> {
        let col = ((lon - self.bbox[0]) / self.cs).floor();
        let row = ((lat - self.bbox[1]) / self.cs).floor();
        if col < 0.0 || row < 0.0 || !col.is_finite() || !row.is_finite() {
            return None;
        }
        let (col, row) = (col as u64, row as u64);
        if col >= u64::from(self.cols()) || row >= u64::from(self.rows()) {
            return None;
        }
        Some((row * u64::from(self.cols()) + col) as u32)
    }

    /// Number of buildings bucketed into the cell containing the point.
    pub fn density_at(&self, lon: f64, lat: f64) -> usize {
        self.cell_id(lon, lat)
            .and_then(|id| self.cells.get(&id))
            .map_or(0, Vec::len)
    }

    /// Centre of the global bbox as [lon, lat].
    pub fn centre(&self) -> [f64; 2] {
        [(self.bbox[0] + self.bbox[2]) / 2.0, (self.bbox[1] + self.bbox[3]) / 2.0]
    }
}

/// Streaming builder: consumes rings one at a time, keeping the running
/// global bbox, then assigns grid cells in `finish()`.
#[derive(Debug)]
pub struct GridIndexer {
    cell_size: f64,
    buildings: Vec<BuildingRecord>,
    bbox: [f64; 4],
}

impl GridIndexer {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            buildings: Vec::new(),
            bbox: [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
        }
    }

    #[inline] pub fn len(&self) -> usize { self.buildings.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.buildings.is_empty() }

    /// Add one building ring (>= 3 vertices, enforced upstream).
    pub fn push(&mut self, ring: Ring) {
        let bbox = ring_bbox(&ring);
        let depth = round2(foundation_depth(ring_area_deg2(&ring)));

        if bbox[0] < self.bbox[0] { self.bbox[0] = bbox[0]; }
        if bbox[1] < self.bbox[1] { self.bbox[1] = bbox[1]; }
        if bbox[2] > self.bbox[2] { self.bbox[2] = bbox[2]; }
        if bbox[3] > self.bbox[3] { self.bbox[3] = bbox[3]; }

        self.buildings.push(BuildingRecord { bbox, depth, ring });
    }

    /// Build the index. Errors if no buildings were pushed; a city index
    /// without buildings is meaningless, so generation must abort.
    pub fn finish(self) -> Result<BuildingIndex> {
        if self.buildings.is_empty() {
            bail!("no polygon features found in input");
        }

        let Self { cell_size, buildings, bbox } = self;

        // +1 keeps floor-derived indices of the max coordinates in bounds
        let cols = ((bbox[2] - bbox[0]) / cell_size).ceil() as u32 + 1;
        let rows = ((bbox[3] - bbox[1]) / cell_size).ceil() as u32 + 1;

        let mut cells: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        let mut max_depth = 0.0_f64;

        for (i, building) in buildings.iter().enumerate() {
            max_depth = max_depth.max(building.depth.abs());

            let col_min = ((building.bbox[0] - bbox[0]) / cell_size).floor() as u32;
            let row_min = ((building.bbox[1] - bbox[1]) / cell_size).floor() as u32;
            let col_max = ((building.bbox[2] - bbox[0]) / cell_size).floor() as u32;
            let row_max = ((building.bbox[3] - bbox[1]) / cell_size).floor() as u32;

            for row in row_min..=row_max {
                for col in col_min..=col_max {
                    cells.entry(row * cols + col).or_default().push(i as u32);
                }
            }
        }

        let stats = IndexStats { count: buildings.len() as u32, max_depth: round2(max_depth) };

        Ok(BuildingIndex { cs: cell_size, bbox, grid: [cols, rows], cells, buildings, stats })
    }
}
