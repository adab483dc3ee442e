//! Procedural commuter-demand generation.
//!
//! A regular grid of demand points is sampled over the city bbox; residents
//! scale with building density, jobs additionally with a centre weight
//! (monocentric downtown bias). Commuter pops then pair each residential
//! point with its nearest job points from a bounded candidate pool, under a
//! global pop cap.

use serde::{Deserialize, Serialize};

use crate::geometry::{haversine, round6};
use crate::index::BuildingIndex;

pub const BASE_RESIDENTS: f64 = 500.0;
pub const BASE_JOBS: f64 = 200.0;

/// Road network vs. straight line.
pub const DETOUR_FACTOR: f64 = 1.25;

/// ~40 km/h average urban speed, in m/s.
pub const SPEED_MS: f64 = 11.11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandPoint {
    pub id: String,
    /// [lon, lat]
    pub location: [f64; 2],
    pub jobs: u32,
    pub residents: u32,
    /// Ids of pops whose residence is this point.
    #[serde(rename = "popIds")]
    pub pop_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommuterPop {
    pub id: String,
    pub size: u32,
    #[serde(rename = "residenceId")]
    pub residence_id: String,
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(rename = "drivingSeconds")]
    pub driving_seconds: u32,
    /// Metres.
    #[serde(rename = "drivingDistance")]
    pub driving_distance: u32,
}

/// Write-once demand dataset, regenerated wholesale whenever the index changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandData {
    pub points: Vec<DemandPoint>,
    pub pops: Vec<CommuterPop>,
}

#[derive(Debug, Clone)]
pub struct DemandParams {
    /// Sample-grid divisions per axis.
    pub grid_size: u32,
    /// Global cap on emitted pops.
    pub max_pops: usize,
    /// Job pairings per residential point.
    pub pairs_per_point: usize,
}

impl Default for DemandParams {
    fn default() -> Self {
        Self { grid_size: 8, max_pops: 2000, pairs_per_point: 3 }
    }
}

/// Generate the full demand dataset from a building index snapshot.
/// Deterministic: the same index and params always produce the same output.
pub fn generate(index: &BuildingIndex, params: &DemandParams) -> DemandData {
    let points = sample_points(index, params.grid_size);
    pair_commuters(points, params)
}

/// Lay a regular n x n grid over the index bbox (both edges inclusive) and
/// derive residents/jobs per point from building density and centrality.
fn sample_points(index: &BuildingIndex, grid_size: u32) -> Vec<DemandPoint> {
    let n = grid_size.max(1);
    let [min_lon, min_lat, max_lon, max_lat] = index.bbox;
    let div = (n - 1).max(1) as f64;
    let lon_step = (max_lon - min_lon) / div;
    let lat_step = (max_lat - min_lat) / div;

    let centre = index.centre();
    let corner_dist = haversine([min_lon, min_lat], centre);

    struct Sample {
        lon: f64,
        lat: f64,
        density: usize,
        centre_weight: f64,
    }

    let mut samples = Vec::with_capacity((n * n) as usize);
    for row in 0..n {
        for col in 0..n {
            let lon = round6(min_lon + f64::from(col) * lon_step);
            let lat = round6(min_lat + f64::from(row) * lat_step);
            let dist = haversine([lon, lat], centre);
            let centre_weight = if corner_dist > 0.0 {
                (1.0 - dist / corner_dist).max(0.05)
            } else {
                1.0
            };
            samples.push(Sample { lon, lat, density: index.density_at(lon, lat), centre_weight });
        }
    }

    // floor of 1 avoids a zero division when no sampled cell has buildings
    let max_density = samples.iter().map(|s| s.density).max().unwrap_or(0).max(1) as f64;

    samples
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let ratio = s.density as f64 / max_density;
            DemandPoint {
                id: format!("pt_{i}"),
                location: [s.lon, s.lat],
                // jobs are biased toward central, dense cells 3x more
                // strongly than residents
                jobs: (BASE_JOBS * ratio * s.centre_weight * 3.0).round() as u32,
                residents: (BASE_RESIDENTS * ratio).round() as u32,
                pop_ids: Vec::new(),
            }
        })
        .collect()
}

/// Pair residential points with nearby job points and emit capped pops.
///
/// Residential points are visited in descending-residents order so that
/// high-density residences are guaranteed pops before the global cap
/// truncates the rest. The job pool is bounded to the top `2 * grid_size`
/// points by jobs, keeping pairing at O(points * pool) instead of O(points²).
fn pair_commuters(mut points: Vec<DemandPoint>, params: &DemandParams) -> DemandData {
    let mut residential: Vec<usize> = (0..points.len()).collect();
    residential.sort_by(|&a, &b| points[b].residents.cmp(&points[a].residents));

    let mut job_pool: Vec<usize> = (0..points.len()).collect();
    job_pool.sort_by(|&a, &b| points[b].jobs.cmp(&points[a].jobs));
    job_pool.truncate(params.grid_size as usize * 2);

    let mut pops: Vec<CommuterPop> = Vec::new();

    'residences: for &res in &residential {
        if points[res].residents == 0 {
            continue;
        }

        let origin = points[res].location;
        let mut candidates: Vec<(f64, usize)> = job_pool
            .iter()
            .copied()
            .filter(|&job| job != res && points[job].jobs > 0)
            .map(|job| (haversine(origin, points[job].location), job))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        candidates.truncate(params.pairs_per_point);

        for (dist, job) in candidates {
            if pops.len() >= params.max_pops {
                break 'residences;
            }

            let driving_distance = (dist * DETOUR_FACTOR).round() as u32;
            let driving_seconds = (f64::from(driving_distance) / SPEED_MS).round() as u32;
            let size = ((points[res].residents as f64 / params.pairs_per_point as f64).round() as u32).max(1);
            let id = format!("pop_{}", pops.len());

            points[res].pop_ids.push(id.clone());
            pops.push(CommuterPop {
                id,
                size,
                residence_id: points[res].id.clone(),
                job_id: points[job].id.clone(),
                driving_seconds,
                driving_distance,
            });
        }
    }

    DemandData { points, pops }
}
