//! Independent re-check of published artifacts.
//!
//! Deliberately parses the raw JSON (`serde_json::Value`) instead of the
//! crate's own types, so a serialization bug cannot validate itself.

use std::path::Path;

use anyhow::{Result, bail};
use serde_json::Value;

use crate::io::read_gz_json;

#[derive(Default)]
struct Report {
    failed: u32,
}

impl Report {
    fn check(&mut self, ok: bool, msg: &str) {
        if ok {
            println!("  \u{2713} {msg}");
        } else {
            eprintln!("  \u{2717} {msg}");
            self.failed += 1;
        }
    }
}

/// Validate both published files for a city code. Any failed check (or an
/// unreadable file) makes the whole run fail.
pub fn run(code: &str, data_dir: &Path) -> Result<()> {
    let mut report = Report::default();
    let city_dir = data_dir.join(code);

    println!("[validate] buildings_index.json.gz ({code})");
    match read_gz_json::<Value>(&city_dir.join("buildings_index.json.gz")) {
        Ok(index) => check_buildings_index(&mut report, &index),
        Err(err) => report.check(false, &format!("load buildings index: {err:#}")),
    }

    println!("[validate] demand_data.json.gz ({code})");
    match read_gz_json::<Value>(&city_dir.join("demand_data.json.gz")) {
        Ok(demand) => check_demand_data(&mut report, &demand),
        Err(err) => report.check(false, &format!("load demand data: {err:#}")),
    }

    if report.failed == 0 {
        println!("[validate] all checks passed for {code}");
        Ok(())
    } else {
        bail!("{} check(s) failed for {code}", report.failed);
    }
}

fn is_bbox(v: Option<&Value>) -> bool {
    v.and_then(Value::as_array)
        .is_some_and(|a| a.len() == 4 && a.iter().all(Value::is_number))
}

fn check_buildings_index(report: &mut Report, index: &Value) {
    report.check(
        index.get("cs").and_then(Value::as_f64).is_some_and(|cs| cs > 0.0),
        "cs is a positive number",
    );
    report.check(is_bbox(index.get("bbox")), "bbox is [minLon, minLat, maxLon, maxLat]");

    let grid = index.get("grid").and_then(Value::as_array);
    report.check(
        grid.is_some_and(|g| g.len() == 2 && g.iter().all(|v| v.as_u64().is_some_and(|n| n > 0))),
        "grid is [cols, rows] (positive integers)",
    );

    let buildings = index.get("buildings").and_then(Value::as_array);
    let count = buildings.map_or(0, Vec::len);
    report.check(count > 0, "buildings is a non-empty array");

    if let Some(buildings) = buildings {
        report.check(
            buildings.iter().all(|b| is_bbox(b.get("b"))),
            "every building has bbox [minLon,minLat,maxLon,maxLat]",
        );
        report.check(
            buildings
                .iter()
                .all(|b| b.get("f").and_then(Value::as_f64).is_some_and(|f| f < 0.0)),
            "every building depth is negative metres",
        );
        report.check(
            buildings
                .iter()
                .all(|b| b.get("p").and_then(Value::as_array).is_some_and(|p| p.len() >= 3)),
            "every building ring has >= 3 coords",
        );
    }

    let cells = index.get("cells").and_then(Value::as_object);
    report.check(cells.is_some(), "cells is a sparse object");
    if let Some(cells) = cells {
        report.check(
            cells.values().all(|ids| {
                ids.as_array().is_some_and(|ids| {
                    !ids.is_empty()
                        && ids
                            .iter()
                            .all(|i| i.as_u64().is_some_and(|i| (i as usize) < count))
                })
            }),
            "cells hold non-empty lists of valid building indices",
        );
        report.check(
            cells.keys().all(|k| k.parse::<u64>().is_ok()),
            "cell keys are integer cell ids",
        );
    }

    let stats_count = index
        .get("stats")
        .and_then(|s| s.get("count"))
        .and_then(Value::as_u64);
    let max_depth = index
        .get("stats")
        .and_then(|s| s.get("maxDepth"))
        .and_then(Value::as_f64);
    report.check(stats_count.is_some() && max_depth.is_some(), "stats has { count, maxDepth }");
    report.check(
        stats_count == Some(count as u64),
        "stats.count matches buildings.length",
    );
    if let (Some(max_depth), Some(buildings)) = (max_depth, buildings) {
        let observed = buildings
            .iter()
            .filter_map(|b| b.get("f").and_then(Value::as_f64))
            .map(f64::abs)
            .fold(0.0_f64, f64::max);
        report.check((max_depth - observed).abs() < 0.01, "stats.maxDepth matches max |depth|");
    }
}

fn check_demand_data(report: &mut Report, demand: &Value) {
    let points = demand.get("points").and_then(Value::as_array);
    report.check(points.is_some_and(|p| !p.is_empty()), "points is a non-empty array");

    if let Some(points) = points {
        report.check(
            points.iter().all(|p| {
                p.get("id").and_then(Value::as_str).is_some_and(|id| !id.is_empty())
                    && p.get("location")
                        .and_then(Value::as_array)
                        .is_some_and(|l| l.len() == 2 && l.iter().all(Value::is_number))
                    && p.get("jobs").and_then(Value::as_u64).is_some()
                    && p.get("residents").and_then(Value::as_u64).is_some()
                    && p.get("popIds").and_then(Value::as_array).is_some()
            }),
            "every point has id, location [lon,lat], jobs/residents >= 0, popIds",
        );
    }

    let pops = demand.get("pops").and_then(Value::as_array);
    report.check(pops.is_some(), "pops is an array");

    if let Some(pops) = pops {
        report.check(
            pops.iter().all(|p| {
                p.get("id").and_then(Value::as_str).is_some_and(|id| !id.is_empty())
                    && p.get("size").and_then(Value::as_u64).is_some_and(|s| s >= 1)
                    && p.get("residenceId").and_then(Value::as_str).is_some()
                    && p.get("jobId").and_then(Value::as_str).is_some()
                    && p.get("drivingSeconds").and_then(Value::as_u64).is_some()
                    && p.get("drivingDistance").and_then(Value::as_u64).is_some()
            }),
            "every pop has id, size >= 1, residenceId/jobId, driving metrics",
        );
    }

    if let (Some(points), Some(pops)) = (points, pops) {
        let point_ids: std::collections::HashSet<&str> = points
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::as_str))
            .collect();
        let pop_ids: std::collections::HashSet<&str> = pops
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::as_str))
            .collect();

        let bad_pops = pops
            .iter()
            .filter(|p| {
                !p.get("residenceId")
                    .and_then(Value::as_str)
                    .is_some_and(|id| point_ids.contains(id))
                    || !p.get("jobId").and_then(Value::as_str).is_some_and(|id| point_ids.contains(id))
            })
            .count();
        report.check(
            bad_pops == 0,
            &format!("all pop residenceId/jobId reference valid point ids ({bad_pops} bad)"),
        );

        let bad_refs = points
            .iter()
            .filter_map(|p| p.get("popIds").and_then(Value::as_array))
            .flatten()
            .filter(|id| !id.as_str().is_some_and(|id| pop_ids.contains(id)))
            .count();
        report.check(
            bad_refs == 0,
            &format!("all point popIds reference valid pop ids ({bad_refs} bad)"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::{DemandParams, generate};
    use crate::index::GridIndexer;
    use crate::io::write_gz_json;

    fn write_city(dir: &Path, code: &str) {
        let mut indexer = GridIndexer::new(0.01);
        for i in 0..5 {
            let off = i as f64 * 0.002;
            indexer.push(vec![
                [off, off],
                [off + 0.001, off],
                [off + 0.001, off + 0.001],
                [off, off + 0.001],
            ]);
        }
        let index = indexer.finish().unwrap();
        let demand = generate(&index, &DemandParams { grid_size: 3, ..Default::default() });

        let city = dir.join(code);
        write_gz_json(&city.join("buildings_index.json.gz"), &index).unwrap();
        write_gz_json(&city.join("demand_data.json.gz"), &demand).unwrap();
    }

    #[test]
    fn generated_outputs_pass_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_city(dir.path(), "TST");
        run("TST", dir.path()).unwrap();
    }

    #[test]
    fn missing_files_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run("NOPE", dir.path()).is_err());
    }

    #[test]
    fn corrupted_reference_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_city(dir.path(), "BAD");

        // break referential integrity by hand
        let path = dir.path().join("BAD").join("demand_data.json.gz");
        let mut demand: Value = read_gz_json(&path).unwrap();
        demand["pops"][0]["jobId"] = Value::String("pt_does_not_exist".into());
        write_gz_json(&path, &demand).unwrap();

        assert!(run("BAD", dir.path()).is_err());
    }
}
