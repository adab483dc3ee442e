use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::cli::{AllArgs, BuildingsArgs, Cli, DemandArgs, ServeArgs, ValidateArgs};
use crate::demand::{self, DemandParams};
use crate::index::{BuildingIndex, GridIndexer};
use crate::io::{read_gz_json, write_gz_json};
use crate::server::{self, ServerConfig};
use crate::{stream, validate};

fn city_data_dir(data_dir: &Path, code: &str) -> PathBuf {
    data_dir.join(code)
}

pub fn buildings(cli: &Cli, args: &BuildingsArgs) -> Result<()> {
    let input = args.input.clone().unwrap_or_else(|| {
        args.build_dir
            .join(&args.code)
            .join("geojson")
            .join("buildings.geojson")
    });

    if cli.verbose > 0 {
        eprintln!("[buildings] code={} cell-size={}", args.code, args.cell_size);
    }
    eprintln!("[buildings] reading {}", input.display());

    let mut indexer = GridIndexer::new(args.cell_size);
    for ring in stream::read_rings(&input)? {
        indexer.push(ring.with_context(|| format!("parse {}", input.display()))?);
    }
    eprintln!("[buildings] parsed {} buildings", indexer.len());

    let index = indexer.finish().context("build grid index")?;

    let out = city_data_dir(&args.data_dir, &args.code).join("buildings_index.json.gz");
    let bytes = write_gz_json(&out, &index)?;

    println!(
        "[buildings] done: {} buildings, {} cells, {:.1} KB gzipped -> {}",
        index.stats.count,
        index.cells.len(),
        bytes as f64 / 1024.0,
        out.display()
    );
    Ok(())
}

pub fn demand(cli: &Cli, args: &DemandArgs) -> Result<()> {
    let city_dir = city_data_dir(&args.data_dir, &args.code);
    let index_path = city_dir.join("buildings_index.json.gz");

    if cli.verbose > 0 {
        eprintln!(
            "[demand] code={} grid-size={} max-pops={} pairs-per-point={}",
            args.code, args.grid_size, args.max_pops, args.pairs_per_point
        );
    }
    eprintln!("[demand] loading {}", index_path.display());

    let index: BuildingIndex = read_gz_json(&index_path)
        .with_context(|| format!("run `citypack buildings --code {}` first", args.code))?;

    let params = DemandParams {
        grid_size: args.grid_size,
        max_pops: args.max_pops,
        pairs_per_point: args.pairs_per_point,
    };
    let data = demand::generate(&index, &params);

    let out = city_dir.join("demand_data.json.gz");
    let bytes = write_gz_json(&out, &data)?;

    println!(
        "[demand] done: {} demand points, {} pops, {:.1} KB gzipped -> {}",
        data.points.len(),
        data.pops.len(),
        bytes as f64 / 1024.0,
        out.display()
    );
    Ok(())
}

pub fn all(cli: &Cli, args: &AllArgs) -> Result<()> {
    buildings(cli, &args.buildings)?;
    demand(
        cli,
        &DemandArgs {
            code: args.buildings.code.clone(),
            grid_size: args.grid_size,
            max_pops: args.max_pops,
            pairs_per_point: args.pairs_per_point,
            data_dir: args.buildings.data_dir.clone(),
        },
    )
}

pub fn validate(_cli: &Cli, args: &ValidateArgs) -> Result<()> {
    validate::run(&args.code, &args.data_dir)
}

pub fn serve(_cli: &Cli, args: &ServeArgs) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive("info".parse().expect("invalid filter"))
                .from_env_lossy(),
        )
        .init();

    let config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        data_dir: args.data_dir.clone(),
        tiles_dir: args.tiles_dir.clone(),
        default_code: args.default_code.clone(),
    };

    tokio::runtime::Runtime::new()
        .context("start tokio runtime")?
        .block_on(server::run(config))
}
