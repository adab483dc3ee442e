use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// City data pipeline + tile server CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "citypack", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream a buildings GeoJSON file into a grid-bucketed index
    Buildings(BuildingsArgs),

    /// Derive the commuter-demand dataset from a generated index
    Demand(DemandArgs),

    /// Run `buildings` then `demand` for one city code
    All(AllArgs),

    /// Re-check schema and referential invariants of the published files
    Validate(ValidateArgs),

    /// Serve datasets and tile archives over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct BuildingsArgs {
    /// Two/three/four-letter city code, e.g. DND
    #[arg(long)]
    pub code: String,

    /// Grid cell size in degrees
    #[arg(long, default_value_t = 0.002)]
    pub cell_size: f64,

    /// Input GeoJSON (defaults to <build-dir>/<CODE>/geojson/buildings.geojson)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// Root directory of raw per-city build artifacts
    #[arg(long, default_value = "build", value_hint = ValueHint::DirPath)]
    pub build_dir: PathBuf,

    /// Root directory of published per-city data files
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    pub data_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct DemandArgs {
    /// City code whose buildings index was already generated
    #[arg(long)]
    pub code: String,

    /// Sample-grid divisions per axis (n x n demand points)
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(2..))]
    pub grid_size: u32,

    /// Global cap on generated commuter pops
    #[arg(long, default_value_t = 2000)]
    pub max_pops: usize,

    /// Job-point pairings per residential point
    #[arg(long, default_value_t = 3)]
    pub pairs_per_point: usize,

    /// Root directory of published per-city data files
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    pub data_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct AllArgs {
    #[command(flatten)]
    pub buildings: BuildingsArgs,

    /// Sample-grid divisions per axis (n x n demand points)
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(2..))]
    pub grid_size: u32,

    /// Global cap on generated commuter pops
    #[arg(long, default_value_t = 2000)]
    pub max_pops: usize,

    /// Job-point pairings per residential point
    #[arg(long, default_value_t = 3)]
    pub pairs_per_point: usize,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// City code to validate
    #[arg(long)]
    pub code: String,

    /// Root directory of published per-city data files
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    pub data_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value_t = 8081)]
    pub port: u16,

    /// Host/interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Root directory of published per-city data files
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    pub data_dir: PathBuf,

    /// Directory holding .pmtiles archives, one per city code
    #[arg(long, default_value = "tiles", value_hint = ValueHint::DirPath)]
    pub tiles_dir: PathBuf,

    /// City code tried when a bare /data/<file> request misses
    #[arg(long)]
    pub default_code: Option<String>,
}
