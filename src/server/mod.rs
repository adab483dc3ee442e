//! HTTP server for generated city data and PMTiles vector tiles.
//!
//! Serves three surfaces: gzipped dataset files under `/data/`, whole
//! `.pmtiles` archives (with byte-range support, for range-reading clients),
//! and single tiles extracted server-side at `/{code}/{z}/{x}/{y}`.

mod range;
mod tiles;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};

use range::{file_response, status_response};
pub use tiles::TileRegistry;

/// Runtime settings for [`run`].
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub tiles_dir: PathBuf,
    /// City code used to resolve bare dataset filenames under `/data/`.
    pub default_code: Option<String>,
}

struct AppState {
    data_root: PathBuf,
    tiles_root: PathBuf,
    default_code: Option<String>,
    registry: TileRegistry,
    port: u16,
}

type SharedState = Arc<AppState>;

/// Bind and serve until ctrl-c.
pub async fn run(config: ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("create {}", config.data_dir.display()))?;
    std::fs::create_dir_all(&config.tiles_dir)
        .with_context(|| format!("create {}", config.tiles_dir.display()))?;

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        registry: TileRegistry::new(config.tiles_dir.clone()),
        data_root: config.data_dir,
        tiles_root: config.tiles_dir,
        default_code: config.default_code,
        port: config.port,
    });

    tracing::info!(
        data = %state.data_root.display(),
        tiles = %state.tiles_root.display(),
        "serving city data on http://{addr}"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")
}

fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_RANGE, header::CONTENT_LENGTH, header::ACCEPT_RANGES]);

    Router::new()
        .route("/health", get(health))
        .route("/data/{*path}", get(data_file))
        .route("/server/tiles/{file}", get(archive_file))
        .route("/{file}", get(root_file))
        .route("/{code}/{z}/{x}/{y}", get(tile))
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<SharedState>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "server": "citypack",
        "port": state.port,
    }))
    .into_response()
}

/// `/data/{*path}` — dataset files. A bare filename (no slash) falls back to
/// the default city's directory when configured, so clients can request
/// `demand_data.json.gz` without knowing the code.
async fn data_file(
    State(state): State<SharedState>,
    UrlPath(rel): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let range = range_header(&headers);
    match resolve(&state.data_root, &rel) {
        Ok(path) => file_response(&path, range).await,
        Err(StatusCode::NOT_FOUND) => {
            if !rel.contains('/') {
                if let Some(code) = &state.default_code {
                    let fallback = format!("{code}/{rel}");
                    if let Ok(path) = resolve(&state.data_root, &fallback) {
                        return file_response(&path, range).await;
                    }
                }
            }
            status_response(StatusCode::NOT_FOUND)
        }
        Err(status) => status_response(status),
    }
}

/// `/server/tiles/{file}` — whole tile archives by filename.
async fn archive_file(
    State(state): State<SharedState>,
    UrlPath(file): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    match resolve(&state.tiles_root, &file) {
        Ok(path) => file_response(&path, range_header(&headers)).await,
        Err(status) => status_response(status),
    }
}

/// `/{file}` — root-level shortcut, `.pmtiles` archives only.
async fn root_file(
    State(state): State<SharedState>,
    UrlPath(file): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    if !file.ends_with(".pmtiles") {
        return status_response(StatusCode::NOT_FOUND);
    }
    match resolve(&state.tiles_root, &file) {
        Ok(path) => file_response(&path, range_header(&headers)).await,
        Err(status) => status_response(status),
    }
}

/// `/{code}/{z}/{x}/{y}` — extract one vector tile from the city's archive.
/// `y` may carry a `.mvt` suffix. Unparseable coordinates and unknown codes
/// are plain 404s; archive failures are 500s with the error logged.
async fn tile(
    State(state): State<SharedState>,
    UrlPath((code, z, x, y)): UrlPath<(String, String, String, String)>,
) -> Response {
    let valid_code =
        (2..=4).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic());
    let z = z.parse::<u8>().ok();
    let x = x.parse::<u64>().ok();
    let y = y.strip_suffix(".mvt").unwrap_or(&y).parse::<u64>().ok();
    let (Some(z), Some(x), Some(y), true) = (z, x, y, valid_code) else {
        return status_response(StatusCode::NOT_FOUND);
    };

    let shared = state.clone();
    let city = code.clone();
    let result =
        tokio::task::spawn_blocking(move || shared.registry.tile(&city, z, x, y)).await;

    match result {
        Ok(Ok(Some((bytes, encoding)))) => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/vnd.mapbox-vector-tile");
            if let Some(encoding) = encoding {
                builder = builder.header(header::CONTENT_ENCODING, encoding);
            }
            builder.body(Body::from(bytes)).expect("static response headers")
        }
        Ok(Ok(None)) => status_response(StatusCode::NOT_FOUND),
        Ok(Err(err)) => {
            tracing::error!(%code, z, x, y, error = %format!("{err:#}"), "tile extraction failed");
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(err) => {
            tracing::error!(error = %err, "tile task panicked");
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::RANGE).and_then(|value| value.to_str().ok())
}

/// Join `rel` onto `root` and canonicalize, rejecting any path that escapes
/// the root. Missing files are 404; escapes are 403.
fn resolve(root: &Path, rel: &str) -> Result<PathBuf, StatusCode> {
    let joined = root.join(rel.trim_start_matches('/'));
    let resolved = joined.canonicalize().map_err(|_| StatusCode::NOT_FOUND)?;
    let root = root.canonicalize().map_err(|_| StatusCode::NOT_FOUND)?;
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        tracing::warn!(path = rel, "rejected path outside served directory");
        Err(StatusCode::FORBIDDEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use pmtiles2::util::tile_id;
    use pmtiles2::{Compression, PMTiles, TileType};
    use std::io::Cursor;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        _data: TempDir,
        _tiles: TempDir,
    }

    fn fixture(default_code: Option<&str>) -> Fixture {
        let data = tempfile::tempdir().unwrap();
        let tiles = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState {
            registry: TileRegistry::new(tiles.path().to_path_buf()),
            data_root: data.path().to_path_buf(),
            tiles_root: tiles.path().to_path_buf(),
            default_code: default_code.map(str::to_owned),
            port: 8081,
        });
        Fixture { app: router(state), _data: data, _tiles: tiles }
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn get_with_range(uri: &str, range: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .header(header::RANGE, range)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    fn write_archive(dir: &Path, code: &str) {
        let mut pm = PMTiles::new(TileType::Mvt, Compression::None);
        pm.add_tile(tile_id(10, 1, 2), b"tile-bytes".to_vec()).unwrap();
        let mut out = Cursor::new(Vec::new());
        pm.to_writer(&mut out).unwrap();
        std::fs::write(dir.join(format!("{code}.pmtiles")), out.into_inner()).unwrap();
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let fx = fixture(None);
        let response = fx.app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["port"], 8081);
    }

    #[tokio::test]
    async fn preflight_allows_any_origin() {
        let fx = fixture(None);
        let request = axum::http::Request::builder()
            .method(axum::http::Method::OPTIONS)
            .uri("/data/DND/demand_data.json.gz")
            .header(header::ORIGIN, "https://game.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();

        let response = fx.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn single_and_four_segment_routes_coexist() {
        // one router instance must answer the static route, the one-segment
        // archive shortcut, and the four-segment tile route
        let fx = fixture(None);
        write_archive(fx._tiles.path(), "TST");

        let response = fx.app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = fx.app.clone().oneshot(get_request("/TST.pmtiles")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = fx.app.oneshot(get_request("/TST/10/1/2.mvt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn serves_partial_content_for_bounded_range() {
        let fx = fixture(None);
        std::fs::write(fx._data.path().join("blob.bin"), vec![7u8; 500]).unwrap();

        let response = fx
            .app
            .oneshot(get_with_range("/data/blob.bin", "bytes=0-99"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 0-99/500"
        );
        assert_eq!(body_bytes(response).await.len(), 100);
    }

    #[tokio::test]
    async fn serves_open_ended_range_to_eof() {
        let fx = fixture(None);
        std::fs::write(fx._data.path().join("blob.bin"), vec![7u8; 500]).unwrap();

        let response = fx
            .app
            .oneshot(get_with_range("/data/blob.bin", "bytes=450-"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 450-499/500"
        );
        assert_eq!(body_bytes(response).await.len(), 50);
    }

    #[tokio::test]
    async fn malformed_range_is_416_with_total() {
        let fx = fixture(None);
        std::fs::write(fx._data.path().join("blob.bin"), vec![7u8; 500]).unwrap();

        let response = fx
            .app
            .oneshot(get_with_range("/data/blob.bin", "bytes=oops-"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */500");
    }

    #[tokio::test]
    async fn full_read_advertises_range_support() {
        let fx = fixture(None);
        std::fs::create_dir_all(fx._data.path().join("DND")).unwrap();
        std::fs::write(fx._data.path().join("DND/demand_data.json.gz"), b"gzdata").unwrap();

        let response = fx
            .app
            .oneshot(get_request("/data/DND/demand_data.json.gz"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(body_bytes(response).await, b"gzdata");
    }

    #[tokio::test]
    async fn bare_filename_falls_back_to_default_code() {
        let fx = fixture(Some("DND"));
        std::fs::create_dir_all(fx._data.path().join("DND")).unwrap();
        std::fs::write(fx._data.path().join("DND/demand_data.json.gz"), b"gzdata").unwrap();

        let response = fx
            .app
            .oneshot(get_request("/data/demand_data.json.gz"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"gzdata");
    }

    #[tokio::test]
    async fn path_escaping_data_root_is_forbidden() {
        let fx = fixture(None);
        let outside = fx._data.path().parent().unwrap().join("escape-target.txt");
        std::fs::write(&outside, b"secret").unwrap();

        let response = fx
            .app
            .oneshot(get_request("/data/../escape-target.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        std::fs::remove_file(outside).ok();
    }

    #[tokio::test]
    async fn root_serves_only_pmtiles() {
        let fx = fixture(None);
        write_archive(fx._tiles.path(), "DND");
        std::fs::write(fx._tiles.path().join("notes.txt"), b"nope").unwrap();

        let response = fx.app.clone().oneshot(get_request("/DND.pmtiles")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");

        let response = fx.app.oneshot(get_request("/notes.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn archive_route_serves_by_filename() {
        let fx = fixture(None);
        write_archive(fx._tiles.path(), "DND");

        let response = fx
            .app
            .oneshot(get_request("/server/tiles/DND.pmtiles"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn extracts_tile_and_404s_absent_tile() {
        let fx = fixture(None);
        write_archive(fx._tiles.path(), "TST");

        let response = fx.app.clone().oneshot(get_request("/TST/10/1/2.mvt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.mapbox-vector-tile"
        );
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body_bytes(response).await, b"tile-bytes");

        let response = fx.app.oneshot(get_request("/TST/10/1/3.mvt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tile_route_rejects_bad_code_and_coords() {
        let fx = fixture(None);
        write_archive(fx._tiles.path(), "TST");

        for uri in ["/TOOLONGCODE/10/1/2.mvt", "/T2T/10/1/2.mvt", "/TST/zoom/1/2.mvt", "/TST/10/1/two.mvt"] {
            let response = fx.app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn unknown_city_tile_is_404() {
        let fx = fixture(None);
        let response = fx.app.oneshot(get_request("/ZZZ/10/1/2.mvt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
