//! RoutingAssembler: wires `SiteConfig`, environment, layout and an
//! optional bundle into one of four route maps (`spec.md` §4.7).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::{header, Method, Request, Response, StatusCode};
use routerify_ng::{ext::RequestExt, Router};
use tokio_tungstenite::WebSocketStream;

use crate::app::api_error::ApiError;
use crate::app::body::{empty_body, full_body, ResponseBody};
use crate::bundle::Bundle;
use crate::config::{FilePaths, ServerEnvironment, ServerGlobals, SiteConfig, SiteLayout};
use crate::dispatch::ApiDispatcher;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::files::{redirect_response, FileServer, StaticSiteHandler};
use crate::neutral::{into_hyper_response, neutral_request_from_hyper};
use crate::prefixer::RoutePrefixer;
use crate::redirect::RedirectEngine;
use crate::statusfeed;
use crate::streams::multiplexer::StreamMultiplexer;
use crate::streams::registry::StreamRegistry;

const ALL_API_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// Builds the `routerify_ng` router for one of the four assemblies named in
/// `spec.md` §4.7.
pub struct RoutingAssembler;

impl RoutingAssembler {
    /// Assembles the router for `(environment, layout)`.
    pub fn build(
        environment: ServerEnvironment,
        layout: SiteLayout,
        config: Arc<SiteConfig>,
        bundle: Option<Arc<dyn Bundle>>,
        globals: Arc<ServerGlobals>,
    ) -> Result<Router<ApiError>, RuntimeError> {
        let paths = config.paths_for(environment).clone();
        let prefixer = Arc::new(RoutePrefixer::new(&config.base_path));

        match (environment, layout) {
            (ServerEnvironment::Dev, SiteLayout::Fullstack) => {
                Self::validate_prerequisites(&paths, false)?;
                Self::dev_assembly(config, paths, prefixer, bundle, globals)
            }
            (ServerEnvironment::Dev, SiteLayout::Static) => {
                Self::dev_assembly(config, paths, prefixer, None, globals)
            }
            (ServerEnvironment::Prod, SiteLayout::Fullstack) => {
                Self::validate_prerequisites(&paths, true)?;
                Self::prod_fullstack_assembly(config, paths, prefixer, bundle)
            }
            (ServerEnvironment::Prod, SiteLayout::Static) => {
                Self::prod_static_assembly(config, paths)
            }
        }
    }

    /// Checks the prerequisites for a fullstack assembly: the site root must
    /// exist, and (in prod) carry a `system/` subfolder — its absence means
    /// the site was exported as static.
    fn validate_prerequisites(paths: &FilePaths, require_system_subfolder: bool) -> Result<(), RuntimeError> {
        if !paths.site_root.exists() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Configuration,
                format!("site root not found at {}", paths.site_root.display()),
            ));
        }
        if require_system_subfolder && !paths.site_root.join("system").exists() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Configuration,
                format!(
                    "{} has no system/ subfolder; this looks like a static export \
                     — rebuild in fullstack mode or set the static layout",
                    paths.site_root.display()
                ),
            ));
        }
        Ok(())
    }

    /// DEV + FULLSTACK and DEV + STATIC (the latter with `bundle: None`):
    /// StatusFeed, API dispatch and stream multiplexer when a bundle is
    /// present, catch-all with the dev extra-handler.
    fn dev_assembly(
        config: Arc<SiteConfig>,
        paths: FilePaths,
        prefixer: Arc<RoutePrefixer>,
        bundle: Option<Arc<dyn Bundle>>,
        globals: Arc<ServerGlobals>,
    ) -> Result<Router<ApiError>, RuntimeError> {
        let redirects = Arc::new(RedirectEngine::new(&config.redirects)?);
        let file_server = Arc::new(FileServer::new(ServerEnvironment::Dev, &paths));
        let port = config.port;

        let mut builder = Router::<ApiError>::builder()
            .middleware(crate::middlewares::logger::pre())
            .middleware(crate::middlewares::logger::post());

        builder = Self::mount_status_feed(builder, &prefixer, globals);

        if let Some(bundle) = bundle {
            let dispatcher = Arc::new(ApiDispatcher::new(bundle.clone(), ServerEnvironment::Dev));
            builder = Self::mount_api_dispatch(builder, &prefixer, dispatcher, port);

            let registry = Arc::new(StreamRegistry::new());
            let multiplexer = Arc::new(StreamMultiplexer::new(
                registry,
                bundle,
                config.streaming_config,
                ServerEnvironment::Dev,
            ));
            builder = Self::mount_stream_multiplexer(builder, &prefixer, multiplexer);
        }

        builder = Self::mount_catch_all(builder, &prefixer, file_server, redirects);

        builder
            .build()
            .map_err(|e| RuntimeError::new(RuntimeErrorKind::Configuration, e.to_string()))
    }

    /// PROD + FULLSTACK: API dispatch and stream multiplexer (the latter
    /// only if the bundle declares at least one stream route), explicit
    /// resource/page routes, catch-all with index fallback.
    fn prod_fullstack_assembly(
        config: Arc<SiteConfig>,
        paths: FilePaths,
        prefixer: Arc<RoutePrefixer>,
        bundle: Option<Arc<dyn Bundle>>,
    ) -> Result<Router<ApiError>, RuntimeError> {
        let redirects = Arc::new(RedirectEngine::new(&config.redirects)?);
        let file_server = Arc::new(FileServer::new(ServerEnvironment::Prod, &paths));
        let port = config.port;

        let mut builder = Router::<ApiError>::builder()
            .middleware(crate::middlewares::logger::pre())
            .middleware(crate::middlewares::logger::post());

        if let Some(bundle) = &bundle {
            let dispatcher = Arc::new(ApiDispatcher::new(bundle.clone(), ServerEnvironment::Prod));
            builder = Self::mount_api_dispatch(builder, &prefixer, dispatcher, port);

            if bundle.num_api_streams() > 0 {
                let registry = Arc::new(StreamRegistry::new());
                let multiplexer = Arc::new(StreamMultiplexer::new(
                    registry,
                    bundle.clone(),
                    config.streaming_config,
                    ServerEnvironment::Prod,
                ));
                builder = Self::mount_stream_multiplexer(builder, &prefixer, multiplexer);
            }
        }

        builder = Self::mount_explicit_site_routes(builder, &prefixer, &paths.site_root)?;
        builder = Self::mount_catch_all(builder, &prefixer, file_server, redirects);

        builder
            .build()
            .map_err(|e| RuntimeError::new(RuntimeErrorKind::Configuration, e.to_string()))
    }

    /// PROD + STATIC: a static file handler rooted at `site_root`, plus the
    /// redirect engine as the only dynamic element.
    fn prod_static_assembly(config: Arc<SiteConfig>, paths: FilePaths) -> Result<Router<ApiError>, RuntimeError> {
        let redirects = Arc::new(RedirectEngine::new(&config.redirects)?);
        let prefixer = Arc::new(RoutePrefixer::new(&config.base_path));
        let handler = Arc::new(StaticSiteHandler::new(paths.site_root.clone()));

        let pattern = prefixer.join("*");
        let handler = handler.clone();
        let redirects_clone = redirects.clone();
        let prefixer_clone = prefixer.clone();

        let builder = Router::<ApiError>::builder()
            .middleware(crate::middlewares::logger::pre())
            .middleware(crate::middlewares::logger::post())
            .get(pattern, move |req: Request<hyper::body::Incoming>| {
            let handler = handler.clone();
            let redirects = redirects_clone.clone();
            let prefixer = prefixer_clone.clone();
            async move {
                let path = req.uri().path().to_string();
                if let Some(rewritten) = redirects.resolve(&path) {
                    return Ok(redirect_response(&prefixer.join(&rewritten)));
                }
                handler
                    .serve(&path)
                    .await
                    .map_err(ApiError::from)
            }
        });

        builder
            .build()
            .map_err(|e| RuntimeError::new(RuntimeErrorKind::Configuration, e.to_string()))
    }

    fn mount_status_feed(
        builder: routerify_ng::RouterBuilder<ApiError>,
        prefixer: &RoutePrefixer,
        globals: Arc<ServerGlobals>,
    ) -> routerify_ng::RouterBuilder<ApiError> {
        let pattern = prefixer.join("api/kobweb-status");
        builder.get(pattern, move |_req: Request<hyper::body::Incoming>| {
            let globals = globals.clone();
            async move {
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "text/event-stream")
                    .header(header::CACHE_CONTROL, "no-cache")
                    .body(statusfeed::response_body(globals))
                    .unwrap())
            }
        })
    }

    fn mount_api_dispatch(
        builder: routerify_ng::RouterBuilder<ApiError>,
        prefixer: &RoutePrefixer,
        dispatcher: Arc<ApiDispatcher>,
        port: u16,
    ) -> routerify_ng::RouterBuilder<ApiError> {
        let pattern = prefixer.join("api/*");
        let api_root = prefixer.join("api");

        builder.add(pattern, ALL_API_METHODS.to_vec(), move |req: Request<hyper::body::Incoming>| {
            let dispatcher = dispatcher.clone();
            let api_root = api_root.clone();
            async move {
                let api_path = req
                    .uri()
                    .path()
                    .strip_prefix(&api_root)
                    .unwrap_or(req.uri().path())
                    .to_string();
                let method = req.method().clone();
                let remote_addr = req.remote_addr();
                let bind_addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();

                let neutral = neutral_request_from_hyper(req, "http", bind_addr, remote_addr, bind_addr)
                    .await
                    .map_err(ApiError::from)?;

                let mut response = dispatcher.dispatch(&api_path, neutral).await;
                if method == Method::HEAD {
                    response = response.for_method(crate::neutral::HttpMethod::Head);
                }
                into_hyper_response(response).map_err(|e| ApiError::status(500, e.to_string()))
            }
        })
    }

    fn mount_stream_multiplexer(
        builder: routerify_ng::RouterBuilder<ApiError>,
        prefixer: &RoutePrefixer,
        multiplexer: Arc<StreamMultiplexer>,
    ) -> routerify_ng::RouterBuilder<ApiError> {
        let pattern = prefixer.join("api/kobweb-streams");
        builder.get(pattern, move |req: Request<hyper::body::Incoming>| {
            let multiplexer = multiplexer.clone();
            async move { handle_websocket_upgrade(req, multiplexer) }
        })
    }

    fn mount_explicit_site_routes(
        mut builder: routerify_ng::RouterBuilder<ApiError>,
        prefixer: &RoutePrefixer,
        content_root: &Path,
    ) -> Result<routerify_ng::RouterBuilder<ApiError>, RuntimeError> {
        for subdir in ["resources", "pages"] {
            let root = content_root.join(subdir);
            if !root.exists() {
                continue;
            }
            for file in walk_files(&root) {
                let relative = file.strip_prefix(&root).unwrap();
                let url_tail = relative.to_string_lossy().replace('\\', "/");
                let is_page = subdir == "pages";

                let route = prefixer.join(&format!("{subdir}/{url_tail}"));
                builder = Self::mount_static_file(builder, &route, file.clone());

                if is_page {
                    if let Some(without_html) = url_tail.strip_suffix(".html") {
                        if without_html == "index" {
                            let route = prefixer.join("");
                            builder = Self::mount_static_file(builder, &route, file.clone());
                        } else if let Some(dir) = without_html.strip_suffix("/index") {
                            let route = prefixer.join(&format!("{dir}/"));
                            builder = Self::mount_static_file(builder, &route, file.clone());
                        } else {
                            let route = prefixer.join(without_html);
                            builder = Self::mount_static_file(builder, &route, file);
                        }
                    }
                }
            }
        }
        Ok(builder)
    }

    fn mount_static_file(
        builder: routerify_ng::RouterBuilder<ApiError>,
        route: &str,
        file: PathBuf,
    ) -> routerify_ng::RouterBuilder<ApiError> {
        builder.get(route.to_string(), move |_req: Request<hyper::body::Incoming>| {
            let file = file.clone();
            async move {
                let content_type = mime_guess::from_path(&file).first_or_octet_stream().to_string();
                match tokio::fs::read(&file).await {
                    Ok(bytes) => Ok(Response::builder()
                        .status(StatusCode::OK)
                        .header(header::CONTENT_TYPE, content_type)
                        .body(full_body(bytes))
                        .unwrap()),
                    Err(_) => Ok(Response::builder()
                        .status(StatusCode::NOT_FOUND)
                        .body(empty_body())
                        .unwrap()),
                }
            }
        })
    }

    fn mount_catch_all(
        builder: routerify_ng::RouterBuilder<ApiError>,
        prefixer: &RoutePrefixer,
        file_server: Arc<FileServer>,
        redirects: Arc<RedirectEngine>,
    ) -> routerify_ng::RouterBuilder<ApiError> {
        let pattern = prefixer.join("*");
        let root = prefixer.join("");
        let prefixer = Arc::new(prefixer.clone());

        builder.get(pattern, move |req: Request<hyper::body::Incoming>| {
            let file_server = file_server.clone();
            let redirects = redirects.clone();
            let prefixer = prefixer.clone();
            let root = root.clone();
            async move {
                let tail = req.uri().path().strip_prefix(&root).unwrap_or(req.uri().path());
                let accept = req
                    .headers()
                    .get(header::ACCEPT)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                file_server
                    .catch_all(tail, accept.as_deref(), &redirects, &prefixer)
                    .await
                    .map_err(ApiError::from)
            }
        })
    }
}

fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

/// Validates the websocket handshake headers and upgrades the connection,
/// spawning a task that runs the multiplexer over the upgraded stream
/// (grounded on the teacher's `ApiError::WebSocketUpgrade` carrying an
/// in-flight `101` response untouched past the error handler).
fn handle_websocket_upgrade(
    mut req: Request<hyper::body::Incoming>,
    multiplexer: Arc<StreamMultiplexer>,
) -> Result<Response<ResponseBody>, ApiError> {
    let key = req
        .headers()
        .get("sec-websocket-key")
        .ok_or_else(|| ApiError::status(400, "missing Sec-WebSocket-Key"))?
        .as_bytes()
        .to_vec();
    let accept_key = tungstenite::handshake::derive_accept_key(&key);

    let response = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header("Sec-WebSocket-Accept", accept_key)
        .body(empty_body())
        .map_err(|e| ApiError::status(500, e.to_string()))?;

    tokio::spawn(async move {
        match hyper::upgrade::on(&mut req).await {
            Ok(upgraded) => {
                let io = hyper_util::rt::TokioIo::new(upgraded);
                let ws = WebSocketStream::from_raw_socket(io, tungstenite::protocol::Role::Server, None).await;
                multiplexer.run(ws).await;
            }
            Err(err) => {
                tracing::error!(error = %err, "websocket upgrade failed");
            }
        }
    });

    Ok(ApiError::WebSocketUpgrade(response).into_response())
}

impl ApiError {
    fn into_response(self) -> Response<ResponseBody> {
        match self {
            ApiError::Generic(response) | ApiError::WebSocketUpgrade(response) => response,
        }
    }
}
