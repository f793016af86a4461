//! FileServer: the catch-all chain and prod-static file resolution
//! (`spec.md` §4.5).

use std::path::{Path, PathBuf};

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{header, Response, StatusCode};
use hyper_staticfile::Static;

use crate::app::body::{empty_body, full_body, ResponseBody};
use crate::config::{FilePaths, ServerEnvironment};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::prefixer::RoutePrefixer;
use crate::redirect::RedirectEngine;

/// Serves the compiled script, the dev extra-handler disk lookup, and the
/// index-page fallback that make up steps 1, 3 and 5 of the catch-all chain.
pub struct FileServer {
    environment: ServerEnvironment,
    compiled_script_path: PathBuf,
    compiled_script_name: String,
    content_root: PathBuf,
    index_path: PathBuf,
}

impl FileServer {
    /// Builds a file server for the given environment's file paths. The
    /// index page is `content_root/index.html`, matching the dev/prod build
    /// output layout.
    pub fn new(environment: ServerEnvironment, paths: &FilePaths) -> Self {
        let compiled_script_name = paths
            .compiled_script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            environment,
            compiled_script_path: paths.compiled_script.clone(),
            compiled_script_name,
            content_root: paths.content_root.clone(),
            index_path: paths.content_root.join("index.html"),
        }
    }

    /// Step 1: if the tail's last segment is the compiled script's file name
    /// or `<script>.map`, serves that file verbatim.
    async fn script_file(&self, tail: &str) -> Option<Result<Response<ResponseBody>, RuntimeError>> {
        let last_segment = tail.rsplit('/').next().unwrap_or(tail);
        let map_name = format!("{}.map", self.compiled_script_name);

        if last_segment == self.compiled_script_name {
            Some(self.read_file(&self.compiled_script_path, "application/javascript").await)
        } else if last_segment == map_name {
            let map_path = self
                .compiled_script_path
                .with_extension(format!(
                    "{}.map",
                    self.compiled_script_path
                        .extension()
                        .map(|e| e.to_string_lossy().into_owned())
                        .unwrap_or_default()
                ));
            Some(self.read_file(&map_path, "application/json").await)
        } else {
            None
        }
    }

    /// Step 3 (dev only): resolves `content_root + tail` on disk and serves
    /// it if it exists and is a regular file.
    async fn extra_handler(&self, tail: &str) -> Option<Result<Response<ResponseBody>, RuntimeError>> {
        if self.environment != ServerEnvironment::Dev {
            return None;
        }
        let candidate = self.content_root.join(tail.trim_start_matches('/'));
        match tokio::fs::metadata(&candidate).await {
            Ok(meta) if meta.is_file() => {
                let content_type = mime_guess::from_path(&candidate)
                    .first_or_octet_stream()
                    .to_string();
                Some(self.read_file(&candidate, &content_type).await)
            }
            _ => None,
        }
    }

    /// Step 4: whether the `Accept` header admits `text/html`.
    pub fn accepts_html(accept_header: Option<&str>) -> bool {
        accept_header.is_some_and(|h| h.contains("text/html") || h.contains("*/*"))
    }

    /// Step 5: serves the configured index HTML file.
    async fn index_fallback(&self) -> Result<Response<ResponseBody>, RuntimeError> {
        self.read_file(&self.index_path, "text/html").await
    }

    async fn read_file(&self, path: &Path, content_type: &str) -> Result<Response<ResponseBody>, RuntimeError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RuntimeError::new(
                RuntimeErrorKind::ResourceMissing,
                format!("could not read {}: {}", path.display(), e),
            )
        })?;
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .body(full_body(bytes))
            .map_err(|e| RuntimeError::new(RuntimeErrorKind::ResourceMissing, e.to_string()))
    }

    /// Runs the full five-step catch-all chain for one request.
    ///
    /// `tail` is the captured path after the route prefix, without a
    /// leading slash. `accept_header` is the request's raw `Accept` value.
    pub async fn catch_all(
        &self,
        tail: &str,
        accept_header: Option<&str>,
        redirects: &RedirectEngine,
        prefixer: &RoutePrefixer,
    ) -> Result<Response<ResponseBody>, RuntimeError> {
        if let Some(result) = self.script_file(tail).await {
            return result;
        }

        let canonical = format!("/{}", tail.trim_start_matches('/'));
        if let Some(rewritten) = redirects.resolve(&canonical) {
            return Ok(redirect_response(&prefixer.join(&rewritten)));
        }

        if let Some(result) = self.extra_handler(tail).await {
            return result;
        }

        if !Self::accepts_html(accept_header) {
            return Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(empty_body())
                .unwrap());
        }

        self.index_fallback().await
    }
}

/// Builds a `301 Moved Permanently` response to `location` (`spec.md` §6).
pub fn redirect_response(location: &str) -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .body(empty_body())
        .unwrap()
}

/// Serves a prod-static site: `.html` extension resolution, `404.html`
/// default, plus the redirect engine as the only dynamic element.
pub struct StaticSiteHandler {
    site_root: PathBuf,
}

impl StaticSiteHandler {
    /// Builds a handler rooted at `site_root`.
    pub fn new(site_root: PathBuf) -> Self {
        Self { site_root }
    }

    /// Resolves `request_path` against the site root, trying the literal
    /// path, then `path.html`, before falling back to `404.html`.
    pub async fn serve(&self, request_path: &str) -> Result<Response<ResponseBody>, RuntimeError> {
        let trimmed = request_path.trim_start_matches('/');
        let literal = self.site_root.join(trimmed);
        if let Some(response) = self.try_serve_file(&literal).await {
            return response;
        }

        let with_html = self.site_root.join(format!("{}.html", trimmed));
        if let Some(response) = self.try_serve_file(&with_html).await {
            return response;
        }

        let not_found = self.site_root.join("404.html");
        match tokio::fs::read(&not_found).await {
            Ok(bytes) => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .header(header::CONTENT_TYPE, "text/html")
                .body(full_body(bytes))
                .unwrap()),
            Err(_) => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(empty_body())
                .unwrap()),
        }
    }

    async fn try_serve_file(&self, path: &Path) -> Option<Result<Response<ResponseBody>, RuntimeError>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {
                let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
                match tokio::fs::read(path).await {
                    Ok(bytes) => Some(Ok(Response::builder()
                        .status(StatusCode::OK)
                        .header(header::CONTENT_TYPE, content_type)
                        .body(full_body(bytes))
                        .unwrap())),
                    Err(e) => Some(Err(RuntimeError::new(RuntimeErrorKind::ResourceMissing, e.to_string()))),
                }
            }
            _ => None,
        }
    }
}

/// Serves a file tree with ETag/If-None-Match 304 handling and
/// `Cache-Control`/`X-Served-By` headers, mounted at `mount_root` (grounded
/// on `hyper_staticfile::Static` usage in the teacher's
/// `serve_static_with_headers`).
pub async fn serve_mounted<B>(
    req: hyper::Request<B>,
    mount_root: &str,
    fs_root: &Path,
) -> Result<Response<ResponseBody>, std::io::Error>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (mut parts, body) = req.into_parts();
    let original_path = parts.uri.path().to_string();
    let if_none_match = parts
        .headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let trimmed_path = if mount_root == "/" {
        original_path.as_str()
    } else if let Some(rest) = original_path.strip_prefix(mount_root) {
        if rest.is_empty() {
            "/"
        } else {
            rest
        }
    } else {
        original_path.as_str()
    };

    let new_path_and_query = match parts.uri.query() {
        Some(query) => format!("{}?{}", trimmed_path, query),
        None => trimmed_path.to_string(),
    };
    parts.uri = new_path_and_query
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;

    let rewritten = hyper::Request::from_parts(parts, body);
    let static_service = Static::new(fs_root);

    let mut response = static_service.serve(rewritten).await?;
    response
        .headers_mut()
        .insert("Cache-Control", "public, max-age=86400".parse().unwrap());
    response
        .headers_mut()
        .insert("X-Served-By", "hyper-staticfile".parse().unwrap());

    if let Some(request_etag) = if_none_match {
        if let Some(etag) = response.headers().get(header::ETAG) {
            if etag.to_str().ok() == Some(request_etag.as_str()) {
                let mut builder = Response::builder().status(StatusCode::NOT_MODIFIED);
                if let Some(h) = builder.headers_mut() {
                    for (k, v) in response.headers().iter() {
                        h.insert(k.clone(), v.clone());
                    }
                    h.remove(header::CONTENT_LENGTH);
                }
                return Ok(builder.body(empty_body()).unwrap());
            }
        }
    }

    let (parts, body) = response.into_parts();
    let collected = body
        .collect()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("{e}")))?;
    Ok(Response::from_parts(parts, full_body(collected.to_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_html_matches_html_and_wildcard() {
        assert!(FileServer::accepts_html(Some("text/html,application/xml")));
        assert!(FileServer::accepts_html(Some("*/*")));
        assert!(!FileServer::accepts_html(Some("image/*")));
        assert!(!FileServer::accepts_html(None));
    }

    #[test]
    fn redirect_response_carries_location_and_status() {
        let response = redirect_response("/v2/alpha");
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/v2/alpha");
    }

    #[tokio::test]
    async fn static_site_handler_falls_back_to_404_html() {
        let dir = std::env::temp_dir().join(format!("sitecore-runtime-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("404.html"), b"nope").await.unwrap();

        let handler = StaticSiteHandler::new(dir.clone());
        let response = handler.serve("/missing").await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
