//! End-to-end checks for `RoutingAssembler::build` across the four
//! `(environment, layout)` combinations, using a real temp-dir file tree
//! rather than mocked filesystem calls.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use sitecore_runtime::{
    Bundle, BundleError, RuntimeErrorKind, ServerEnvironment, ServerGlobals, SiteLayout,
    StreamEvent, StreamHandle,
};
use sitecore_runtime::assembler::RoutingAssembler;
use sitecore_runtime::config::{FilePaths, SiteConfig, StreamingConfig};
use sitecore_runtime::neutral::{NeutralRequest, NeutralResponse};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct EchoBundle;

impl Bundle for EchoBundle {
    fn handle_request(
        &self,
        api_path: &str,
        _request: NeutralRequest,
    ) -> BoxFuture<'_, Result<Option<NeutralResponse>, BundleError>> {
        let api_path = api_path.to_string();
        Box::pin(async move {
            if api_path == "/echo" {
                Ok(Some(NeutralResponse::text(200, "ok")))
            } else {
                Ok(None)
            }
        })
    }

    fn handle_stream_event(
        &self,
        _event: StreamEvent,
        _handle: &dyn StreamHandle,
    ) -> BoxFuture<'_, Result<(), BundleError>> {
        Box::pin(async { Ok(()) })
    }

    fn num_api_streams(&self) -> usize {
        1
    }
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sitecore-runtime-assembler-test-{}-{}", std::process::id(), name))
}

async fn write_file(path: &Path, contents: &str) {
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(path, contents).await.unwrap();
}

fn site_config(dev_paths: FilePaths, prod_paths: FilePaths) -> Arc<SiteConfig> {
    Arc::new(SiteConfig {
        title: "test site".to_string(),
        base_path: String::new(),
        port: 0,
        redirects: Vec::new(),
        streaming_config: StreamingConfig {
            ping_period: std::time::Duration::from_secs(30),
            timeout: std::time::Duration::from_secs(5),
        },
        native_library_mappings: BTreeMap::new(),
        dev_paths,
        prod_paths,
    })
}

#[tokio::test]
async fn dev_fullstack_builds_without_a_system_subfolder() {
    let root = temp_dir("dev-fullstack");
    write_file(&root.join("index.html"), "<html></html>").await;
    write_file(&root.join("app.js"), "console.log(1)").await;

    let paths = FilePaths {
        content_root: root.clone(),
        compiled_script: root.join("app.js"),
        api_bundle: None,
        site_root: root.clone(),
    };
    let config = site_config(paths.clone(), paths);

    let router = RoutingAssembler::build(
        ServerEnvironment::Dev,
        SiteLayout::Fullstack,
        config,
        Some(Arc::new(EchoBundle)),
        Arc::new(ServerGlobals::new()),
    );

    assert!(router.is_ok(), "dev fullstack assembly should not require a system/ subfolder");

    tokio::fs::remove_dir_all(&root).await.ok();
}

#[tokio::test]
async fn prod_fullstack_rejects_a_site_root_missing_the_system_subfolder() {
    let root = temp_dir("prod-fullstack-missing-system");
    write_file(&root.join("index.html"), "<html></html>").await;

    let paths = FilePaths {
        content_root: root.clone(),
        compiled_script: root.join("app.js"),
        api_bundle: None,
        site_root: root.clone(),
    };
    let config = site_config(paths.clone(), paths);

    let err = RoutingAssembler::build(
        ServerEnvironment::Prod,
        SiteLayout::Fullstack,
        config,
        Some(Arc::new(EchoBundle)),
        Arc::new(ServerGlobals::new()),
    )
    .expect_err("a prod fullstack site root without system/ looks like a static export");

    assert_eq!(err.kind(), RuntimeErrorKind::Configuration);

    tokio::fs::remove_dir_all(&root).await.ok();
}

#[tokio::test]
async fn prod_fullstack_builds_once_the_system_subfolder_exists() {
    let root = temp_dir("prod-fullstack-ok");
    write_file(&root.join("index.html"), "<html></html>").await;
    write_file(&root.join("system/marker"), "present").await;
    write_file(&root.join("pages/about.html"), "<html>about</html>").await;
    write_file(&root.join("resources/logo.svg"), "<svg/>").await;

    let paths = FilePaths {
        content_root: root.clone(),
        compiled_script: root.join("app.js"),
        api_bundle: None,
        site_root: root.clone(),
    };
    let config = site_config(paths.clone(), paths);

    let router = RoutingAssembler::build(
        ServerEnvironment::Prod,
        SiteLayout::Fullstack,
        config,
        Some(Arc::new(EchoBundle)),
        Arc::new(ServerGlobals::new()),
    );

    assert!(router.is_ok());

    tokio::fs::remove_dir_all(&root).await.ok();
}

#[tokio::test]
async fn prod_static_builds_with_no_bundle_and_no_prerequisite_check() {
    let root = temp_dir("prod-static");
    write_file(&root.join("index.html"), "<html></html>").await;

    let paths = FilePaths {
        content_root: root.clone(),
        compiled_script: root.join("app.js"),
        api_bundle: None,
        site_root: root.clone(),
    };
    let config = site_config(paths.clone(), paths);

    let router = RoutingAssembler::build(
        ServerEnvironment::Prod,
        SiteLayout::Static,
        config,
        None,
        Arc::new(ServerGlobals::new()),
    );

    assert!(router.is_ok());

    tokio::fs::remove_dir_all(&root).await.ok();
}

#[tokio::test]
async fn dev_fullstack_rejects_a_missing_site_root() {
    let root = temp_dir("dev-missing-root-never-created");

    let paths = FilePaths {
        content_root: root.clone(),
        compiled_script: root.join("app.js"),
        api_bundle: None,
        site_root: root.clone(),
    };
    let config = site_config(paths.clone(), paths);

    let err = RoutingAssembler::build(
        ServerEnvironment::Dev,
        SiteLayout::Fullstack,
        config,
        Some(Arc::new(EchoBundle)),
        Arc::new(ServerGlobals::new()),
    )
    .expect_err("a nonexistent site root must fail validation even in dev");

    assert_eq!(err.kind(), RuntimeErrorKind::Configuration);
}
