use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use palisade::authz::web::{self, AppState};
use palisade::authz::{loader, Policy, PolicyStore, PredicateRegistry};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Temporary directory of `.kdl` policy files
pub struct PolicyDir {
    dir: TempDir,
}

impl PolicyDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn with_file(self, name: &str, contents: &str) -> Self {
        self.write(name, contents);
        self
    }

    /// Overwrite or add a file after construction, e.g. before a reload.
    pub fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.path().join(name), contents).expect("Failed to write policy file");
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn load(&self, registry: &PredicateRegistry) -> Policy {
        loader::load_policies(self.path(), registry).expect("Failed to load policies")
    }
}

/// Router plus the store behind it, driven with `oneshot`
pub struct TestApp {
    pub store: Arc<PolicyStore>,
    router: Router,
}

impl TestApp {
    pub fn new(policy: Policy, policies_dir: Option<&Path>) -> Self {
        let store = Arc::new(PolicyStore::new(policy));
        let router = web::router(AppState {
            store: store.clone(),
            policies_dir: policies_dir.map(Path::to_path_buf),
            registry: Arc::new(PredicateRegistry::new()),
        });
        Self { store, router }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}
