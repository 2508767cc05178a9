//! Feed HTTP server.
//!
//! Serves `GET /feeds/<feed-name>` straight from the artifact file. Each
//! request runs on its own thread and reads the file afresh; the server never
//! talks to the refresh loop.

mod response;

pub use response::{ATOM_CONTENT_TYPE, JSON_CONTENT_TYPE, READ_FAILED_MESSAGE};

use crate::artifact::ArtifactStore;
use crate::refresh::panic_message;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tiny_http::{Method, Request, Server};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Bound server ready to accept requests.
pub struct FeedServer {
    server: Arc<Server>,
    addr: SocketAddr,
    route: Arc<str>,
    store: ArtifactStore,
    grace: Duration,
    shutdown: Arc<AtomicBool>,
}

/// Stops a running [`FeedServer`] from another thread or task.
#[derive(Clone)]
pub struct ShutdownHandle {
    server: Arc<Server>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Stop accepting requests; in-flight ones get the grace period.
    pub fn shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutting down feed server");
        }
        self.server.unblock();
    }
}

impl FeedServer {
    /// Bind `addr` and serve `store` under `route`.
    pub fn bind(
        addr: SocketAddr,
        route: impl Into<Arc<str>>,
        store: ArtifactStore,
        grace: Duration,
    ) -> Result<Self, ServerError> {
        let server = Server::http(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let addr = server.server_addr().to_ip().unwrap_or(addr);

        Ok(Self {
            server: Arc::new(server),
            addr,
            route: route.into(),
            store,
            grace,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server: Arc::clone(&self.server),
            requested: Arc::clone(&self.shutdown),
        }
    }

    /// Accept requests until [`ShutdownHandle::shutdown`] is called, then wait
    /// up to the grace period for in-flight requests. Blocking.
    pub fn run(self) {
        tracing::info!(addr = %self.addr, route = %self.route, "Serving feed");

        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        for request in self.server.incoming_requests() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            in_flight = reap(in_flight);

            let route = Arc::clone(&self.route);
            let store = self.store.clone();
            let spawned = thread::Builder::new()
                .name("feed-request".into())
                .spawn(move || {
                    if let Err(e) = handle_request(request, &route, &store) {
                        tracing::warn!(error = %e, "Failed to send response");
                    }
                });
            match spawned {
                Ok(handle) => in_flight.push(handle),
                Err(e) => tracing::error!(error = %e, "Failed to spawn request thread"),
            }
        }

        drain(in_flight, self.grace);
        tracing::info!("Feed server stopped");
    }
}

/// Handle a single HTTP request.
fn handle_request(request: Request, route: &str, store: &ArtifactStore) -> std::io::Result<()> {
    let path = request.url().split('?').next().unwrap_or_default();
    if path != route {
        return response::respond_not_found(request);
    }
    if request.method() != &Method::Get {
        return response::respond_method_not_allowed(request);
    }

    match store.read() {
        Ok(body) => response::respond_atom(request, body),
        Err(e) => {
            if e.is_missing() {
                tracing::warn!(path = %store.path().display(), "No feed published yet");
            } else {
                tracing::error!(error = %e, "Error reading Atom file");
            }
            response::respond_read_failed(request)
        }
    }
}

/// Join finished request threads and return the ones still running.
fn reap(in_flight: Vec<JoinHandle<()>>) -> Vec<JoinHandle<()>> {
    let (finished, running): (Vec<_>, Vec<_>) =
        in_flight.into_iter().partition(|h| h.is_finished());
    for handle in finished {
        if let Err(payload) = handle.join() {
            tracing::warn!(panic = %panic_message(payload), "Request thread panicked");
        }
    }
    running
}

/// Wait for request threads to finish, at most `grace`.
fn drain(mut in_flight: Vec<JoinHandle<()>>, grace: Duration) {
    let deadline = Instant::now() + grace;
    loop {
        in_flight = reap(in_flight);

        if in_flight.is_empty() {
            return;
        }
        if Instant::now() >= deadline {
            tracing::warn!(
                abandoned = in_flight.len(),
                "Grace period elapsed with requests still in flight"
            );
            return;
        }
        thread::sleep(DRAIN_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Running {
        base: String,
        handle: ShutdownHandle,
        thread: JoinHandle<()>,
        _dir: tempfile::TempDir,
        store: ArtifactStore,
    }

    impl Running {
        fn stop(self) {
            self.handle.shutdown();
            self.thread.join().unwrap();
        }
    }

    fn start() -> Running {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("dedao.atom"));
        let server = FeedServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            "/feeds/dedao.atom",
            store.clone(),
            Duration::from_secs(1),
        )
        .unwrap();
        let base = format!("http://{}", server.local_addr());
        let handle = server.shutdown_handle();
        let thread = thread::spawn(move || server.run());
        Running {
            base,
            handle,
            thread,
            _dir: dir,
            store,
        }
    }

    #[tokio::test]
    async fn test_serves_published_bytes_verbatim() {
        let running = start();
        let doc = "<?xml version=\"1.0\"?><feed xmlns=\"http://www.w3.org/2005/Atom\"></feed>";
        running.store.publish(doc).unwrap();

        let resp = reqwest::get(format!("{}/feeds/dedao.atom", running.base))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(
            resp.headers()["content-type"].to_str().unwrap(),
            ATOM_CONTENT_TYPE
        );
        assert_eq!(resp.bytes().await.unwrap().as_ref(), doc.as_bytes());

        running.stop();
    }

    #[tokio::test]
    async fn test_missing_artifact_is_500_json() {
        let running = start();

        let resp = reqwest::get(format!("{}/feeds/dedao.atom", running.base))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 500);
        let body: serde_json::Value = serde_json::from_slice(&resp.bytes().await.unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"error": "Read Atom file failed"}));

        running.stop();
    }

    #[tokio::test]
    async fn test_query_string_is_ignored() {
        let running = start();
        running.store.publish("<feed/>").unwrap();

        let resp = reqwest::get(format!("{}/feeds/dedao.atom?utm=x", running.base))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        running.stop();
    }

    #[tokio::test]
    async fn test_other_paths_are_404() {
        let running = start();
        running.store.publish("<feed/>").unwrap();

        for path in ["/", "/feeds/other.atom", "/feeds/dedao.atom/extra"] {
            let resp = reqwest::get(format!("{}{}", running.base, path)).await.unwrap();
            assert_eq!(resp.status().as_u16(), 404, "path {path}");
        }

        running.stop();
    }

    #[tokio::test]
    async fn test_non_get_is_405() {
        let running = start();

        let resp = reqwest::Client::new()
            .post(format!("{}/feeds/dedao.atom", running.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 405);
        assert_eq!(resp.headers()["allow"].to_str().unwrap(), "GET");

        running.stop();
    }

    #[test]
    fn test_shutdown_stops_run() {
        let running = start();
        let started = Instant::now();
        running.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_bind_conflict_is_error() {
        let first = FeedServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            "/feeds/a",
            ArtifactStore::new("a"),
            Duration::ZERO,
        )
        .unwrap();
        let taken = first.local_addr();

        let err = FeedServer::bind(taken, "/feeds/a", ArtifactStore::new("a"), Duration::ZERO)
            .err()
            .unwrap();
        assert!(err.to_string().contains(&taken.to_string()));
    }

    #[test]
    fn test_drain_waits_for_short_requests() {
        let handle = thread::spawn(|| thread::sleep(Duration::from_millis(100)));
        drain(vec![handle], Duration::from_secs(5));
    }

    #[test]
    fn test_reap_absorbs_panicked_request_thread() {
        let panicked = thread::spawn(|| panic!("handler blew up"));
        let slow = thread::spawn(|| thread::sleep(Duration::from_secs(2)));
        while !panicked.is_finished() {
            thread::sleep(Duration::from_millis(10));
        }

        let running = reap(vec![panicked, slow]);
        assert_eq!(running.len(), 1);
        drain(running, Duration::from_secs(5));
    }

    #[test]
    fn test_drain_gives_up_after_grace() {
        let handle = thread::spawn(|| thread::sleep(Duration::from_secs(10)));
        let started = Instant::now();
        drain(vec![handle], Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
