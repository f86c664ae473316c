//! Exposes an in-process test server for use in integration tests.
//!
//! ```
//! use boltbench_service::backend::InMemoryBackend;
//! use boltbench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let primary = InMemoryBackend::with_containers("gcs", ["bench"]);
//!    let accelerator = InMemoryBackend::with_containers("bolt", ["bench"]);
//!    let server = TestServer::with_backends(primary, accelerator).await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};

use boltbench_server::config::{Config, Storage};
use boltbench_server::state::State;
use boltbench_server::web::App;
use boltbench_service::Backends;
use boltbench_service::backend::InMemoryBackend;

/// An in-process test server for use in integration tests.
///
/// Both endpoints are in-memory backends. Tests keep clones of them to seed or inspect objects,
/// since clones share their storage. The server listens on a random available port on localhost.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl TestServer {
    /// Starts a server with two empty in-memory endpoints.
    pub async fn new() -> Self {
        Self::with_backends(InMemoryBackend::new("gcs"), InMemoryBackend::new("bolt")).await
    }

    /// Starts a server on top of the given endpoints.
    pub async fn with_backends(primary: InMemoryBackend, accelerator: InMemoryBackend) -> Self {
        Self::with_config(Config::default(), primary, accelerator).await
    }

    /// Starts a server with a custom configuration on top of the given endpoints.
    ///
    /// The storage sections of `config` are replaced, everything else is used as given.
    pub async fn with_config(
        config: Config,
        primary: InMemoryBackend,
        accelerator: InMemoryBackend,
    ) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let config = Config {
            http_addr: socket,
            primary: Storage::Memory { containers: vec![] },
            accelerator: Storage::Memory { containers: vec![] },
            ..config
        };

        let backends = Backends::new(Box::new(primary), Box::new(accelerator));
        let state = State::with_backends(config, backends);
        let app = App::new(state);

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            app.serve(listener).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
