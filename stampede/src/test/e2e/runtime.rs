use std::{
    io::Write,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rama::{
    http::{
        Request, StatusCode,
        server::HttpServer,
        service::web::{Router, response::IntoResponse as _},
    },
    net::{address::SocketAddress, socket::Interface},
    rt::Executor,
    tcp::server::TcpListener,
};
use tokio::task::JoinHandle;

/// Local target server a stampede can run against.
pub(super) struct TargetServer {
    addr: SocketAddress,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl TargetServer {
    /// Spawn a server on a random local port, serving:
    ///
    /// - `/ok`: `200`
    /// - `/moved`: `301`
    /// - `/missing`: `404`
    /// - `/broken`: `503`
    /// - `/slow`: `200` after [`SLOW_RESPONSE_DELAY`]
    pub(super) async fn spawn() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let router = Router::new()
            .with_get("/ok", "stampede")
            .with_get("/moved", StatusCode::MOVED_PERMANENTLY)
            .with_get("/missing", StatusCode::NOT_FOUND)
            .with_get("/broken", move |_req: Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(StatusCode::SERVICE_UNAVAILABLE.into_response())
            })
            .with_get("/slow", || async {
                tokio::time::sleep(SLOW_RESPONSE_DELAY).await;
                StatusCode::OK
            });

        let exec = Executor::default();
        let interface: Interface = "127.0.0.1:0".parse().unwrap();
        let tcp_listener = TcpListener::bind(interface, exec.clone()).await.unwrap();
        let addr = tcp_listener.local_addr().unwrap().into();

        let http_server = HttpServer::auto(exec).service(Arc::new(router));
        let handle = tokio::spawn(async move {
            tcp_listener.serve(http_server).await;
        });

        Self { addr, hits, handle }
    }

    pub(super) fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Requests received on `/broken`.
    pub(super) fn broken_hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for TargetServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(super) const SLOW_RESPONSE_DELAY: Duration = Duration::from_secs(3);

/// Cloneable in-memory writer, to capture the report of a run.
#[derive(Debug, Clone, Default)]
pub(super) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(super) fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// An address nothing listens on.
pub(super) const UNREACHABLE_URL: &str = "http://127.0.0.1:1/";
