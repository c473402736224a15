// Server module: answers questions over a Unix domain socket

mod ipc;
mod signals;

pub use ipc::{
    read_frame, read_json, write_frame, write_json, IpcClient, IpcServer, Reply, Request,
    MAX_MESSAGE_SIZE,
};
pub use signals::{Signal, SignalHandler};

use crate::config::{expand_tilde, ServerConfig};
use crate::error::{FolioError, Result};
use crate::service::QueryService;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Pause after a failed accept (e.g. EMFILE) before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop in front of a [`QueryService`]
pub struct Server {
    service: Arc<QueryService>,
    socket_path: PathBuf,
    max_connections: usize,
}

impl Server {
    pub fn new(service: Arc<QueryService>, config: &ServerConfig) -> Self {
        Self {
            service,
            socket_path: expand_tilde(&config.socket_path),
            max_connections: config.max_connections.max(1),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve until SIGTERM, SIGINT or SIGHUP
    pub async fn run_until_signal(self) -> Result<()> {
        let mut signals = SignalHandler::new()?;
        self.run(async move {
            let signal = signals.wait().await;
            tracing::info!("Shutting down on {:?}", signal);
        })
        .await
    }

    /// Serve until `shutdown` completes, then remove the socket
    ///
    /// At most `max_connections` clients are handled at once; further
    /// connections wait in the accept backlog.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ipc_server = IpcServer::new(self.socket_path.clone());
        ipc_server.bind().await?;

        tokio::pin!(shutdown);
        let result = self.accept_loop(&mut ipc_server, shutdown).await;

        ipc_server.shutdown()?;
        tracing::info!("Server stopped");
        result
    }

    async fn accept_loop<F>(
        &self,
        ipc_server: &mut IpcServer,
        mut shutdown: Pin<&mut F>,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let limiter = Arc::new(Semaphore::new(self.max_connections));

        loop {
            // Shutdown must stay responsive while every permit is held
            let permit = tokio::select! {
                permit = Arc::clone(&limiter).acquire_owned() => {
                    permit.map_err(|e| FolioError::Server(e.to_string()))?
                }
                _ = &mut shutdown => return Ok(()),
            };

            let stream = tokio::select! {
                accepted = ipc_server.accept() => match accepted {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        tokio::select! {
                            _ = sleep(ACCEPT_BACKOFF) => {}
                            _ = &mut shutdown => return Ok(()),
                        }
                        continue;
                    }
                },
                _ = &mut shutdown => return Ok(()),
            };

            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = handle_client(stream, &service).await {
                    tracing::error!("Client handler error: {}", e);
                }
            });
        }
    }
}

/// Answer a single request on one connection
async fn handle_client(mut stream: UnixStream, service: &QueryService) -> Result<()> {
    let payload = ipc::read_frame(&mut stream).await?;
    let reply = dispatch(&payload, service).await;
    ipc::write_json(&mut stream, &reply).await
}

/// Route a raw request body
///
/// A body without a `type` tag is treated as a query so plain
/// `{"query": "..."}` mappings work too.
async fn dispatch(payload: &[u8], service: &QueryService) -> Reply {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::info!("Rejecting malformed request: {}", e);
            let error = FolioError::InvalidArgument("request is not valid JSON".to_string());
            return Reply::new(error.user_message());
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("status") => Reply::with_state(service.describe().await, service.state().await),
        Some("query") | None => {
            let response = service.handle_json(&value).await.response;
            Reply::with_state(response, service.state().await)
        }
        Some(other) => {
            let error = FolioError::InvalidArgument(format!("unknown request type '{}'", other));
            Reply::new(error.user_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn test_server() -> Server {
        let service = QueryService::from_config(&Config::default()).unwrap();
        Server::new(
            Arc::new(service),
            &ServerConfig {
                socket_path: PathBuf::from("/nonexistent/folio-test.sock"),
                max_connections: 2,
            },
        )
    }

    #[test]
    fn test_failing_accept_backs_off() {
        let server = test_server();
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        tracing::subscriber::with_default(subscriber, || {
            runtime.block_on(async {
                // Never bound, so every accept fails straight away
                let mut ipc_server = IpcServer::new(server.socket_path.clone());
                let shutdown = sleep(Duration::from_millis(350));
                tokio::pin!(shutdown);
                server.accept_loop(&mut ipc_server, shutdown).await.unwrap();
            })
        });

        let failed = warnings.load(Ordering::SeqCst);
        assert!(failed >= 1);
        assert!(failed <= 10, "accept retried {} times in 350ms", failed);
    }
}
