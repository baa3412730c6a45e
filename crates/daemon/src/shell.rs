//! Runs the router on a dedicated thread with its own single-threaded
//! runtime. `start` returns once the listener is bound (or failed to bind);
//! `stop` returns once the thread has exited.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use axum::Router;
use snapmock_core::Store;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::http;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("cannot build runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("cannot spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("worker exited before reporting readiness")]
    WorkerGone,
    #[error("worker thread panicked")]
    WorkerPanicked,
}

type Ready = Result<SocketAddr, ShellError>;

/// A running mock daemon. Dropping it stops it.
#[derive(Debug)]
pub struct MockDaemon {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl MockDaemon {
    pub fn start(config: &DaemonConfig, store: Store) -> Result<Self, ShellError> {
        let app = http::router(Arc::new(Mutex::new(store)));
        let listen = config.listen;
        let (ready_tx, ready_rx) = mpsc::channel::<Ready>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = thread::Builder::new()
            .name("snapmock-daemon".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(ShellError::Runtime(e)));
                        return;
                    }
                };
                runtime.block_on(serve(listen, app, ready_tx, shutdown_rx));
                // Dropping the runtime here cancels any request still in
                // flight, stalled ones included.
            })
            .map_err(ShellError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(addr)) => Ok(Self {
                addr,
                shutdown: Some(shutdown_tx),
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => match worker.join() {
                Ok(()) => Err(ShellError::WorkerGone),
                Err(_) => Err(ShellError::WorkerPanicked),
            },
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://host:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Signals the worker and waits for it to exit.
    pub fn stop(mut self) -> Result<(), ShellError> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Result<(), ShellError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| ShellError::WorkerPanicked)?;
            info!(addr = %self.addr, "mock daemon stopped");
        }
        Ok(())
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_and_join() {
            warn!(error = %e, "mock daemon did not stop cleanly");
        }
    }
}

async fn serve(
    listen: SocketAddr,
    app: Router,
    ready: mpsc::Sender<Ready>,
    shutdown: oneshot::Receiver<()>,
) {
    let bound = match TcpListener::bind(listen).await {
        Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
        Err(e) => Err(e),
    };
    let (listener, addr) = match bound {
        Ok(bound) => bound,
        Err(source) => {
            let _ = ready.send(Err(ShellError::Bind {
                addr: listen,
                source,
            }));
            return;
        }
    };
    if ready.send(Ok(addr)).is_err() {
        return;
    }
    info!(%addr, "mock daemon listening");

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                error!(error = %e, "server loop failed");
            }
        }
        _ = shutdown => {
            info!(%addr, "stop requested");
        }
    }
}
