//! Partition server
//!
//! Listens on `<work_dir>/<rank>` and answers coordinator requests from a
//! [`PartitionState`]. Returns from [`PartitionServer::serve`] once a
//! shutdown request has been acknowledged.

use crate::common::codec::{read_frame, write_frame};
use crate::common::{partition_endpoint, Reply, Request, Result};
use crate::partition::state::PartitionState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};

pub struct PartitionServer {
    rank: usize,
    socket_path: PathBuf,
    listener: UnixListener,
    state: Arc<Mutex<PartitionState>>,
    sever_on_shutdown: bool,
}

impl PartitionServer {
    /// Bind the rank's socket, replacing a stale socket file. Without a
    /// `data_dir` the partition's schema lives in memory only.
    pub fn bind(rank: usize, work_dir: &Path, data_dir: Option<&Path>) -> Result<Self> {
        std::fs::create_dir_all(work_dir)?;
        let socket_path = partition_endpoint(work_dir, rank);
        match std::fs::remove_file(&socket_path) {
            Ok(()) => tracing::debug!("Removed stale socket {}", socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let state = match data_dir {
            Some(dir) => PartitionState::open(rank, dir)?,
            None => PartitionState::new(rank),
        };
        let listener = UnixListener::bind(&socket_path)?;

        Ok(Self {
            rank,
            socket_path,
            listener,
            state: Arc::new(Mutex::new(state)),
            sever_on_shutdown: false,
        })
    }

    /// Close the connection on shutdown without sending `ShuttingDown`
    pub fn sever_on_shutdown(mut self, sever: bool) -> Self {
        self.sever_on_shutdown = sever;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting partition {}", self.rank);
        tracing::info!("  Socket: {}", self.socket_path.display());

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);

        tracing::info!("✓ Partition {} ready", self.rank);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!("Partition {} accept error: {}", self.rank, e);
                            continue;
                        }
                    };
                    let conn = Connection {
                        rank: self.rank,
                        stream,
                        state: self.state.clone(),
                        stop: stop_tx.clone(),
                        sever_on_shutdown: self.sever_on_shutdown,
                    };
                    tokio::spawn(async move {
                        if let Err(e) = conn.run().await {
                            tracing::warn!("Partition connection error: {}", e);
                        }
                    });
                }
                _ = stop_rx.changed() => break,
            }
        }

        drop(self.listener);
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::warn!("Could not remove {}: {}", self.socket_path.display(), e);
        }
        tracing::info!("Partition {} stopped", self.rank);
        Ok(())
    }
}

struct Connection {
    rank: usize,
    stream: UnixStream,
    state: Arc<Mutex<PartitionState>>,
    stop: Arc<watch::Sender<bool>>,
    sever_on_shutdown: bool,
}

impl Connection {
    async fn run(mut self) -> Result<()> {
        while let Some(request) = read_frame::<_, Request>(&mut self.stream).await? {
            if request == Request::Shutdown {
                tracing::info!("Partition {} received shutdown", self.rank);
                if !self.sever_on_shutdown {
                    write_frame(&mut self.stream, &Reply::ShuttingDown).await?;
                }
                let _ = self.stop.send(true);
                return Ok(());
            }
            let reply = self.state.lock().await.handle(request);
            write_frame(&mut self.stream, &reply).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(stream: &mut UnixStream, request: Request) -> Option<Reply> {
        write_frame(stream, &request).await.unwrap();
        read_frame(stream).await.unwrap()
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let server = PartitionServer::bind(0, dir.path(), None).unwrap();
        let socket = server.socket_path().to_path_buf();
        let serving = tokio::spawn(server.serve());

        let mut stream = UnixStream::connect(&socket).await.unwrap();
        assert_eq!(call(&mut stream, Request::SchemaVersion).await, Some(Reply::Version(0)));
        assert_eq!(call(&mut stream, Request::Freeze).await, Some(Reply::Ok));
        assert_eq!(call(&mut stream, Request::Shutdown).await, Some(Reply::ShuttingDown));

        serving.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_sever_on_shutdown_closes_without_reply() {
        let dir = tempfile::tempdir().unwrap();
        let server = PartitionServer::bind(1, dir.path(), None)
            .unwrap()
            .sever_on_shutdown(true);
        let socket = server.socket_path().to_path_buf();
        let serving = tokio::spawn(server.serve());

        let mut stream = UnixStream::connect(&socket).await.unwrap();
        assert_eq!(call(&mut stream, Request::Shutdown).await, None);
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("3"), b"stale").unwrap();
        let server = PartitionServer::bind(3, dir.path(), None).unwrap();
        assert_eq!(server.socket_path(), dir.path().join("3"));
    }
}
