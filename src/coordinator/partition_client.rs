//! Connections from the coordinator to data partitions
//!
//! A [`PartitionHandle`] owns one [`PartitionTransport`] for one rank.
//! Transports are produced by a [`Connector`]; production code dials Unix
//! sockets with [`UnixConnector`], tests inject scripted transports.

use crate::common::codec::{read_frame, write_frame};
use crate::common::{partition_endpoint, Error, Reply, Request, Result, SchemaMap};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;

/// One open request/reply channel to a partition.
#[async_trait]
pub trait PartitionTransport: Send {
    /// Send `request` and wait for its reply.
    ///
    /// A peer that closes the channel before the reply frame is complete
    /// must surface as [`Error::ConnectionClosed`].
    async fn call(&mut self, request: Request) -> Result<Reply>;
}

/// Dials partitions by rank.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, rank: usize) -> Result<Box<dyn PartitionTransport>>;
}

/// Dials `<work_dir>/<rank>` Unix sockets.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    work_dir: PathBuf,
    connect_timeout: Option<Duration>,
}

impl UnixConnector {
    pub fn new(work_dir: impl Into<PathBuf>, connect_timeout: Option<Duration>) -> Self {
        Self {
            work_dir: work_dir.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for UnixConnector {
    async fn connect(&self, rank: usize) -> Result<Box<dyn PartitionTransport>> {
        let path = partition_endpoint(&self.work_dir, rank);
        let dial = UnixStream::connect(&path);
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, dial)
                .await
                .map_err(|_| Error::Connection {
                    rank,
                    reason: format!("{}: timed out after {:?}", path.display(), timeout),
                })?,
            None => dial.await,
        }
        .map_err(|e| Error::Connection {
            rank,
            reason: format!("{}: {}", path.display(), e),
        })?;

        tracing::debug!("Connected to partition {} at {}", rank, path.display());
        Ok(Box::new(UnixTransport { rank, stream }))
    }
}

/// Framed transport over a connected Unix socket
pub struct UnixTransport {
    rank: usize,
    stream: UnixStream,
}

#[async_trait]
impl PartitionTransport for UnixTransport {
    async fn call(&mut self, request: Request) -> Result<Reply> {
        write_frame(&mut self.stream, &request).await?;
        match read_frame(&mut self.stream).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(Error::ConnectionClosed { rank: self.rank }),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(Error::ConnectionClosed { rank: self.rank })
            }
            Err(e) => Err(e),
        }
    }
}

/// The coordinator's view of one partition rank.
pub struct PartitionHandle {
    rank: usize,
    transport: Box<dyn PartitionTransport>,
    call_timeout: Option<Duration>,
    /// Set once the channel can no longer be trusted to be in step
    lost: Option<String>,
}

impl PartitionHandle {
    pub fn new(
        rank: usize,
        transport: Box<dyn PartitionTransport>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            rank,
            transport,
            call_timeout,
            lost: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// False once a transport failure has made the channel unusable.
    pub fn is_usable(&self) -> bool {
        self.lost.is_none()
    }

    /// Send a request and return the raw reply, including `Reply::Error`.
    ///
    /// Timeouts and transport failures are terminal for the handle: a late
    /// reply would otherwise be read as the answer to the next request.
    pub async fn call_raw(&mut self, request: Request) -> Result<Reply> {
        if let Some(reason) = &self.lost {
            return Err(Error::ConnectionLost {
                rank: self.rank,
                reason: reason.clone(),
            });
        }

        let op = request.op();
        tracing::trace!("-> partition {}: {}", self.rank, op);
        let pending = self.transport.call(request);
        let result = match self.call_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, pending).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    rank: self.rank,
                    op,
                    millis: timeout.as_millis() as u64,
                }),
            },
            None => pending.await,
        };

        if let Err(e) = &result {
            self.lost = Some(format!("{} failed: {}", op, e));
        }
        result
    }

    /// Send a request; a `Reply::Error` becomes [`Error::Remote`].
    pub async fn call(&mut self, request: Request) -> Result<Reply> {
        match self.call_raw(request).await? {
            Reply::Error(message) => Err(Error::Remote {
                rank: self.rank,
                message,
            }),
            reply => Ok(reply),
        }
    }

    fn unexpected(&self, op: &str, reply: &Reply) -> Error {
        Error::Protocol(format!(
            "partition {} answered {} with {}",
            self.rank,
            op,
            reply.kind()
        ))
    }

    pub async fn schema_version(&mut self) -> Result<i64> {
        match self.call(Request::SchemaVersion).await? {
            Reply::Version(version) => Ok(version),
            other => Err(self.unexpected("SchemaVersion", &other)),
        }
    }

    pub async fn schema(&mut self) -> Result<(i64, SchemaMap)> {
        match self.call(Request::Schema).await? {
            Reply::Schema { version, schema } => Ok((version, schema)),
            other => Err(self.unexpected("Schema", &other)),
        }
    }

    /// Returns the number of collections and indexes the partition created.
    pub async fn apply_schema(&mut self, schema: SchemaMap, version: i64) -> Result<usize> {
        match self.call(Request::ApplySchema { schema, version }).await? {
            Reply::Applied { created } => Ok(created),
            other => Err(self.unexpected("ApplySchema", &other)),
        }
    }

    pub async fn freeze(&mut self) -> Result<()> {
        self.expect_ok(Request::Freeze).await
    }

    pub async fn unfreeze(&mut self) -> Result<()> {
        self.expect_ok(Request::Unfreeze).await
    }

    pub async fn drop_cached_state(&mut self) -> Result<()> {
        self.expect_ok(Request::DropCachedState).await
    }

    async fn expect_ok(&mut self, request: Request) -> Result<()> {
        let op = request.op();
        match self.call(request).await? {
            Reply::Ok => Ok(()),
            other => Err(self.unexpected(op, &other)),
        }
    }
}

impl std::fmt::Debug for PartitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionHandle")
            .field("rank", &self.rank)
            .field("call_timeout", &self.call_timeout)
            .field("lost", &self.lost)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned results in order
    struct Canned(VecDeque<Result<Reply>>);

    #[async_trait]
    impl PartitionTransport for Canned {
        async fn call(&mut self, _request: Request) -> Result<Reply> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(Error::Protocol("no canned reply".into())))
        }
    }

    fn handle(replies: Vec<Result<Reply>>) -> PartitionHandle {
        PartitionHandle::new(4, Box::new(Canned(replies.into())), None)
    }

    /// Never answers
    struct Silent;

    #[async_trait]
    impl PartitionTransport for Silent {
        async fn call(&mut self, _request: Request) -> Result<Reply> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_typed_calls() {
        let mut h = handle(vec![
            Ok(Reply::Version(9)),
            Ok(Reply::Applied { created: 2 }),
            Ok(Reply::Ok),
        ]);
        assert_eq!(h.schema_version().await.unwrap(), 9);
        assert_eq!(h.apply_schema(SchemaMap::new(), 9).await.unwrap(), 2);
        h.freeze().await.unwrap();
        assert!(h.is_usable());
    }

    #[tokio::test]
    async fn test_remote_refusal_keeps_handle_usable() {
        let mut h = handle(vec![Ok(Reply::Error("already frozen".into())), Ok(Reply::Ok)]);
        match h.freeze().await {
            Err(Error::Remote { rank, message }) => {
                assert_eq!(rank, 4);
                assert_eq!(message, "already frozen");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(h.is_usable());
        h.unfreeze().await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_reply() {
        let mut h = handle(vec![Ok(Reply::Ok)]);
        assert!(matches!(h.schema_version().await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_is_terminal() {
        let mut h = handle(vec![Err(Error::ConnectionClosed { rank: 4 }), Ok(Reply::Ok)]);
        assert!(matches!(h.freeze().await, Err(Error::ConnectionClosed { rank: 4 })));
        assert!(!h.is_usable());
        assert!(matches!(h.unfreeze().await, Err(Error::ConnectionLost { rank: 4, .. })));
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let mut h = PartitionHandle::new(1, Box::new(Silent), Some(Duration::from_millis(50)));
        match h.schema_version().await {
            Err(Error::Timeout { rank, op, millis }) => {
                assert_eq!((rank, op, millis), (1, "SchemaVersion", 50));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!h.is_usable());
    }

    #[tokio::test]
    async fn test_unix_connector_reports_rank() {
        let dir = tempfile::tempdir().unwrap();
        let connector = UnixConnector::new(dir.path(), None);
        match connector.connect(3).await {
            Err(Error::Connection { rank, reason }) => {
                assert_eq!(rank, 3);
                assert!(reason.contains(&dir.path().join("3").display().to_string()));
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("dial to a missing socket succeeded"),
        }
    }
}
