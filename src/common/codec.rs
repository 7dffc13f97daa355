//! Length-prefixed, checksummed frames over a byte stream
//!
//! Frame format: [MAGIC:4][LEN:4][PAYLOAD:LEN][CRC32:4], integers little
//! endian, payload is bincode. The checksum covers LEN and PAYLOAD.

use crate::common::{Error, Result};
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const FRAME_MAGIC: [u8; 4] = [0x4D, 0x44, 0x52, 0x31]; // "MDR1"
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Serialize `message` into one frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<BytesMut> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::Codec(format!(
            "frame of {} bytes exceeds limit of {}",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }
    let len = (payload.len() as u32).to_le_bytes();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&len);
    hasher.update(&payload);

    let mut buf = BytesMut::with_capacity(payload.len() + 12);
    buf.put_slice(&FRAME_MAGIC);
    buf.put_slice(&len);
    buf.put_slice(&payload);
    buf.put_u32_le(hasher.finalize());
    Ok(buf)
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream cleanly
/// before the first byte of a frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    // Read magic
    let mut magic = [0u8; 4];
    let n = reader.read(&mut magic).await?;
    if n == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut magic[n..]).await?;
    if magic != FRAME_MAGIC {
        return Err(Error::Protocol("invalid frame magic".into()));
    }

    // Read length
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "frame length {} exceeds limit of {}",
            len, MAX_FRAME_SIZE
        )));
    }

    // Read payload
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    // Verify checksum
    let stored = reader.read_u32_le().await?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&len_bytes);
    hasher.update(&payload);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(Error::Protocol(format!(
            "frame checksum mismatch: expected {:08x}, got {:08x}",
            stored, computed
        )));
    }

    Ok(Some(bincode::deserialize(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::rpc::{Reply, Request};
    use crate::common::schema::SchemaMap;

    #[tokio::test]
    async fn test_frames_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let mut schema = SchemaMap::new();
        schema
            .entry("users".into())
            .or_default()
            .insert("email".into(), vec!["email".into()]);
        let request = Request::ApplySchema {
            schema,
            version: 42,
        };

        write_frame(&mut client, &request).await.unwrap();
        write_frame(&mut client, &Request::Shutdown).await.unwrap();
        drop(client);

        let first: Option<Request> = read_frame(&mut server).await.unwrap();
        assert_eq!(first, Some(request));
        let second: Option<Request> = read_frame(&mut server).await.unwrap();
        assert_eq!(second, Some(Request::Shutdown));
        let eof: Option<Request> = read_frame(&mut server).await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_checksum() {
        let mut frame = encode_frame(&Reply::Version(7)).unwrap().to_vec();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let mut reader = &frame[..];
        let result: Result<Option<Reply>> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_bad_magic() {
        let mut reader = &b"HTTP/1.1 200 OK\r\n"[..];
        let result: Result<Option<Reply>> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let frame = encode_frame(&Reply::Error("disk full".into())).unwrap();
        let mut reader = &frame[..frame.len() - 3];
        let result: Result<Option<Reply>> = read_frame(&mut reader).await;
        match result {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected truncated read, got {:?}", other),
        }
    }
}
