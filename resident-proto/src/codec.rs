//! Length-prefixed frame codec over any async byte stream.
//!
//! Each frame is: `[u32 big-endian length][postcard payload]`.

use std::io;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed frame payload (64 MiB).
pub const MAX_FRAME: u32 = 64 * 1024 * 1024;

/// Encodes `msg` as a length-prefixed postcard frame and writes it to `w`.
///
/// The writer is not flushed; callers using a buffered writer flush once
/// the frame is complete.
pub async fn send<W>(w: &mut W, msg: &impl Serialize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload =
        postcard::to_allocvec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "frame exceeds 64 MiB limit"))?;
    w.write_all(&len.to_be_bytes()).await?;
    w.write_all(&payload).await
}

/// Reads a length-prefixed postcard frame from `r` and decodes it.
///
/// A stream that ends before the first header byte yields
/// [`io::ErrorKind::UnexpectedEof`]; an undecodable payload yields
/// [`io::ErrorKind::InvalidData`].
pub async fn recv<T, R>(r: &mut R) -> io::Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await?;
    let len = u32::from_be_bytes(buf);
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds 64 MiB limit",
        ));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;
    postcard::from_bytes(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
