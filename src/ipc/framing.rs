//! Length-prefixed frames: `[len: u32-le][payload]`.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Handshake rejected: {0}")]
    Handshake(String),
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let too_large = || ProtocolError::MessageTooLarge {
        size: payload.len(),
        max,
    };
    if payload.len() > max {
        return Err(too_large().into());
    }
    let len = u32::try_from(payload.len()).map_err(|_| too_large())?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed between frames.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > max {
        return Err(ProtocolError::MessageTooLarge { size: len, max }.into());
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}
