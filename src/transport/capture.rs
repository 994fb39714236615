use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use super::Transport;
use crate::error::LinkError;

/// Offline link that logs each transaction as one line of uppercase hex.
///
/// Lines are `W <bytes>` for writes and `X <bytes>` for duplex exchanges. Exchanges answer with
/// all bits set so status handshakes complete immediately.
#[derive(Debug)]
pub struct CaptureTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    sink: BufWriter<W>,
    transactions: usize,
}

impl<W> CaptureTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            sink: BufWriter::new(sink),
            transactions: 0,
        }
    }

    /// Number of transactions captured so far.
    #[must_use]
    pub fn transactions(&self) -> usize {
        self.transactions
    }

    /// Flushes and returns the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns an error when flushing fails.
    pub async fn into_inner(mut self) -> Result<W, LinkError> {
        self.sink.flush().await?;
        Ok(self.sink.into_inner())
    }

    async fn log(&mut self, tag: char, bytes: &[u8]) -> Result<(), LinkError> {
        let line = format!("{tag} {}\n", hex::encode_upper(bytes));
        self.sink.write_all(line.as_bytes()).await?;
        self.transactions += 1;
        Ok(())
    }
}

#[async_trait]
impl<W> Transport for CaptureTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.log('W', bytes).await
    }

    async fn exchange(&mut self, bytes: &[u8]) -> Result<Vec<u8>, LinkError> {
        self.log('X', bytes).await?;
        Ok(vec![0xFF; bytes.len()])
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.sink.flush().await?;
        self.sink.shutdown().await?;
        Ok(())
    }
}
