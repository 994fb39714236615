mod capture;
mod fake;

use async_trait::async_trait;

use crate::error::LinkError;

pub use self::capture::CaptureTransport;
pub use self::fake::{FakeTransport, FakeTransportConfig, Transaction, TransactionKind};

/// Register-addressed, byte-oriented synchronous serial link.
///
/// Every call is one blocking round-trip; transactions reach the device in call order and are
/// never split or merged by the transport.
#[async_trait]
pub trait Transport: Send {
    /// Clocks `bytes` out, discarding whatever the device shifts back.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Full-duplex transfer returning exactly `bytes.len()` bytes read back.
    async fn exchange(&mut self, bytes: &[u8]) -> Result<Vec<u8>, LinkError>;

    /// Releases the underlying link.
    async fn close(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Writes an 8-bit register value.
    async fn write_reg_u8(&mut self, register: u8, value: u8) -> Result<(), LinkError> {
        self.write(&[register, value]).await
    }

    /// Writes a 16-bit register value, most significant byte first.
    async fn write_reg_u16(&mut self, register: u8, value: u16) -> Result<(), LinkError> {
        let [high, low] = value.to_be_bytes();
        self.write(&[register, high, low]).await
    }

    /// Writes `[register] ++ payload` as one transaction.
    async fn write_reg_bytes(&mut self, register: u8, payload: &[u8]) -> Result<(), LinkError> {
        let mut transfer = Vec::with_capacity(1 + payload.len());
        transfer.push(register);
        transfer.extend_from_slice(payload);
        self.write(&transfer).await
    }

    /// Reads a register by clocking `[register]` plus `trailing` dummy bytes in duplex.
    ///
    /// The returned vector has `1 + trailing` bytes.
    async fn read_reg(&mut self, register: u8, trailing: usize) -> Result<Vec<u8>, LinkError> {
        let mut request = vec![0x00; 1 + trailing];
        request[0] = register;
        let response = self.exchange(&request).await?;
        if response.len() != request.len() {
            return Err(LinkError::ShortResponse {
                expected: request.len(),
                actual: response.len(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        (**self).write(bytes).await
    }

    async fn exchange(&mut self, bytes: &[u8]) -> Result<Vec<u8>, LinkError> {
        (**self).exchange(bytes).await
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        (**self).close().await
    }
}
