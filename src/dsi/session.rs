use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::bridge::registers;
use super::packet::Packet;
use crate::error::{DriveError, ProtocolError};
use crate::transport::Transport;
use crate::utils::{format_hex, run_cancellable};

/// One register write carrying one or more encoded packets.
#[derive(Debug, Clone, Eq, PartialEq)]
struct Transfer {
    register: u8,
    bytes: Vec<u8>,
}

/// Ordered packets for one frame or command sequence.
///
/// Packets are encoded as they are appended, so size violations surface before anything is sent.
/// The only way to transmit is [`TransmissionSession::send`], which consumes the session and
/// issues transfers in append order.
#[derive(Debug, Default)]
pub struct TransmissionSession {
    transfers: Vec<Transfer>,
    packets: usize,
    wire_bytes: usize,
}

impl TransmissionSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one packet as its own transfer on the raw injection register.
    ///
    /// # Errors
    ///
    /// Returns an error when the packet cannot be encoded.
    pub fn push(&mut self, packet: &Packet) -> Result<&mut Self, ProtocolError> {
        let mut bytes = Vec::with_capacity(packet.wire_len());
        packet.encode_into(&mut bytes)?;
        self.push_transfer(registers::PKT_WR_DATA_RAW, bytes, 1);
        Ok(self)
    }

    /// Appends several packets, followed by an optional raw trailer, as a single transfer.
    ///
    /// # Errors
    ///
    /// Returns an error when any packet cannot be encoded; nothing is appended in that case.
    pub fn push_batch<'a>(
        &mut self,
        packets: impl IntoIterator<Item = &'a Packet>,
        trailer: Option<&[u8]>,
    ) -> Result<&mut Self, ProtocolError> {
        let mut bytes = Vec::new();
        let mut count = 0usize;
        for packet in packets {
            packet.encode_into(&mut bytes)?;
            count += 1;
        }
        if let Some(trailer) = trailer {
            bytes.extend_from_slice(trailer);
            count += 1;
        }
        self.push_transfer(registers::PKT_WR_DATA_RAW, bytes, count);
        Ok(self)
    }

    /// Appends an already encoded packet destined for `register`.
    pub(crate) fn push_encoded(&mut self, register: u8, bytes: Vec<u8>) -> &mut Self {
        self.push_transfer(register, bytes, 1);
        self
    }

    fn push_transfer(&mut self, register: u8, bytes: Vec<u8>, packets: usize) {
        self.packets += packets;
        self.wire_bytes += 1 + bytes.len();
        self.transfers.push(Transfer { register, bytes });
    }

    /// Number of packets appended so far.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packets
    }

    /// Number of link transactions `send` will issue.
    #[must_use]
    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Sends every transfer in append order.
    ///
    /// Cancellation is checked between transfers and while a transfer is in flight; a cancelled
    /// session leaves the device mid-frame.
    ///
    /// # Errors
    ///
    /// Returns the first link failure or [`DriveError::Cancelled`]; later transfers are not sent.
    #[instrument(
        skip_all,
        level = "debug",
        fields(transfers = self.transfers.len(), packets = self.packets)
    )]
    pub async fn send<T>(
        self,
        link: &mut T,
        cancel: &CancellationToken,
    ) -> Result<SessionReceipt, DriveError>
    where
        T: Transport + ?Sized,
    {
        let Self {
            transfers,
            packets,
            wire_bytes,
        } = self;
        let transfer_count = transfers.len();

        for (index, transfer) in transfers.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DriveError::Cancelled);
            }
            tracing::trace!(
                index,
                register = transfer.register,
                len = transfer.bytes.len(),
                head = %format_hex(&transfer.bytes[..transfer.bytes.len().min(8)]),
                "sending transfer"
            );
            run_cancellable(
                cancel,
                link.write_reg_bytes(transfer.register, &transfer.bytes),
            )
            .await??;
        }

        Ok(SessionReceipt {
            transfers: transfer_count,
            packets,
            wire_bytes,
        })
    }
}

/// Counts reported after a session has been sent.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct SessionReceipt {
    transfers: usize,
    packets: usize,
    wire_bytes: usize,
}

impl SessionReceipt {
    /// Link transactions issued.
    #[must_use]
    pub fn transfers(&self) -> usize {
        self.transfers
    }

    /// Packets carried by those transactions.
    #[must_use]
    pub fn packets(&self) -> usize {
        self.packets
    }

    /// Bytes clocked out, including register addresses.
    #[must_use]
    pub fn wire_bytes(&self) -> usize {
        self.wire_bytes
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dsi::packet::{EOTP, MAX_LONG_PAYLOAD_LEN, dcs};
    use crate::transport::{FakeTransport, FakeTransportConfig};

    #[tokio::test]
    async fn send_preserves_append_order() -> Result<(), DriveError> {
        let mut session = TransmissionSession::new();
        session
            .push(&Packet::dcs_long(dcs::SET_COLUMN_ADDRESS, [0, 0, 0, 0xEF]))?
            .push(&Packet::dcs_long(dcs::SET_PAGE_ADDRESS, [0, 0, 0, 0xEF]))?
            .push(&Packet::dcs_short(dcs::SET_DISPLAY_ON, None))?;
        let mut link = FakeTransport::default();

        let receipt = session.send(&mut link, &CancellationToken::new()).await?;

        let commands: Vec<(u8, u8)> = link
            .transactions()
            .iter()
            .map(|transaction| (transaction.bytes()[0], transaction.bytes()[5]))
            .take(2)
            .collect();
        assert_eq!(
            vec![
                (registers::PKT_WR_DATA_RAW, dcs::SET_COLUMN_ADDRESS),
                (registers::PKT_WR_DATA_RAW, dcs::SET_PAGE_ADDRESS),
            ],
            commands
        );
        assert_eq!(
            &[0x20, 0x05, 0x29, 0x00, 0x1C],
            link.transactions()[2].bytes()
        );
        assert_eq!(3, receipt.transfers());
        assert_eq!(3, receipt.packets());
        assert_eq!(12 + 12 + 5, receipt.wire_bytes());
        Ok(())
    }

    #[tokio::test]
    async fn batch_concatenates_packets_and_trailer_into_one_transfer() -> Result<(), DriveError> {
        let packets = [
            Packet::dcs_short(dcs::EXIT_SLEEP_MODE, None),
            Packet::dcs_short(dcs::SET_DISPLAY_ON, None),
        ];
        let mut session = TransmissionSession::new();
        session.push_batch(&packets, Some(EOTP.as_slice()))?;
        let mut link = FakeTransport::default();

        let receipt = session.send(&mut link, &CancellationToken::new()).await?;

        assert_eq!(1, link.transactions().len());
        assert_eq!(
            &[
                0x20, 0x05, 0x11, 0x00, 0x36, 0x05, 0x29, 0x00, 0x1C, 0x08, 0x0F, 0x0F, 0x01
            ],
            link.transactions()[0].bytes()
        );
        assert_eq!(3, receipt.packets());
        Ok(())
    }

    #[test]
    fn oversized_packet_is_rejected_before_anything_is_queued() {
        let mut session = TransmissionSession::new();

        let result = session.push(&Packet::dcs_long(0x2C, vec![0; MAX_LONG_PAYLOAD_LEN]));

        assert_matches!(result, Err(ProtocolError::PayloadTooLarge { .. }));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn link_failure_stops_the_session() -> Result<(), ProtocolError> {
        let mut session = TransmissionSession::new();
        for _ in 0..4 {
            session.push(&Packet::dcs_short(dcs::SET_DISPLAY_ON, None))?;
        }
        let mut link = FakeTransport::new(FakeTransportConfig::builder().fail_at(2).build());

        let result = session.send(&mut link, &CancellationToken::new()).await;

        assert_matches!(result, Err(DriveError::Link(_)));
        assert_eq!(2, link.transactions().len());
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_session_sends_nothing() -> Result<(), ProtocolError> {
        let mut session = TransmissionSession::new();
        session.push(&Packet::dcs_short(dcs::SET_DISPLAY_ON, None))?;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut link = FakeTransport::default();

        let result = session.send(&mut link, &cancel).await;

        assert_matches!(result, Err(DriveError::Cancelled));
        assert!(link.transactions().is_empty());
        Ok(())
    }
}
