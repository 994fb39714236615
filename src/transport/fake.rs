use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use strum_macros::Display;
use tokio::time::sleep;

use super::Transport;
use crate::error::LinkError;
use crate::panel::registers;
use crate::utils::format_hex;

/// Direction of one recorded transaction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum TransactionKind {
    #[strum(to_string = "write")]
    Write,
    #[strum(to_string = "exchange")]
    Exchange,
}

/// One transaction observed by the fake link.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Transaction {
    kind: TransactionKind,
    bytes: Vec<u8>,
}

impl Transaction {
    #[must_use]
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Register addressed by the transaction (its first byte).
    #[must_use]
    pub fn register(&self) -> Option<u8> {
        self.bytes.first().copied()
    }

    /// Bytes after the register address.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.bytes.get(1..).unwrap_or_default()
    }
}

/// Behaviour of the simulated device behind a [`FakeTransport`].
#[derive(Debug, Clone, Default, Builder)]
pub struct FakeTransportConfig {
    /// Status reads reporting "busy" after each frame-swap trigger before the swap completes.
    #[builder(default)]
    busy_polls: u32,
    /// Never report swap-complete.
    #[builder(default)]
    never_ready: bool,
    /// Zero-based transaction index that fails with [`LinkError::InjectedFault`].
    fail_at: Option<usize>,
    /// Simulated round-trip time of each transaction.
    #[builder(default)]
    latency: Duration,
}

/// In-memory link that records every transaction and simulates the panel status register.
///
/// Duplex exchanges answer with zeros except for the last byte, which carries the swap-complete
/// flag once `busy_polls` reads have elapsed since the most recent swap trigger.
#[derive(Debug, Default)]
pub struct FakeTransport {
    config: FakeTransportConfig,
    transactions: Vec<Transaction>,
    polls_since_swap: u32,
    swaps: usize,
    closed: bool,
}

impl FakeTransport {
    #[must_use]
    pub fn new(config: FakeTransportConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Every transaction in issue order.
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Transactions addressed to `register`, in issue order.
    pub fn transactions_to(&self, register: u8) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .iter()
            .filter(move |transaction| transaction.register() == Some(register))
    }

    /// Number of frame-swap triggers seen.
    #[must_use]
    pub fn swaps(&self) -> usize {
        self.swaps
    }

    /// Whether [`Transport::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn record(&mut self, kind: TransactionKind, bytes: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        if !self.config.latency.is_zero() {
            sleep(self.config.latency).await;
        }

        let transaction = self.transactions.len();
        if self.config.fail_at == Some(transaction) {
            return Err(LinkError::InjectedFault { transaction });
        }

        tracing::trace!(%kind, transaction, bytes = %format_hex(bytes), "fake link transaction");
        self.transactions.push(Transaction {
            kind,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.record(TransactionKind::Write, bytes).await?;
        if bytes.first() == Some(&registers::FRAME_SWAP) {
            self.swaps += 1;
            self.polls_since_swap = 0;
        }
        Ok(())
    }

    async fn exchange(&mut self, bytes: &[u8]) -> Result<Vec<u8>, LinkError> {
        self.record(TransactionKind::Exchange, bytes).await?;
        let mut response = vec![0x00; bytes.len()];
        let ready = !self.config.never_ready && self.polls_since_swap >= self.config.busy_polls;
        self.polls_since_swap = self.polls_since_swap.saturating_add(1);
        if ready && let Some(last) = response.last_mut() {
            *last = registers::STATUS_SWAP_COMPLETE;
        }
        Ok(response)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn records_transactions_in_issue_order() -> Result<(), LinkError> {
        let mut link = FakeTransport::default();

        link.write_reg_u16(0x00, 0x8000).await?;
        link.write_reg_u8(0x10, 0x18).await?;
        let status = link.read_reg(0x00, 1).await?;

        let observed: Vec<(TransactionKind, Vec<u8>)> = link
            .transactions()
            .iter()
            .map(|transaction| (transaction.kind(), transaction.bytes().to_vec()))
            .collect();
        assert_eq!(
            vec![
                (TransactionKind::Write, vec![0x00, 0x80, 0x00]),
                (TransactionKind::Write, vec![0x10, 0x18]),
                (TransactionKind::Exchange, vec![0x00, 0x00]),
            ],
            observed
        );
        assert_eq!(vec![0x00, 0x02], status);
        Ok(())
    }

    #[tokio::test]
    async fn status_stays_busy_for_configured_polls_after_swap() -> Result<(), LinkError> {
        let mut link = FakeTransport::new(FakeTransportConfig::builder().busy_polls(2).build());

        link.write_reg_u8(registers::FRAME_SWAP, 0x00).await?;
        let mut responses = Vec::new();
        for _ in 0..3 {
            responses.push(link.read_reg(registers::STATUS, 1).await?);
        }

        assert_eq!(vec![vec![0, 0], vec![0, 0], vec![0, 2]], responses);
        assert_eq!(1, link.swaps());
        Ok(())
    }

    #[tokio::test]
    async fn injected_fault_aborts_the_selected_transaction() {
        let mut link = FakeTransport::new(FakeTransportConfig::builder().fail_at(1).build());

        let first = link.write(&[0x20, 0x01]).await;
        let second = link.write(&[0x20, 0x02]).await;

        assert_matches!(first, Ok(()));
        assert_matches!(second, Err(LinkError::InjectedFault { transaction: 1 }));
        assert_eq!(1, link.transactions().len());
    }

    #[tokio::test]
    async fn closed_link_rejects_further_traffic() -> Result<(), LinkError> {
        let mut link = FakeTransport::default();
        link.close().await?;

        let result = link.write(&[0x00]).await;

        assert_matches!(result, Err(LinkError::Closed));
        assert!(link.is_closed());
        Ok(())
    }
}
