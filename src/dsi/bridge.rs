use std::time::Duration;

use bon::Builder;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::chunker::{DEFAULT_MAX_TRANSFER, FrameChunker};
use super::packet::{EOTP, Packet, dcs};
use super::session::{SessionReceipt, TransmissionSession};
use crate::error::{DriveError, LinkError, ProtocolError};
use crate::media::{PanelDimensions, PixelBuffer, PixelFormat};
use crate::transport::Transport;
use crate::utils::{run_cancellable, sleep_cancellable};

/// Register map of the serial-to-DSI bridge.
pub mod registers {
    /// Control word: reset, HS clock enable and backlight level.
    pub const LCD_CTRL: u8 = 0x00;
    /// HS prepare time.
    pub const DSI_HS_PREP: u8 = 0x10;
    /// HS zero time.
    pub const DSI_HS_ZERO: u8 = 0x11;
    /// HS trail time.
    pub const DSI_HS_TRAIL: u8 = 0x12;
    /// Raw packet injection; bytes are forwarded to the panel untouched.
    pub const PKT_WR_DATA_RAW: u8 = 0x20;
    /// Packed packet injection; the bridge expands each byte before forwarding.
    pub const PKT_WR_DATA_U8: u8 = 0x21;

    /// Control bit holding the panel in reset with the backlight off.
    pub const CTRL_RESET: u16 = 0x8000;
    /// Control bit enabling the HS clock lane.
    pub const CTRL_HS_CLOCK: u16 = 0x4000;
    /// Control bits available to the backlight level.
    pub const CTRL_BACKLIGHT_MASK: u16 = 0x3FFF;
}

pub const DEFAULT_BACKLIGHT: u16 = 0x0100;
pub const DEFAULT_HS_PREP: u8 = 0x10;
pub const DEFAULT_HS_ZERO: u8 = 0x18;
pub const DEFAULT_HS_TRAIL: u8 = 0x18;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Static settings applied during bring-up and frame transmission.
#[derive(Debug, Clone, Eq, PartialEq, Builder)]
pub struct DsiBridgeConfig {
    /// Largest link transaction the bridge accepts, register byte included.
    #[builder(default = DEFAULT_MAX_TRANSFER)]
    max_transfer: usize,
    #[builder(default = DEFAULT_BACKLIGHT)]
    backlight: u16,
    #[builder(default = DEFAULT_HS_PREP)]
    hs_prep: u8,
    #[builder(default = DEFAULT_HS_ZERO)]
    hs_zero: u8,
    #[builder(default = DEFAULT_HS_TRAIL)]
    hs_trail: u8,
    /// Wait after asserting reset and after enabling the HS clock.
    #[builder(default = DEFAULT_SETTLE_DELAY)]
    settle_delay: Duration,
    /// Open a full-frame column/page window before each frame.
    #[builder(default = true)]
    address_window: bool,
}

impl Default for DsiBridgeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DsiBridgeConfig {
    #[must_use]
    pub fn max_transfer(&self) -> usize {
        self.max_transfer
    }

    #[must_use]
    pub fn backlight(&self) -> u16 {
        self.backlight
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    #[must_use]
    pub fn address_window(&self) -> bool {
        self.address_window
    }
}

/// Counts reported after a DSI frame has been sent.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct FrameReceipt {
    dimensions: PanelDimensions,
    format: PixelFormat,
    chunk_size: usize,
    #[serde(flatten)]
    session: SessionReceipt,
}

impl FrameReceipt {
    #[must_use]
    pub fn dimensions(&self) -> PanelDimensions {
        self.dimensions
    }

    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Pixel bytes per memory-write packet, in RGB565 terms.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn session(&self) -> SessionReceipt {
        self.session
    }
}

/// Panel behind a serial-to-DSI bridge.
///
/// The bridge owns its link for its whole lifetime; every operation borrows it mutably, so at most
/// one packet stream is ever in flight.
#[derive(Debug)]
pub struct DsiBridge<T> {
    link: T,
    config: DsiBridgeConfig,
    chunker: FrameChunker,
    hs_clock: bool,
}

impl<T> DsiBridge<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(link: T, config: DsiBridgeConfig) -> Self {
        let chunker = FrameChunker::new(config.max_transfer);
        Self {
            link,
            config,
            chunker,
            hs_clock: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DsiBridgeConfig {
        &self.config
    }

    #[must_use]
    pub fn link(&self) -> &T {
        &self.link
    }

    pub fn into_link(self) -> T {
        self.link
    }

    /// Resets the panel, programs HS timing and sends the fixed DCS bring-up sequence.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured backlight collides with the control flags, the link
    /// fails, or `cancel` fires.
    #[instrument(skip_all, level = "debug", fields(backlight = self.config.backlight))]
    pub async fn initialise(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SessionReceipt, DriveError> {
        let backlight = checked_backlight(self.config.backlight)?;
        let settle = self.config.settle_delay;

        self.hs_clock = false;
        self.write_control(registers::CTRL_RESET, cancel).await?;
        sleep_cancellable(cancel, settle).await?;
        self.write_control(backlight, cancel).await?;

        let timings = [
            (registers::DSI_HS_PREP, self.config.hs_prep),
            (registers::DSI_HS_ZERO, self.config.hs_zero),
            (registers::DSI_HS_TRAIL, self.config.hs_trail),
        ];
        for (register, value) in timings {
            run_cancellable(cancel, self.link.write_reg_u8(register, value)).await??;
        }

        self.write_control(registers::CTRL_HS_CLOCK | backlight, cancel)
            .await?;
        self.hs_clock = true;
        sleep_cancellable(cancel, settle).await?;

        let mut session = TransmissionSession::new();
        session.push_batch(&bring_up_packets(), Some(EOTP.as_slice()))?;
        let receipt = session.send(&mut self.link, cancel).await?;
        tracing::info!(packets = receipt.packets(), "panel bring-up complete");
        Ok(receipt)
    }

    /// Changes the backlight level, keeping the HS clock enabled once bring-up has run.
    ///
    /// # Errors
    ///
    /// Returns an error when `level` collides with the control flags, the link fails, or `cancel`
    /// fires.
    pub async fn set_backlight(
        &mut self,
        level: u16,
        cancel: &CancellationToken,
    ) -> Result<(), DriveError> {
        let level = checked_backlight(level)?;
        let flags = if self.hs_clock {
            registers::CTRL_HS_CLOCK
        } else {
            0
        };
        self.write_control(flags | level, cancel).await?;
        self.config.backlight = level;
        Ok(())
    }

    /// Sets the inclusive column range of subsequent memory writes.
    ///
    /// # Errors
    ///
    /// Returns an error when the link fails or `cancel` fires.
    pub async fn set_column_address(
        &mut self,
        start: u16,
        end: u16,
        cancel: &CancellationToken,
    ) -> Result<SessionReceipt, DriveError> {
        self.send_single(&address_window_packet(dcs::SET_COLUMN_ADDRESS, start, end), cancel)
            .await
    }

    /// Sets the inclusive page (row) range of subsequent memory writes.
    ///
    /// # Errors
    ///
    /// Returns an error when the link fails or `cancel` fires.
    pub async fn set_page_address(
        &mut self,
        start: u16,
        end: u16,
        cancel: &CancellationToken,
    ) -> Result<SessionReceipt, DriveError> {
        self.send_single(&address_window_packet(dcs::SET_PAGE_ADDRESS, start, end), cancel)
            .await
    }

    /// Builds the ordered transfers for one frame without touching the link.
    ///
    /// RGB565 frames become memory-write packets on the raw register; packed frames are sent on
    /// the packed register.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame cannot be chunked for the configured transfer limit.
    pub fn frame_session(&self, frame: &PixelBuffer) -> Result<TransmissionSession, ProtocolError> {
        let mut session = TransmissionSession::new();
        if self.config.address_window {
            let dimensions = frame.dimensions();
            session
                .push(&address_window_packet(
                    dcs::SET_COLUMN_ADDRESS,
                    0,
                    dimensions.width() - 1,
                ))?
                .push(&address_window_packet(
                    dcs::SET_PAGE_ADDRESS,
                    0,
                    dimensions.height() - 1,
                ))?;
        }

        match frame.format() {
            PixelFormat::Rgb565 => {
                for packet in self.chunker.raw_packets(frame)? {
                    session.push(&packet)?;
                }
            }
            PixelFormat::Packed8 => {
                for bytes in self.chunker.packed_packets(frame)? {
                    session.push_encoded(registers::PKT_WR_DATA_U8, bytes?);
                }
            }
        }

        Ok(session)
    }

    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame cannot be chunked, the link fails, or `cancel` fires.
    /// Nothing is sent when chunking fails.
    #[instrument(
        skip_all,
        fields(dimensions = %frame.dimensions(), format = %frame.format())
    )]
    pub async fn send_frame(
        &mut self,
        frame: &PixelBuffer,
        cancel: &CancellationToken,
    ) -> Result<FrameReceipt, DriveError> {
        let plan = self.chunker.plan(frame.dimensions())?;
        let session = self.frame_session(frame)?;
        tracing::debug!(
            packet_count = session.packet_count(),
            chunk_size = plan.chunk_size(),
            "sending frame"
        );
        let receipt = session.send(&mut self.link, cancel).await?;

        Ok(FrameReceipt {
            dimensions: frame.dimensions(),
            format: frame.format(),
            chunk_size: plan.chunk_size(),
            session: receipt,
        })
    }

    /// Releases the link.
    ///
    /// # Errors
    ///
    /// Returns an error when the link fails to flush or close.
    pub async fn close(&mut self) -> Result<(), LinkError> {
        self.link.close().await
    }

    async fn write_control(
        &mut self,
        value: u16,
        cancel: &CancellationToken,
    ) -> Result<(), DriveError> {
        tracing::trace!(value = format_args!("0x{value:04X}"), "writing control register");
        run_cancellable(cancel, self.link.write_reg_u16(registers::LCD_CTRL, value)).await??;
        Ok(())
    }

    async fn send_single(
        &mut self,
        packet: &Packet,
        cancel: &CancellationToken,
    ) -> Result<SessionReceipt, DriveError> {
        let mut session = TransmissionSession::new();
        session.push(packet)?;
        session.send(&mut self.link, cancel).await
    }
}

fn checked_backlight(level: u16) -> Result<u16, ProtocolError> {
    if level & !registers::CTRL_BACKLIGHT_MASK != 0 {
        return Err(ProtocolError::BacklightOutOfRange { level });
    }
    Ok(level)
}

fn bring_up_packets() -> [Packet; 4] {
    [
        Packet::dcs_short(dcs::EXIT_SLEEP_MODE, None),
        Packet::dcs_short(dcs::SET_DISPLAY_ON, None),
        Packet::dcs_short(dcs::SET_ADDRESS_MODE, Some(0x00)),
        Packet::dcs_short(dcs::SET_PIXEL_FORMAT, Some(0x55)),
    ]
}

fn address_window_packet(cmd: u8, start: u16, end: u16) -> Packet {
    let [start_hi, start_lo] = start.to_be_bytes();
    let [end_hi, end_lo] = end.to_be_bytes();
    Packet::dcs_long(cmd, [start_hi, start_lo, end_hi, end_lo])
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    use super::*;
    use crate::transport::{FakeTransport, FakeTransportConfig};

    fn hex_dump(link: &FakeTransport) -> String {
        link.transactions()
            .iter()
            .map(|transaction| hex::encode_upper(transaction.bytes()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn bridge(config: DsiBridgeConfig) -> DsiBridge<FakeTransport> {
        DsiBridge::new(FakeTransport::default(), config)
    }

    #[tokio::test(start_paused = true)]
    async fn bring_up_sequence_matches_bridge_register_map() -> Result<(), DriveError> {
        let mut bridge = bridge(DsiBridgeConfig::default());
        let started = Instant::now();

        let receipt = bridge.initialise(&CancellationToken::new()).await?;

        assert_snapshot!(hex_dump(bridge.link()), @r"
        008000
        000100
        1010
        1118
        1218
        004100
        20051100360529001C15360029153A5502080F0F01
        ");
        assert_eq!(5, receipt.packets());
        assert_eq!(1, receipt.transfers());
        assert!(started.elapsed() >= 2 * DEFAULT_SETTLE_DELAY);
        Ok(())
    }

    #[tokio::test]
    async fn backlight_colliding_with_control_flags_is_rejected() {
        let mut bridge = bridge(DsiBridgeConfig::builder().backlight(0x4001).build());

        let result = bridge.initialise(&CancellationToken::new()).await;

        assert_matches!(
            result,
            Err(DriveError::Protocol(ProtocolError::BacklightOutOfRange { level: 0x4001 }))
        );
        assert!(bridge.link().transactions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn backlight_keeps_hs_clock_after_bring_up() -> Result<(), DriveError> {
        let cancel = CancellationToken::new();
        let mut bridge = bridge(DsiBridgeConfig::default());

        bridge.set_backlight(0x0080, &cancel).await?;
        bridge.initialise(&cancel).await?;
        bridge.set_backlight(0x0020, &cancel).await?;

        let controls: Vec<&[u8]> = bridge
            .link()
            .transactions_to(registers::LCD_CTRL)
            .map(|transaction| transaction.payload())
            .collect();
        assert_eq!(Some(&&[0x00, 0x80][..]), controls.first());
        assert_eq!(Some(&&[0x40, 0x20][..]), controls.last());
        assert_eq!(0x0020, bridge.config().backlight());
        Ok(())
    }

    #[tokio::test]
    async fn address_window_uses_big_endian_bounds() -> Result<(), DriveError> {
        let cancel = CancellationToken::new();
        let mut bridge = bridge(DsiBridgeConfig::default());

        bridge.set_column_address(0, 239, &cancel).await?;
        bridge.set_page_address(0x0102, 0x0304, &cancel).await?;

        assert_eq!(
            &[0x20, 0x39, 0x05, 0x00, 0x36, 0x2A, 0x00, 0x00, 0x00, 0xEF, 0x48, 0x03],
            bridge.link().transactions()[0].bytes()
        );
        assert_eq!(
            &[0x2B, 0x01, 0x02, 0x03, 0x04],
            &bridge.link().transactions()[1].bytes()[5..10]
        );
        Ok(())
    }

    #[tokio::test]
    async fn rgb565_frame_opens_window_then_streams_memory_writes() -> Result<(), DriveError> {
        let dimensions = PanelDimensions::new(240, 240).expect("240x240 should be valid");
        let frame = PixelBuffer::new(dimensions, PixelFormat::Rgb565, vec![0x5A; 115_200])?;
        let mut bridge = bridge(DsiBridgeConfig::default());

        let receipt = bridge.send_frame(&frame, &CancellationToken::new()).await?;

        let transactions = bridge.link().transactions();
        assert_eq!(122, transactions.len());
        let opcodes: Vec<u8> = transactions.iter().map(|transaction| transaction.bytes()[5]).collect();
        assert_eq!(
            &[dcs::SET_COLUMN_ADDRESS, dcs::SET_PAGE_ADDRESS, dcs::WRITE_MEMORY_START],
            &opcodes[..3]
        );
        assert!(opcodes[3..].iter().all(|opcode| *opcode == dcs::WRITE_MEMORY_CONTINUE));
        assert!(
            transactions
                .iter()
                .all(|transaction| transaction.bytes().len() <= DEFAULT_MAX_TRANSFER)
        );
        assert_eq!(960, receipt.chunk_size());
        assert_eq!(122, receipt.session().packets());
        Ok(())
    }

    #[tokio::test]
    async fn packed_frame_goes_to_packed_register_without_window() -> Result<(), DriveError> {
        let dimensions = PanelDimensions::new(64, 64).expect("64x64 should be valid");
        let frame = PixelBuffer::new(dimensions, PixelFormat::Packed8, vec![0x11; 64 * 64])?;
        let mut bridge = bridge(DsiBridgeConfig::builder().address_window(false).build());

        bridge.send_frame(&frame, &CancellationToken::new()).await?;

        let transactions = bridge.link().transactions();
        assert_eq!(10, transactions.len());
        assert!(
            transactions
                .iter()
                .all(|transaction| transaction.register() == Some(registers::PKT_WR_DATA_U8))
        );
        assert_eq!(dcs::WRITE_MEMORY_START, transactions[0].bytes()[5]);
        Ok(())
    }

    #[tokio::test]
    async fn chunking_failure_sends_nothing() -> Result<(), DriveError> {
        let dimensions = PanelDimensions::new(600, 2).expect("600x2 should be valid");
        let frame = PixelBuffer::new(dimensions, PixelFormat::Rgb565, vec![0; 2400])?;
        let mut bridge = bridge(DsiBridgeConfig::default());

        let result = bridge.send_frame(&frame, &CancellationToken::new()).await;

        assert_matches!(
            result,
            Err(DriveError::Protocol(ProtocolError::ScanlineExceedsMtu { .. }))
        );
        assert!(bridge.link().transactions().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn link_failure_mid_frame_is_reported() -> Result<(), DriveError> {
        let dimensions = PanelDimensions::new(64, 64).expect("64x64 should be valid");
        let frame = PixelBuffer::new(dimensions, PixelFormat::Rgb565, vec![0; 64 * 64 * 2])?;
        let link = FakeTransport::new(FakeTransportConfig::builder().fail_at(4).build());
        let mut bridge = DsiBridge::new(link, DsiBridgeConfig::default());

        let result = bridge.send_frame(&frame, &CancellationToken::new()).await;

        assert_matches!(
            result,
            Err(DriveError::Link(LinkError::InjectedFault { transaction: 4 }))
        );
        assert_eq!(4, bridge.link().transactions().len());
        Ok(())
    }

    #[tokio::test]
    async fn close_releases_the_link() -> Result<(), LinkError> {
        let mut bridge = bridge(DsiBridgeConfig::default());

        bridge.close().await?;

        assert!(bridge.into_link().is_closed());
        Ok(())
    }
}
