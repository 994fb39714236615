use serde::Serialize;

use super::ecc::with_ecc;
use super::packet::{CHECKSUM_LEN, CommandSet, HEADER_LEN, MAX_LONG_PAYLOAD_LEN, Packet, dcs};
use crate::error::ProtocolError;
use crate::media::{PanelDimensions, PixelBuffer, PixelFormat};

/// Default bytes per link transaction accepted by the bridge.
pub const DEFAULT_MAX_TRANSFER: usize = 1024;
/// Register address byte preceding every injected packet.
const REGISTER_LEN: usize = 1;
/// Bytes per RGB565 pixel, which fixes the scanline stride for both variants.
const RGB565_BYTES_PER_PIXEL: usize = 2;

/// Chunking arithmetic for one frame geometry.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct ChunkPlan {
    stride: usize,
    chunk_size: usize,
    total_bytes: usize,
    packet_count: usize,
}

impl ChunkPlan {
    /// Bytes per RGB565 scanline.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Pixel bytes carried by every packet except possibly the last.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// RGB565 bytes in the frame.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Memory-write packets needed for the frame.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }
}

/// Splits frames into memory-write packets that never straddle a scanline.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FrameChunker {
    max_transfer: usize,
}

impl Default for FrameChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRANSFER)
    }
}

impl FrameChunker {
    #[must_use]
    pub const fn new(max_transfer: usize) -> Self {
        Self { max_transfer }
    }

    /// Largest pixel payload per packet: the transfer limit minus header, register byte and
    /// checksum.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer limit cannot hold the framing overhead.
    ///
    /// ```
    /// use panelwire::dsi::FrameChunker;
    ///
    /// assert_eq!(1017, FrameChunker::new(1024).mtu()?);
    /// # Ok::<(), panelwire::ProtocolError>(())
    /// ```
    pub fn mtu(&self) -> Result<usize, ProtocolError> {
        self.max_transfer
            .checked_sub(HEADER_LEN + REGISTER_LEN + CHECKSUM_LEN)
            .filter(|mtu| *mtu > 0)
            .ok_or(ProtocolError::TransferTooSmall {
                max_transfer: self.max_transfer,
            })
    }

    /// Computes chunk size and packet count for an RGB565 frame.
    ///
    /// # Errors
    ///
    /// Returns an error when one scanline does not fit the MTU.
    ///
    /// ```
    /// use panelwire::PanelDimensions;
    /// use panelwire::dsi::FrameChunker;
    ///
    /// let dimensions = PanelDimensions::new(240, 240).expect("240x240 should be valid");
    /// let plan = FrameChunker::new(1024).plan(dimensions)?;
    /// assert_eq!(960, plan.chunk_size());
    /// assert_eq!(120, plan.packet_count());
    /// # Ok::<(), panelwire::ProtocolError>(())
    /// ```
    pub fn plan(&self, dimensions: PanelDimensions) -> Result<ChunkPlan, ProtocolError> {
        let mtu = self.mtu()?;
        let stride = RGB565_BYTES_PER_PIXEL * usize::from(dimensions.width());
        let chunk_size = (mtu / stride) * stride;
        if chunk_size == 0 {
            return Err(ProtocolError::ScanlineExceedsMtu { stride, mtu });
        }
        let total_bytes = RGB565_BYTES_PER_PIXEL * dimensions.pixel_count();

        Ok(ChunkPlan {
            stride,
            chunk_size,
            total_bytes,
            packet_count: total_bytes.div_ceil(chunk_size),
        })
    }

    /// Memory-write packets for an RGB565 frame, in transmission order.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame is not RGB565, is not whole scanlines, or a scanline does
    /// not fit the MTU.
    pub fn raw_packets<'a>(
        &self,
        frame: &'a PixelBuffer,
    ) -> Result<impl ExactSizeIterator<Item = Packet> + 'a, ProtocolError> {
        if frame.format() != PixelFormat::Rgb565 {
            return Err(ProtocolError::UnsupportedFormat {
                format: frame.format(),
                pipeline: "raw memory-write",
            });
        }
        let plan = self.plan(frame.dimensions())?;
        check_whole_scanlines(frame.bytes().len(), plan.stride)?;

        Ok(frame
            .bytes()
            .chunks(plan.chunk_size)
            .enumerate()
            .map(|(index, chunk)| Packet::Long {
                set: CommandSet::Dcs,
                cmd: memory_write_opcode(index),
                data: chunk.to_vec(),
            }))
    }

    /// Encoded packets for a packed frame, in transmission order.
    ///
    /// Each packet carries half as many bytes as the RGB565 chunk it stands for. The header
    /// declares the expanded length the bridge forwards to the panel, and a single zero byte
    /// closes the packet.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame is not packed, or a scanline does not fit the MTU. Each
    /// item fails on its own when the expanded length overflows the 16-bit word count.
    pub fn packed_packets<'a>(
        &self,
        frame: &'a PixelBuffer,
    ) -> Result<impl ExactSizeIterator<Item = Result<Vec<u8>, ProtocolError>> + 'a, ProtocolError>
    {
        if frame.format() != PixelFormat::Packed8 {
            return Err(ProtocolError::UnsupportedFormat {
                format: frame.format(),
                pipeline: "packed memory-write",
            });
        }
        let plan = self.plan(frame.dimensions())?;
        let packed_chunk = plan.chunk_size / 2;
        check_whole_scanlines(frame.bytes().len(), plan.stride / 2)?;

        Ok(frame
            .bytes()
            .chunks(packed_chunk)
            .enumerate()
            .map(|(index, chunk)| encode_packed(memory_write_opcode(index), chunk)))
    }
}

fn memory_write_opcode(index: usize) -> u8 {
    if index == 0 {
        dcs::WRITE_MEMORY_START
    } else {
        dcs::WRITE_MEMORY_CONTINUE
    }
}

fn check_whole_scanlines(buffer_len: usize, stride: usize) -> Result<(), ProtocolError> {
    if buffer_len % stride != 0 {
        return Err(ProtocolError::NotMultipleOfStride { buffer_len, stride });
    }
    Ok(())
}

fn encode_packed(opcode: u8, chunk: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let expanded_len = 2 * chunk.len() + 1;
    let word_count =
        u16::try_from(expanded_len).map_err(|_overflow| ProtocolError::PayloadTooLarge {
            payload_len: expanded_len,
            max_payload_len: MAX_LONG_PAYLOAD_LEN,
        })?;
    let [wc_lo, wc_hi] = word_count.to_le_bytes();
    let mut packet = Vec::with_capacity(HEADER_LEN + 1 + chunk.len() + 1);
    packet.extend_from_slice(&with_ecc([CommandSet::Dcs.long(), wc_lo, wc_hi]));
    packet.push(opcode);
    packet.extend_from_slice(chunk);
    packet.push(0x00);
    Ok(packet)
}
