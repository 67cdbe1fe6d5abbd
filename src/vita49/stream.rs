//! Stream-oriented façade over [`header`], [`signal_data`], and
//! [`context`]: splits large sample runs across multiple Signal Data
//! packets with a 4-bit rolling sequence counter, and iterates
//! concatenated packets on decode.
//!
//! Grounded in `original_source/src/libs/Vita49_2/Vita49Codec.{h,cpp}`:
//! `ParsedPacket` (type discriminator + header + samples/fields union) and
//! `Vita49Codec`'s constructor-held `{byteOrder, scaleFactor}` pair are
//! carried one-for-one. The codec remains a pure function family over
//! byte buffers with no shared mutable state (spec.md §5), so
//! `Vita49Codec` here holds only its two configuration fields, safe to
//! share across threads for disjoint buffers.

use super::byteorder::ByteOrder;
use super::context::{self, ContextFields};
use super::header::{FractionalTsType, IntegerTsType, PacketHeader, PacketType};
use super::signal_data::{self, DEFAULT_SCALE_FACTOR};
use super::IqSamples;
use crate::error::Result;

/// Discriminated result of parsing one VITA 49.2 packet, mirroring the
/// original's `ParsedPacket` union-by-tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPacket {
    SignalData { header: PacketHeader, samples: IqSamples },
    Context { header: PacketHeader, fields: ContextFields },
}

impl ParsedPacket {
    pub fn header(&self) -> &PacketHeader {
        match self {
            ParsedPacket::SignalData { header, .. } => header,
            ParsedPacket::Context { header, .. } => header,
        }
    }
}

/// High-level VITA 49.2 codec: byte order and scale factor are fixed at
/// construction and reused across every encode/decode call.
#[derive(Debug, Clone, Copy)]
pub struct Vita49Codec {
    order: ByteOrder,
    scale_factor: f32,
}

impl Vita49Codec {
    /// `order` defaults to big-endian per the VITA 49.2 standard (spec.md
    /// §6); `scale_factor` defaults to 32768.0.
    pub fn new(order: ByteOrder, scale_factor: f32) -> Self {
        Self { order, scale_factor }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn set_scale_factor(&mut self, factor: f32) {
        self.scale_factor = factor;
    }

    /// Parse a single packet from the start of `data`, dispatching on the
    /// header's packet type. Returns the parsed packet and bytes consumed.
    pub fn parse_packet(&self, data: &[u8]) -> Result<(ParsedPacket, usize)> {
        let (peek, _) = PacketHeader::parse(data, self.order)?;
        match peek.packet_type {
            PacketType::SignalDataNoStreamId | PacketType::SignalDataWithStreamId => {
                let (header, samples, consumed) = signal_data::decode(data, self.order, self.scale_factor)?;
                Ok((ParsedPacket::SignalData { header, samples }, consumed))
            }
            PacketType::Context | PacketType::ExtensionContext => {
                let (header, fields, consumed) = context::decode(data, self.order, false)?;
                Ok((ParsedPacket::Context { header, fields }, consumed))
            }
            PacketType::Other(_) => Err(crate::error::WorkbenchError::Protocol(
                "unrecognised packet type".into(),
            )),
        }
    }

    /// Iterate concatenated packets in `data`, stopping at end of buffer
    /// or on the first parse failure (spec.md §4.8, §6: "trailing bytes
    /// that do not form a complete packet terminate parsing without error
    /// on the consumed prefix").
    pub fn parse_stream(&self, data: &[u8]) -> Vec<ParsedPacket> {
        let mut packets = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            match self.parse_packet(&data[offset..]) {
                Ok((packet, consumed)) if consumed > 0 => {
                    packets.push(packet);
                    offset += consumed;
                }
                _ => break,
            }
        }
        packets
    }

    /// Encode `samples` as one or more Signal Data packets, splitting at
    /// `max_samples_per_packet` and incrementing `packet_count` mod 16
    /// across packets. The timestamp, if any, is written only on the
    /// first packet (spec.md §4.8).
    #[allow(clippy::too_many_arguments)]
    pub fn encode_signal_data(
        &self,
        stream_id: u32,
        samples: &IqSamples,
        start_packet_count: u8,
        tsi: IntegerTsType,
        tsf: FractionalTsType,
        integer_timestamp: u32,
        fractional_timestamp: u64,
        include_trailer: bool,
    ) -> Vec<u8> {
        let max_samples = signal_data::max_samples_per_packet(tsi, tsf, false, include_trailer);
        if max_samples == 0 {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut count = start_packet_count;
        for (i, chunk) in samples.chunks(max_samples).enumerate() {
            let (chunk_tsi, chunk_tsf) = if i == 0 {
                (tsi, tsf)
            } else {
                (IntegerTsType::None, FractionalTsType::None)
            };
            let packet = signal_data::encode(
                stream_id,
                chunk,
                count,
                self.order,
                self.scale_factor,
                chunk_tsi,
                chunk_tsf,
                integer_timestamp,
                fractional_timestamp,
                include_trailer,
            );
            out.extend_from_slice(&packet);
            count = count.wrapping_add(1) & 0x0F;
        }
        out
    }

    /// Encode a single Context packet.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_context(
        &self,
        stream_id: u32,
        fields: &ContextFields,
        packet_count: u8,
        tsi: IntegerTsType,
        tsf: FractionalTsType,
        integer_timestamp: u32,
        fractional_timestamp: u64,
    ) -> Vec<u8> {
        context::encode(
            stream_id,
            fields,
            packet_count,
            self.order,
            tsi,
            tsf,
            integer_timestamp,
            fractional_timestamp,
        )
    }
}

impl Default for Vita49Codec {
    fn default() -> Self {
        Self::new(ByteOrder::BigEndian, DEFAULT_SCALE_FACTOR)
    }
}
