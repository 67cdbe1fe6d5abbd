//! VITA 49.2 packet header codec: the mandatory header word plus optional
//! Stream ID, Class ID, integer timestamp, and fractional timestamp.
//!
//! Grounded in `original_source/src/libs/Vita49_2/PacketHeader.{h,cpp}`:
//! `PacketHeaderCodec::parse`/`serialize`/`sizeInWords`/`sizeInBytes`
//! become free functions on [`PacketHeader`], and the anonymous-namespace
//! `readWord`/`writeWord`/`readDWord`/`writeDWord` helpers there are
//! `byteorder::read_u32`/`write_u32`/`read_u64_words`/`write_u64_words`.
//!
//! Bit layout resolves spec.md §4.5's word-0 description (which names an
//! inconsistent 6-bit and 4-bit packet type in different sections) to the
//! VITA 49.2 standard's own 4-bit type nibble, matching the wire layout's
//! `[31..28]` field width; see DESIGN.md.

use super::byteorder::{self, ByteOrder};
use crate::error::{Result, WorkbenchError};

/// Bounds-check an optional field of `n` bytes starting at `offset` against
/// a buffer of length `len`.
fn require(offset: usize, n: usize, len: usize) -> Result<()> {
    if offset + n > len {
        Err(WorkbenchError::Protocol(
            "packet header truncated before optional fields".into(),
        ))
    } else {
        Ok(())
    }
}

/// VITA 49.2 packet type, carried in the top 4 bits of the header word.
/// Only the two kinds this crate encodes/decodes are distinguished by
/// name; anything else round-trips via `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SignalDataNoStreamId,
    SignalDataWithStreamId,
    Context,
    ExtensionContext,
    Other(u8),
}

impl PacketType {
    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x0 => PacketType::SignalDataNoStreamId,
            0x1 => PacketType::SignalDataWithStreamId,
            0x4 => PacketType::Context,
            0x5 => PacketType::ExtensionContext,
            other => PacketType::Other(other),
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            PacketType::SignalDataNoStreamId => 0x0,
            PacketType::SignalDataWithStreamId => 0x1,
            PacketType::Context => 0x4,
            PacketType::ExtensionContext => 0x5,
            PacketType::Other(n) => n & 0x0F,
        }
    }

    /// True for packet types that always carry a Stream ID word: Signal
    /// Data with Stream ID, and every context packet variant (spec.md
    /// §4.5).
    pub fn has_stream_id(self) -> bool {
        matches!(
            self,
            PacketType::SignalDataWithStreamId | PacketType::Context | PacketType::ExtensionContext
        )
    }
}

/// Integer timestamp type (TSI), 2 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegerTsType {
    #[default]
    None,
    Utc,
    Gps,
    Other,
}

impl IntegerTsType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => IntegerTsType::None,
            1 => IntegerTsType::Utc,
            2 => IntegerTsType::Gps,
            _ => IntegerTsType::Other,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            IntegerTsType::None => 0,
            IntegerTsType::Utc => 1,
            IntegerTsType::Gps => 2,
            IntegerTsType::Other => 3,
        }
    }
}

/// Fractional timestamp type (TSF), 2 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FractionalTsType {
    #[default]
    None,
    SampleCount,
    RealTime,
    FreeRunning,
}

impl FractionalTsType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => FractionalTsType::None,
            1 => FractionalTsType::SampleCount,
            2 => FractionalTsType::RealTime,
            _ => FractionalTsType::FreeRunning,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            FractionalTsType::None => 0,
            FractionalTsType::SampleCount => 1,
            FractionalTsType::RealTime => 2,
            FractionalTsType::FreeRunning => 3,
        }
    }
}

/// Class ID: OUI (24 bits) plus information-class and packet-class codes
/// (16 bits each), occupying 2 words when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassId {
    pub oui: u32,
    pub info_class: u16,
    pub packet_class: u16,
}

/// Parsed VITA 49.2 packet header, spec.md §4.5 / §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub class_id_present: bool,
    pub integer_ts_type: IntegerTsType,
    pub fractional_ts_type: FractionalTsType,
    /// Bit 26 of word 0. Meaningful only for Signal Data packet types,
    /// where it flags a trailing trailer word after the I/Q payload; for
    /// any other packet type it is reserved and must be zero (spec.md
    /// §4.5's "`[26]=(type-specific, reserved)`").
    pub trailer_present: bool,
    pub packet_count: u8,
    pub packet_size_words: u16,
    pub stream_id: Option<u32>,
    pub class_id: Option<ClassId>,
    pub integer_timestamp: Option<u32>,
    pub fractional_timestamp: Option<u64>,
}

impl PacketHeader {
    /// Fixed prefix length in 32-bit words: 1 (header word) + optional
    /// Stream ID (1) + optional Class ID (2) + optional integer TS (1) +
    /// optional fractional TS (2).
    pub fn size_in_words(&self) -> usize {
        1 + usize::from(self.stream_id.is_some())
            + 2 * usize::from(self.class_id.is_some())
            + usize::from(self.integer_timestamp.is_some())
            + 2 * usize::from(self.fractional_timestamp.is_some())
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_words() * 4
    }

    /// Parse a header from the start of `data`. Returns the header and the
    /// number of bytes consumed. Fails if fewer than 4 bytes are available,
    /// if the packet-size field claims more bytes than `data` holds, or if
    /// reserved bits are non-zero (spec.md §4.5, §7 `ProtocolError`).
    pub fn parse(data: &[u8], order: ByteOrder) -> Result<(PacketHeader, usize)> {
        if data.len() < 4 {
            return Err(WorkbenchError::Protocol(format!(
                "packet header requires at least 4 bytes, got {}",
                data.len()
            )));
        }

        let word0 = byteorder::read_u32(&data[0..4], order);
        let type_nibble = ((word0 >> 28) & 0x0F) as u8;
        let class_id_present = (word0 >> 27) & 0x1 != 0;
        let bit26 = (word0 >> 26) & 0x1 != 0;
        let tsi_bits = ((word0 >> 24) & 0x3) as u8;
        let tsf_bits = ((word0 >> 22) & 0x3) as u8;
        let reserved_21_20 = (word0 >> 20) & 0x3;
        let packet_count = ((word0 >> 16) & 0xF) as u8;
        let packet_size_words = (word0 & 0xFFFF) as u16;

        let packet_type = PacketType::from_nibble(type_nibble);
        let is_signal_data = matches!(
            packet_type,
            PacketType::SignalDataNoStreamId | PacketType::SignalDataWithStreamId
        );

        if reserved_21_20 != 0 || (bit26 && !is_signal_data) {
            return Err(WorkbenchError::Protocol(
                "packet header reserved bits must be zero".into(),
            ));
        }
        let trailer_present = bit26 && is_signal_data;

        let total_bytes = packet_size_words as usize * 4;
        if total_bytes > data.len() {
            return Err(WorkbenchError::Protocol(format!(
                "packet header claims {total_bytes} bytes but only {} are available",
                data.len()
            )));
        }

        let integer_ts_type = IntegerTsType::from_bits(tsi_bits);
        let fractional_ts_type = FractionalTsType::from_bits(tsf_bits);

        let mut offset = 4;

        let stream_id = if packet_type.has_stream_id() {
            require(offset, 4, data.len())?;
            let id = byteorder::read_u32(&data[offset..], order);
            offset += 4;
            Some(id)
        } else {
            None
        };

        let class_id = if class_id_present {
            require(offset, 8, data.len())?;
            let word1 = byteorder::read_u32(&data[offset..], order);
            let word2 = byteorder::read_u32(&data[offset + 4..], order);
            offset += 8;
            Some(ClassId {
                oui: word1 & 0x00FF_FFFF,
                info_class: (word2 >> 16) as u16,
                packet_class: word2 as u16,
            })
        } else {
            None
        };

        let integer_timestamp = if integer_ts_type != IntegerTsType::None {
            require(offset, 4, data.len())?;
            let ts = byteorder::read_u32(&data[offset..], order);
            offset += 4;
            Some(ts)
        } else {
            None
        };

        let fractional_timestamp = if fractional_ts_type != FractionalTsType::None {
            require(offset, 8, data.len())?;
            let ts = byteorder::read_u64_words(&data[offset..], order);
            offset += 8;
            Some(ts)
        } else {
            None
        };

        let header = PacketHeader {
            packet_type,
            class_id_present,
            trailer_present,
            integer_ts_type,
            fractional_ts_type,
            packet_count,
            packet_size_words,
            stream_id,
            class_id,
            integer_timestamp,
            fractional_timestamp,
        };

        Ok((header, offset))
    }

    /// Serialize this header, appending bytes to `out`. The caller must
    /// have set `packet_size_words` beforehand (spec.md §4.5).
    pub fn serialize(&self, order: ByteOrder, out: &mut Vec<u8>) {
        let word0: u32 = ((self.packet_type.to_nibble() as u32) << 28)
            | ((self.class_id_present as u32) << 27)
            | ((self.trailer_present as u32) << 26)
            | ((self.integer_ts_type.to_bits() as u32) << 24)
            | ((self.fractional_ts_type.to_bits() as u32) << 22)
            | ((self.packet_count as u32 & 0xF) << 16)
            | (self.packet_size_words as u32);
        byteorder::write_u32(out, word0, order);

        if let Some(stream_id) = self.stream_id {
            byteorder::write_u32(out, stream_id, order);
        }
        if let Some(class_id) = self.class_id {
            byteorder::write_u32(out, class_id.oui & 0x00FF_FFFF, order);
            let word2 = ((class_id.info_class as u32) << 16) | class_id.packet_class as u32;
            byteorder::write_u32(out, word2, order);
        }
        if let Some(ts) = self.integer_timestamp {
            byteorder::write_u32(out, ts, order);
        }
        if let Some(ts) = self.fractional_timestamp {
            byteorder::write_u64_words(out, ts, order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> PacketHeader {
        PacketHeader {
            packet_type: PacketType::SignalDataWithStreamId,
            class_id_present: false,
            trailer_present: false,
            integer_ts_type: IntegerTsType::None,
            fractional_ts_type: FractionalTsType::None,
            packet_count: 3,
            packet_size_words: 5,
            stream_id: Some(0x1234_5678),
            class_id: None,
            integer_timestamp: None,
            fractional_timestamp: None,
        }
    }

    #[test]
    fn round_trips_minimal_header() {
        let header = sample_header();
        let mut bytes = Vec::new();
        header.serialize(ByteOrder::BigEndian, &mut bytes);
        let (parsed, consumed) = PacketHeader::parse(&bytes, ByteOrder::BigEndian).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, header);
    }

    #[test]
    fn round_trips_full_header_with_all_optional_fields() {
        let header = PacketHeader {
            packet_type: PacketType::Context,
            class_id_present: true,
            trailer_present: false,
            integer_ts_type: IntegerTsType::Utc,
            fractional_ts_type: FractionalTsType::RealTime,
            packet_count: 15,
            packet_size_words: 8,
            stream_id: Some(42),
            class_id: Some(ClassId {
                oui: 0x00ABCDEF,
                info_class: 0x1122,
                packet_class: 0x3344,
            }),
            integer_timestamp: Some(0xCAFEBABE),
            fractional_timestamp: Some(0x0011_2233_4455_6677),
        };
        let mut bytes = Vec::new();
        header.serialize(ByteOrder::LittleEndian, &mut bytes);
        assert_eq!(bytes.len(), header.size_in_bytes());
        let (parsed, consumed) = PacketHeader::parse(&bytes, ByteOrder::LittleEndian).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_buffer_shorter_than_four_bytes() {
        assert!(PacketHeader::parse(&[0, 0, 0], ByteOrder::BigEndian).is_err());
    }

    #[test]
    fn rejects_packet_size_exceeding_available_bytes() {
        let header = sample_header();
        let mut bytes = Vec::new();
        header.serialize(ByteOrder::BigEndian, &mut bytes);
        bytes.truncate(bytes.len() - 1);
        assert!(PacketHeader::parse(&bytes, ByteOrder::BigEndian).is_err());
    }

    #[test]
    fn rejects_bit26_set_on_a_non_signal_data_packet_type() {
        // Bit 26 is the Signal Data trailer flag; for any other packet
        // type it is reserved and must be zero (spec.md §4.5).
        let mut header = sample_header();
        header.packet_type = PacketType::Context;
        let mut bytes = Vec::new();
        header.serialize(ByteOrder::BigEndian, &mut bytes);
        bytes[0] |= 0x04; // bit 26 of word 0
        assert!(PacketHeader::parse(&bytes, ByteOrder::BigEndian).is_err());
    }

    #[test]
    fn rejects_nonzero_bits_21_20() {
        let header = sample_header();
        let mut bytes = Vec::new();
        header.serialize(ByteOrder::BigEndian, &mut bytes);
        bytes[1] |= 0x10; // bit 20 of word 0, second byte in big-endian
        assert!(PacketHeader::parse(&bytes, ByteOrder::BigEndian).is_err());
    }

    #[test]
    fn trailer_flag_round_trips_on_signal_data_packet() {
        let mut header = sample_header();
        header.trailer_present = true;
        let mut bytes = Vec::new();
        header.serialize(ByteOrder::BigEndian, &mut bytes);
        let (parsed, _) = PacketHeader::parse(&bytes, ByteOrder::BigEndian).unwrap();
        assert!(parsed.trailer_present);
    }

    #[test]
    fn size_in_words_accounts_for_every_optional_field() {
        let mut header = sample_header();
        header.class_id_present = true;
        header.class_id = Some(ClassId::default());
        header.integer_ts_type = IntegerTsType::Utc;
        header.integer_timestamp = Some(0);
        header.fractional_ts_type = FractionalTsType::SampleCount;
        header.fractional_timestamp = Some(0);
        assert_eq!(header.size_in_words(), 1 + 1 + 2 + 1 + 2);
    }
}
