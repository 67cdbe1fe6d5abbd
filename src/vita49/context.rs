//! VITA 49.2 IF Context packet: a CIF0-indexed ordered set of metadata
//! fields (bandwidth, reference frequencies, gain, sample rate, etc).
//!
//! Grounded in `original_source/src/libs/Vita49_2/ContextPacket.h`'s field
//! table (bits 31-21) and doc comment ("Fields at bits 20-8 are skipped
//! during decode if present"). spec.md §9(b) resolves the skip policy
//! explicitly: known-width CIF0 bits 20..8 are skipped via
//! [`KNOWN_CIF_WIDTHS`]; any bit with no known width, or any bit 20..8 at
//! all when `strict` is requested, is a [`WorkbenchError::Protocol`].

use super::byteorder::{self, ByteOrder};
use super::fixed_point;
use super::header::{FractionalTsType, IntegerTsType, PacketHeader, PacketType};
use crate::error::{Result, WorkbenchError};

/// CIF0 bit positions this crate encodes and decodes (spec.md §4.7 table).
mod bit {
    pub const CHANGE_INDICATOR: u32 = 31;
    pub const REFERENCE_POINT_ID: u32 = 30;
    pub const BANDWIDTH: u32 = 29;
    pub const IF_REFERENCE_FREQUENCY: u32 = 28;
    pub const RF_REFERENCE_FREQUENCY: u32 = 27;
    pub const RF_FREQUENCY_OFFSET: u32 = 26;
    pub const IF_BAND_OFFSET: u32 = 25;
    pub const REFERENCE_LEVEL: u32 = 24;
    pub const GAIN: u32 = 23;
    pub const OVER_RANGE_COUNT: u32 = 22;
    pub const SAMPLE_RATE: u32 = 21;
}

/// Word count for each CIF0 bit 20 down to 8 that this decoder knows how
/// to skip without interpreting its payload (spec.md §9(b) open
/// question). `None` means the field has no fixed width (VITA 49.2's GPS
/// ASCII and Context Association Lists fields are self-describing and
/// variable-length) and cannot be safely skipped generically.
const KNOWN_CIF_WIDTHS: [(u32, Option<usize>); 13] = [
    (20, Some(1)),  // Temperature
    (19, Some(2)),  // Device Identifier
    (18, Some(1)),  // State/Event Indicators
    (17, Some(2)),  // Data Payload Format
    (16, Some(11)), // Formatted GPS
    (15, Some(11)), // Formatted INS
    (14, Some(11)), // ECEF Ephemeris
    (13, Some(11)), // Relative Ephemeris
    (12, Some(1)),  // Ephemeris Reference ID
    (11, None),     // GPS ASCII (variable-length)
    (10, None),     // Context Association Lists (variable-length)
    (9, None),      // reserved
    (8, None),      // reserved
];

/// Optional VITA 49.2 context metadata fields (spec.md §3 `ContextFields`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContextFields {
    pub change_indicator: bool,
    pub reference_point_id: Option<u32>,
    pub bandwidth_hz: Option<f64>,
    pub if_reference_frequency_hz: Option<f64>,
    pub rf_reference_frequency_hz: Option<f64>,
    pub rf_frequency_offset_hz: Option<f64>,
    pub if_band_offset_hz: Option<f64>,
    pub reference_level_dbm: Option<f64>,
    pub gain_db: Option<f64>,
    pub over_range_count: Option<u32>,
    pub sample_rate_hz: Option<f64>,
}

fn prefix_words() -> usize {
    1 + 1 // header word + Stream ID (context packets always carry one)
}

/// Encode a single Context packet. Fields are written in strict CIF0 bit
/// order (31 -> 21); the CIF0 word and `packet_size_words` are patched in
/// after the field payloads are known (spec.md §4.7 "Encoding").
#[allow(clippy::too_many_arguments)]
pub fn encode(
    stream_id: u32,
    fields: &ContextFields,
    packet_count: u8,
    order: ByteOrder,
    tsi: IntegerTsType,
    tsf: FractionalTsType,
    integer_timestamp: u32,
    fractional_timestamp: u64,
) -> Vec<u8> {
    let mut cif0: u32 = 0;
    let mut payload = Vec::new();

    if fields.change_indicator {
        cif0 |= 1 << bit::CHANGE_INDICATOR;
    }
    if let Some(id) = fields.reference_point_id {
        cif0 |= 1 << bit::REFERENCE_POINT_ID;
        byteorder::write_u32(&mut payload, id, order);
    }
    if let Some(hz) = fields.bandwidth_hz {
        cif0 |= 1 << bit::BANDWIDTH;
        byteorder::write_u64_words(&mut payload, fixed_point::encode_q44_20(hz), order);
    }
    if let Some(hz) = fields.if_reference_frequency_hz {
        cif0 |= 1 << bit::IF_REFERENCE_FREQUENCY;
        byteorder::write_u64_words(&mut payload, fixed_point::encode_q44_20(hz), order);
    }
    if let Some(hz) = fields.rf_reference_frequency_hz {
        cif0 |= 1 << bit::RF_REFERENCE_FREQUENCY;
        byteorder::write_u64_words(&mut payload, fixed_point::encode_q44_20(hz), order);
    }
    if let Some(hz) = fields.rf_frequency_offset_hz {
        cif0 |= 1 << bit::RF_FREQUENCY_OFFSET;
        byteorder::write_u64_words(&mut payload, fixed_point::encode_q44_20(hz), order);
    }
    if let Some(hz) = fields.if_band_offset_hz {
        cif0 |= 1 << bit::IF_BAND_OFFSET;
        byteorder::write_u64_words(&mut payload, fixed_point::encode_q44_20(hz), order);
    }
    if let Some(dbm) = fields.reference_level_dbm {
        cif0 |= 1 << bit::REFERENCE_LEVEL;
        byteorder::write_u32(&mut payload, fixed_point::encode_q9_7(dbm) as u32, order);
    }
    if let Some(db) = fields.gain_db {
        cif0 |= 1 << bit::GAIN;
        byteorder::write_u32(&mut payload, fixed_point::encode_q9_7(db) as u32, order);
    }
    if let Some(count) = fields.over_range_count {
        cif0 |= 1 << bit::OVER_RANGE_COUNT;
        byteorder::write_u32(&mut payload, count, order);
    }
    if let Some(hz) = fields.sample_rate_hz {
        cif0 |= 1 << bit::SAMPLE_RATE;
        byteorder::write_u64_words(&mut payload, fixed_point::encode_q44_20(hz), order);
    }

    let payload_words = 1 + payload.len() / 4; // CIF0 word + field payload
    let header = PacketHeader {
        packet_type: PacketType::Context,
        class_id_present: false,
        trailer_present: false,
        integer_ts_type: tsi,
        fractional_ts_type: tsf,
        packet_count: packet_count & 0x0F,
        packet_size_words: (prefix_words() + payload_words) as u16,
        stream_id: Some(stream_id),
        class_id: None,
        integer_timestamp: (tsi != IntegerTsType::None).then_some(integer_timestamp),
        fractional_timestamp: (tsf != FractionalTsType::None).then_some(fractional_timestamp),
    };

    let mut out = Vec::with_capacity(header.size_in_bytes() + payload.len());
    header.serialize(order, &mut out);
    byteorder::write_u32(&mut out, cif0, order);
    out.extend_from_slice(&payload);
    out
}

/// Decode a single Context packet. When `strict` is true, any CIF0 bit in
/// 20..=8 being set is a parse error even if its width is known; when
/// false, known-width fields are silently skipped (spec.md §9(b)).
pub fn decode(
    data: &[u8],
    order: ByteOrder,
    strict: bool,
) -> Result<(PacketHeader, ContextFields, usize)> {
    let (header, header_bytes) = PacketHeader::parse(data, order)?;
    if !matches!(header.packet_type, PacketType::Context | PacketType::ExtensionContext) {
        return Err(WorkbenchError::Protocol(
            "not a context packet".into(),
        ));
    }

    let total_bytes = header.packet_size_words as usize * 4;
    if header_bytes + 4 > total_bytes {
        return Err(WorkbenchError::Protocol(
            "context packet too short to hold a CIF0 word".into(),
        ));
    }

    let mut offset = header_bytes;
    let cif0 = byteorder::read_u32(&data[offset..], order);
    offset += 4;

    if cif0 & 0xFF != 0 {
        return Err(WorkbenchError::Protocol(
            "context packet CIF0 reserved bits 7..0 must be zero".into(),
        ));
    }

    let mut fields = ContextFields::default();

    macro_rules! read_word {
        () => {{
            if offset + 4 > total_bytes {
                return Err(WorkbenchError::Protocol(
                    "context packet truncated before a CIF0 field payload".into(),
                ));
            }
            let w = byteorder::read_u32(&data[offset..], order);
            offset += 4;
            w
        }};
    }
    macro_rules! read_words64 {
        () => {{
            if offset + 8 > total_bytes {
                return Err(WorkbenchError::Protocol(
                    "context packet truncated before a CIF0 field payload".into(),
                ));
            }
            let v = byteorder::read_u64_words(&data[offset..], order);
            offset += 8;
            v
        }};
    }

    if cif0 & (1 << bit::CHANGE_INDICATOR) != 0 {
        fields.change_indicator = true;
    }
    if cif0 & (1 << bit::REFERENCE_POINT_ID) != 0 {
        fields.reference_point_id = Some(read_word!());
    }
    if cif0 & (1 << bit::BANDWIDTH) != 0 {
        fields.bandwidth_hz = Some(fixed_point::decode_q44_20(read_words64!()));
    }
    if cif0 & (1 << bit::IF_REFERENCE_FREQUENCY) != 0 {
        fields.if_reference_frequency_hz = Some(fixed_point::decode_q44_20(read_words64!()));
    }
    if cif0 & (1 << bit::RF_REFERENCE_FREQUENCY) != 0 {
        fields.rf_reference_frequency_hz = Some(fixed_point::decode_q44_20(read_words64!()));
    }
    if cif0 & (1 << bit::RF_FREQUENCY_OFFSET) != 0 {
        fields.rf_frequency_offset_hz = Some(fixed_point::decode_q44_20(read_words64!()));
    }
    if cif0 & (1 << bit::IF_BAND_OFFSET) != 0 {
        fields.if_band_offset_hz = Some(fixed_point::decode_q44_20(read_words64!()));
    }
    if cif0 & (1 << bit::REFERENCE_LEVEL) != 0 {
        fields.reference_level_dbm = Some(fixed_point::decode_q9_7(read_word!() as u16));
    }
    if cif0 & (1 << bit::GAIN) != 0 {
        fields.gain_db = Some(fixed_point::decode_q9_7(read_word!() as u16));
    }
    if cif0 & (1 << bit::OVER_RANGE_COUNT) != 0 {
        fields.over_range_count = Some(read_word!());
    }
    if cif0 & (1 << bit::SAMPLE_RATE) != 0 {
        fields.sample_rate_hz = Some(fixed_point::decode_q44_20(read_words64!()));
    }

    for (field_bit, width) in KNOWN_CIF_WIDTHS {
        if cif0 & (1 << field_bit) == 0 {
            continue;
        }
        if strict {
            return Err(WorkbenchError::Protocol(format!(
                "context packet sets CIF0 bit {field_bit} and strict decoding is requested"
            )));
        }
        match width {
            Some(words) => {
                let bytes_needed = words * 4;
                if offset + bytes_needed > total_bytes {
                    return Err(WorkbenchError::Protocol(format!(
                        "context packet truncated while skipping CIF0 bit {field_bit}"
                    )));
                }
                offset += bytes_needed;
            }
            None => {
                return Err(WorkbenchError::Protocol(format!(
                    "context packet sets CIF0 bit {field_bit} with no known fixed width"
                )));
            }
        }
    }

    Ok((header, fields, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scenario_4_from_spec() {
        // spec.md §8 scenario 4: bandwidth + sample rate only ->
        // CIF0 = 0x20200000, total words = 7.
        let fields = ContextFields {
            bandwidth_hz: Some(200_000.0),
            sample_rate_hz: Some(2_048_000.0),
            ..Default::default()
        };
        let bytes = encode(
            1,
            &fields,
            0,
            ByteOrder::BigEndian,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
        );
        assert_eq!(bytes.len(), 7 * 4);
        let cif0 = byteorder::read_u32(&bytes[8..12], ByteOrder::BigEndian);
        assert_eq!(cif0, 0x2020_0000);
    }

    #[test]
    fn round_trips_all_supported_fields() {
        let fields = ContextFields {
            change_indicator: true,
            reference_point_id: Some(42),
            bandwidth_hz: Some(200_000.0),
            if_reference_frequency_hz: Some(70_000_000.0),
            rf_reference_frequency_hz: Some(100_000_000.0),
            rf_frequency_offset_hz: Some(-1_500.0),
            if_band_offset_hz: Some(0.0),
            reference_level_dbm: Some(-110.0),
            gain_db: Some(20.5),
            over_range_count: Some(3),
            sample_rate_hz: Some(2_048_000.0),
        };
        let bytes = encode(
            5,
            &fields,
            1,
            ByteOrder::LittleEndian,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
        );
        let (header, decoded, consumed) = decode(&bytes, ByteOrder::LittleEndian, false).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(header.stream_id, Some(5));
        assert_eq!(decoded.change_indicator, true);
        assert_eq!(decoded.reference_point_id, Some(42));
        assert!((decoded.bandwidth_hz.unwrap() - 200_000.0).abs() < 1e-3);
        assert!((decoded.gain_db.unwrap() - 20.5).abs() < 1.0 / 128.0);
        assert_eq!(decoded.over_range_count, Some(3));
    }

    #[test]
    fn decode_rejects_reserved_bits_7_to_0() {
        let fields = ContextFields {
            bandwidth_hz: Some(1.0),
            ..Default::default()
        };
        let mut bytes = encode(
            1,
            &fields,
            0,
            ByteOrder::BigEndian,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
        );
        let cif0_offset = 8;
        bytes[cif0_offset + 3] |= 0x01;
        // packet_size_words unaffected, but CIF0 now carries a reserved bit.
        assert!(decode(&bytes, ByteOrder::BigEndian, false).is_err());
    }

    #[test]
    fn decode_skips_known_width_unsupported_bit_in_non_strict_mode() {
        let fields = ContextFields {
            bandwidth_hz: Some(1.0),
            ..Default::default()
        };
        let mut bytes = encode(
            1,
            &fields,
            0,
            ByteOrder::BigEndian,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
        );
        // Set bit 18 (State/Event Indicators, 1 known word) and append a word.
        let cif0_offset = 8;
        let mut cif0 = byteorder::read_u32(&bytes[cif0_offset..], ByteOrder::BigEndian);
        cif0 |= 1 << 18;
        bytes[cif0_offset..cif0_offset + 4].copy_from_slice(&cif0.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let size_words = (bytes.len() / 4) as u16;
        bytes[2] = (size_words >> 8) as u8;
        bytes[3] = size_words as u8;

        let (_, decoded, consumed) = decode(&bytes, ByteOrder::BigEndian, false).unwrap();
        assert_eq!(consumed, bytes.len());
        assert!((decoded.bandwidth_hz.unwrap() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn decode_errors_on_known_width_bit_in_strict_mode() {
        let fields = ContextFields {
            bandwidth_hz: Some(1.0),
            ..Default::default()
        };
        let mut bytes = encode(
            1,
            &fields,
            0,
            ByteOrder::BigEndian,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
        );
        let cif0_offset = 8;
        let mut cif0 = byteorder::read_u32(&bytes[cif0_offset..], ByteOrder::BigEndian);
        cif0 |= 1 << 18;
        bytes[cif0_offset..cif0_offset + 4].copy_from_slice(&cif0.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let size_words = (bytes.len() / 4) as u16;
        bytes[2] = (size_words >> 8) as u8;
        bytes[3] = size_words as u8;

        assert!(decode(&bytes, ByteOrder::BigEndian, true).is_err());
    }

    #[test]
    fn decode_errors_on_variable_width_unknown_bit_even_non_strict() {
        let fields = ContextFields {
            bandwidth_hz: Some(1.0),
            ..Default::default()
        };
        let mut bytes = encode(
            1,
            &fields,
            0,
            ByteOrder::BigEndian,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
        );
        let cif0_offset = 8;
        let mut cif0 = byteorder::read_u32(&bytes[cif0_offset..], ByteOrder::BigEndian);
        cif0 |= 1 << 11; // GPS ASCII, variable-length, no known width
        bytes[cif0_offset..cif0_offset + 4].copy_from_slice(&cif0.to_be_bytes());

        assert!(decode(&bytes, ByteOrder::BigEndian, false).is_err());
    }
}
