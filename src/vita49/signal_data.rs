//! VITA 49.2 Signal Data (IF Data) packet: 16-bit I/Q pairs packed one per
//! 32-bit payload word, with a configurable float<->int16 scale factor.
//!
//! Grounded in `original_source/src/libs/Vita49_2/SignalDataPacket.h`:
//! `decode`'s `std::optional<DecodeResult>` + `size_t&` out-parameter
//! becomes `Option<(PacketHeader, IqSamples, usize)>` (spec.md §7 — the
//! idiomatic Rust equivalent the SPEC_FULL.md error-handling section
//! calls for); `encode`'s "empty vector on overflow" is carried unchanged.

use super::byteorder::ByteOrder;
use super::header::{FractionalTsType, IntegerTsType, PacketHeader, PacketType};
use super::IqSamples;
use crate::error::{Result, WorkbenchError};

/// Default float<->int16 scale factor (spec.md §4.6).
pub const DEFAULT_SCALE_FACTOR: f32 = 32768.0;

/// Largest packet size VITA 49.2's 16-bit packet-size field can express,
/// in 32-bit words.
const MAX_PACKET_WORDS: usize = 0xFFFF;

/// Number of prefix words (header + Stream ID + optional timestamps) for
/// a Signal Data packet with the given timestamp configuration. Class ID
/// is never set on Signal Data packets emitted by this codec.
fn prefix_words(tsi: IntegerTsType, tsf: FractionalTsType) -> usize {
    1 + 1 // header word + Stream ID (always present: SignalDataWithStreamId)
        + usize::from(tsi != IntegerTsType::None)
        + 2 * usize::from(tsf != FractionalTsType::None)
}

/// Maximum number of I/Q sample pairs that fit in a single Signal Data
/// packet for the given timestamp/class-ID/trailer configuration
/// (spec.md §4.6).
pub fn max_samples_per_packet(
    tsi: IntegerTsType,
    tsf: FractionalTsType,
    class_id_present: bool,
    include_trailer: bool,
) -> usize {
    let class_words = if class_id_present { 2 } else { 0 };
    let prefix = prefix_words(tsi, tsf) + class_words;
    let trailer = usize::from(include_trailer);
    MAX_PACKET_WORDS.saturating_sub(prefix + trailer)
}

fn clamp_to_i16(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Encode a single Signal Data packet. Returns an empty vector if
/// `samples` exceeds [`max_samples_per_packet`] for this configuration
/// (spec.md §4.6).
#[allow(clippy::too_many_arguments)]
pub fn encode(
    stream_id: u32,
    samples: &[(f32, f32)],
    packet_count: u8,
    order: ByteOrder,
    scale_factor: f32,
    tsi: IntegerTsType,
    tsf: FractionalTsType,
    integer_timestamp: u32,
    fractional_timestamp: u64,
    include_trailer: bool,
) -> Vec<u8> {
    let max_samples = max_samples_per_packet(tsi, tsf, false, include_trailer);
    if samples.len() > max_samples {
        return Vec::new();
    }

    let prefix = prefix_words(tsi, tsf);
    let packet_size_words = (prefix + samples.len() + usize::from(include_trailer)) as u16;

    let header = PacketHeader {
        packet_type: PacketType::SignalDataWithStreamId,
        class_id_present: false,
        trailer_present: include_trailer,
        integer_ts_type: tsi,
        fractional_ts_type: tsf,
        packet_count: packet_count & 0x0F,
        packet_size_words,
        stream_id: Some(stream_id),
        class_id: None,
        integer_timestamp: (tsi != IntegerTsType::None).then_some(integer_timestamp),
        fractional_timestamp: (tsf != FractionalTsType::None).then_some(fractional_timestamp),
    };

    let mut out = Vec::with_capacity(packet_size_words as usize * 4);
    header.serialize(order, &mut out);

    for &(i, q) in samples {
        let i16_val = clamp_to_i16(i * scale_factor) as u16;
        let q16_val = clamp_to_i16(q * scale_factor) as u16;
        let word = ((i16_val as u32) << 16) | q16_val as u32;
        super::byteorder::write_u32(&mut out, word, order);
    }

    if include_trailer {
        super::byteorder::write_u32(&mut out, 0, order);
    }

    out
}

/// Decode a single Signal Data packet from the start of `data`. Returns
/// the parsed header, decoded samples, and bytes consumed, or an error on
/// malformed input (spec.md §4.6, §7).
pub fn decode(data: &[u8], order: ByteOrder, scale_factor: f32) -> Result<(PacketHeader, IqSamples, usize)> {
    let (header, header_bytes) = PacketHeader::parse(data, order)?;

    let total_words = header.packet_size_words as usize;
    let prefix = header.size_in_words();
    if total_words < prefix {
        return Err(WorkbenchError::Protocol(
            "signal data packet size smaller than header prefix".into(),
        ));
    }
    let payload_words = total_words - prefix;
    let sample_words = if header.trailer_present {
        if payload_words == 0 {
            return Err(WorkbenchError::Protocol(
                "signal data packet flags a trailer but has no payload words".into(),
            ));
        }
        payload_words - 1
    } else {
        payload_words
    };

    let mut samples = Vec::with_capacity(sample_words);
    let mut offset = header_bytes;
    for _ in 0..sample_words {
        let word = super::byteorder::read_u32(&data[offset..offset + 4], order);
        let i_raw = (word >> 16) as u16 as i16;
        let q_raw = word as u16 as i16;
        samples.push((i_raw as f32 / scale_factor, q_raw as f32 / scale_factor));
        offset += 4;
    }
    if header.trailer_present {
        offset += 4;
    }

    Ok((header, samples, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scenario_3_from_spec() {
        // spec.md §8 scenario 3: 3 samples, scale 32768, little-endian,
        // stream ID 0x12345678, no timestamps/trailer -> 5 words, first
        // payload word little-endian bytes `00 00 FF 7F`.
        let samples: IqSamples = vec![(1.0, 0.0), (-1.0, 0.5), (0.0, -1.0)];
        let bytes = encode(
            0x1234_5678,
            &samples,
            0,
            ByteOrder::LittleEndian,
            DEFAULT_SCALE_FACTOR,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
            false,
        );
        assert_eq!(bytes.len(), 5 * 4);
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0xFF, 0x7F]);
    }

    #[test]
    fn round_trips_within_one_lsb_for_unit_amplitude() {
        let samples: IqSamples = vec![(1.0, -1.0), (0.5, -0.5), (0.0, 0.0), (0.999, -0.999)];
        let bytes = encode(
            7,
            &samples,
            0,
            ByteOrder::BigEndian,
            DEFAULT_SCALE_FACTOR,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
            false,
        );
        let (_, decoded, consumed) = decode(&bytes, ByteOrder::BigEndian, DEFAULT_SCALE_FACTOR).unwrap();
        assert_eq!(consumed, bytes.len());
        for ((orig_i, orig_q), (dec_i, dec_q)) in samples.iter().zip(decoded.iter()) {
            assert!((orig_i - dec_i).abs() <= 1.0 / DEFAULT_SCALE_FACTOR + 1e-6);
            assert!((orig_q - dec_q).abs() <= 1.0 / DEFAULT_SCALE_FACTOR + 1e-6);
        }
    }

    #[test]
    fn encode_returns_empty_when_samples_exceed_max() {
        let max = max_samples_per_packet(IntegerTsType::None, FractionalTsType::None, false, false);
        let samples: IqSamples = vec![(0.0, 0.0); max + 1];
        let bytes = encode(
            1,
            &samples,
            0,
            ByteOrder::BigEndian,
            DEFAULT_SCALE_FACTOR,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
            false,
        );
        assert!(bytes.is_empty());
    }

    #[test]
    fn round_trips_with_trailer_and_timestamps() {
        let samples: IqSamples = vec![(0.25, -0.25), (0.1, 0.2)];
        let bytes = encode(
            99,
            &samples,
            5,
            ByteOrder::BigEndian,
            DEFAULT_SCALE_FACTOR,
            IntegerTsType::Utc,
            FractionalTsType::RealTime,
            123456,
            789012,
            true,
        );
        let (header, decoded, consumed) = decode(&bytes, ByteOrder::BigEndian, DEFAULT_SCALE_FACTOR).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.len(), 2);
        assert_eq!(header.packet_count, 5);
        assert_eq!(header.integer_timestamp, Some(123456));
        assert_eq!(header.fractional_timestamp, Some(789012));
        assert!(header.trailer_present);
    }

    #[test]
    fn clamps_out_of_range_floats_to_i16_bounds() {
        let samples: IqSamples = vec![(2.0, -2.0)];
        let bytes = encode(
            1,
            &samples,
            0,
            ByteOrder::BigEndian,
            DEFAULT_SCALE_FACTOR,
            IntegerTsType::None,
            FractionalTsType::None,
            0,
            0,
            false,
        );
        let (_, decoded, _) = decode(&bytes, ByteOrder::BigEndian, DEFAULT_SCALE_FACTOR).unwrap();
        assert!((decoded[0].0 - (i16::MAX as f32 / DEFAULT_SCALE_FACTOR)).abs() < 1e-6);
        assert!((decoded[0].1 - (i16::MIN as f32 / DEFAULT_SCALE_FACTOR)).abs() < 1e-6);
    }
}
