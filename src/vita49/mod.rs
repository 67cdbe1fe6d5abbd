//! VITA 49.2 signal-data and context packet codec.
//!
//! Grounded in `original_source/src/libs/Vita49_2/`: pure functions over
//! byte buffers with no shared mutable state, safe to call from many
//! threads concurrently on disjoint buffers (spec.md §5). Each source file
//! there (`ByteSwap.h`, `PacketHeader.{h,cpp}`, `SignalDataPacket.{h,cpp}`,
//! `ContextPacket.{h,cpp}`, `Vita49Codec.{h,cpp}`) maps one-for-one to a
//! module here.

pub mod byteorder;
pub mod context;
pub mod fixed_point;
pub mod header;
pub mod signal_data;
pub mod stream;

pub use byteorder::ByteOrder;
pub use context::ContextFields;
pub use header::{ClassId, FractionalTsType, IntegerTsType, PacketHeader, PacketType};
pub use signal_data::DEFAULT_SCALE_FACTOR;
pub use stream::{ParsedPacket, Vita49Codec};

/// Ordered I/Q sample pairs exchanged with the signal-data packet codec.
pub type IqSamples = Vec<(f32, f32)>;

/// Largest packet size VITA 49.2 permits: the 16-bit packet-size field
/// counts 32-bit words, so the ceiling is `0xFFFF` words (spec.md §6).
pub const MAX_PACKET_WORDS: usize = 0xFFFF;
