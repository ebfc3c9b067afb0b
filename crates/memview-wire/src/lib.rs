//! # memview-wire
//!
//! 行単位の変更イベントをバイナリパケットにまとめるエンコーダーと、
//! 受信側でパケットを行ストアに再生するデコーダー。
//!
//! ```text
//! 送信側:
//!   ReactiveGrid → WireEncoder (ChangeSink) → take_packets() → ホストの転送路
//!
//! 受信側:
//!   転送路 → WireDecoder::apply_packet() → 行ストア (+ 任意の ChangeSink)
//! ```
//!
//! 転送路は信頼性があり順序を保つことを前提にする（パケットに番号や
//! チェックサムはない）。

#![no_std]
extern crate alloc;

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;

pub use decoder::{DecoderStats, RowChunks, WireDecoder};
pub use encoder::{EncoderStats, WireEncoder};
pub use error::WireError;
pub use format::{parse_packet, FieldWidth, Record};
