//! memview-wire エラー型

use thiserror::Error;

/// パケットの解析エラー
///
/// 1 レコードでも不正ならパケット全体を捨てる（部分適用はしない）。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// レコードヘッダーの途中でパケットが終わった
    #[error("truncated record header at byte {at}: need {need} bytes, {have} left")]
    TruncatedHeader { at: usize, need: usize, have: usize },
    /// ペイロードの途中でパケットが終わった
    #[error("truncated payload at byte {at}: need {need} bytes, {have} left")]
    TruncatedPayload { at: usize, need: usize, have: usize },
    /// オフセットが行幅を超えている（`offset == cols` は削除レコード）
    #[error("offset {offset} is beyond a {cols}-column row at {address:#x}")]
    OffsetOutOfRow { address: u64, offset: u16, cols: u16 },
    /// run が行末をはみ出す
    #[error("run {offset}+{length} overflows a {cols}-column row at {address:#x}")]
    RunOverflow { address: u64, offset: u16, length: u16, cols: u16 },
    /// 削除レコードなのに長さが 0 でない
    #[error("removal record for row {address:#x} carries length {length}")]
    MalformedRemoval { address: u64, length: u16 },
}
