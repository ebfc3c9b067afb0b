//! リージョン問い合わせ / 読み出しのエラー型

use alloc::string::String;
use thiserror::Error;

/// `RegionOracle` の操作で発生するエラー
///
/// いずれも致命的ではない。viewer はログに記録してその部分読み出しだけを捨てる。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// アドレスが対象プロセスのアドレス空間で無効
    #[error("invalid address {0:#x}")]
    InvalidAddress(u64),
    /// 読み出し長が不正（0 またはリージョン外へはみ出す）
    #[error("invalid read length {length} at {address:#x}")]
    InvalidLength { address: u64, length: u32 },
    /// リージョンがアクセスを拒否した
    #[error("access denied at {0:#x}")]
    AccessDenied(u64),
    /// プロセスハンドルが閉じられている / 参照が無効
    #[error("process handle is closed")]
    HandleClosed,
    /// ホスト側（JS など）から返された任意のエラー
    #[error("host error: {0}")]
    Host(String),
}
