//! # memview-region
//!
//! 対象プロセスのアドレス空間を「リージョン」単位で扱うための型と、
//! ホストが実装する `RegionOracle` 境界。
//!
//! ## 保護属性
//!
//! ```text
//! Region { base, size, protection }
//!   protection: プラットフォーム依存のビットマスク
//!   解釈は ProtectionTable（既定: Windows PAGE_*）を介して行う
//!
//!   can_read / can_write / can_execute / can_copy
//!   is_guarded / is_no_access / can_access
//! ```
//!
//! `no_std` + `alloc` 環境（WASM を含む）で動作する。

#![no_std]
extern crate alloc;

mod error;
mod protection;
mod region;
mod space;

pub use error::OracleError;
pub use protection::{Access, ProtectionTable};
pub use region::{Region, RegionOracle};
pub use space::MappedSpace;

/// 64 bit プラットフォームの最大アドレス（排他的上限として使う）
pub const PLATFORM_MAX_ADDRESS: u64 = u64::MAX;
