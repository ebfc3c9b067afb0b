//! # memview-cache
//!
//! 対象プロセスのメモリを疎にキャッシュする `SegmentCache`。
//!
//! ## データの流れ
//!
//! ```text
//! 生読み出し (address, bytes, region)
//!   └─ SegmentCache::prepare → ReadResult（マージ計画、キャッシュは未変更）
//!        └─ CacheHook::on_read（diff 層はここで古い内容と比較）
//!             └─ SegmentCache::merge → 端の掃除（evict_outside_window）
//! ```
//!
//! ## 追い出し
//!
//! カーソル `C`、読み出し長 `L`、保持距離 `D` に対し `[C - D, C + L + D)` の外側は
//! 削除、境界をまたぐセグメントは内側だけ残す。
//!
//! `no_std` + `alloc` 環境（WASM を含む）で動作する。

#![no_std]
extern crate alloc;

pub mod cache;
pub mod hook;
pub mod segment;
pub mod window;

pub use cache::SegmentCache;
pub use hook::{CacheHook, MergeOnly};
pub use segment::{ReadResult, SegmentView, ValidRange};
pub use window::{CursorWindow, DEFAULT_CACHE_DISTANCE};
