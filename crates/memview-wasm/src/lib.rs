//! # memview-wasm
//!
//! wasm-bindgen エクスポート：JS ホストから呼び出す公開 API。
//!
//! ## 構成
//!
//! ```text
//! 対象プロセス側 (Node.js / Electron main)          画面側 (renderer)
//!   MemoryGridProducer                                 MemoryGridClient
//!     ├── JsOracle       ← host の query / read          └── WireDecoder
//!     └── NetworkedGrid  → tick() がパケットを返す ──────→ applyPacket()
//! ```

use wasm_bindgen::prelude::*;

pub mod client;
pub mod oracle;
pub mod producer;
pub mod render;

pub use client::MemoryGridClient;
pub use oracle::JsOracle;
pub use producer::MemoryGridProducer;

/// パニック時にコンソールにスタックトレースを出力する
///
/// 開発時に呼び出す。feature flag で無効化可能。
#[wasm_bindgen]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
