//! # memview-viewer
//!
//! 対象プロセスのメモリを「カーソル位置から N バイト」の窓で眺め続けるための viewer。
//!
//! ## 使い方
//!
//! ```text
//! let config = ViewerConfig::from_json(r#"{"cols":16,"readLength":256}"#)?;
//! let mut viewer = NetworkedGrid::networked(oracle, &config)?;
//! viewer.start(now);
//!
//! // ホストのタイマーから
//! viewer.tick(now);
//! for packet in viewer.take_packets() {
//!     channel.send(packet);
//! }
//! ```
//!
//! ログは `tracing` で出す。subscriber の設定はホスト側で行う。

pub mod config;
pub mod networked;
pub mod scheduler;
pub mod viewer;

pub use config::{parse_address, ConfigError, ViewerConfig, ViewerUpdate};
pub use networked::NetworkedGrid;
pub use scheduler::{Scheduler, TimerToken};
pub use viewer::{MemoryViewer, ViewerState, ViewerStats, MAX_REGION_CHAIN};
