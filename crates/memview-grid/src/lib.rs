//! # memview-grid
//!
//! `SegmentCache` の上に固定幅の行グリッドを載せ、読み出しごとの差分を
//! 行単位のイベント（New / Updated / Extended / Removed）に分類する。
//!
//! ## 構成
//!
//! ```text
//! ReactiveGrid<S: ChangeSink>   ← CacheHook として viewer に渡す
//!   ├─ RowGrid                   行アドレス計算と既知の行の集合
//!   ├─ classify_row              古い行内容とのバイト単位比較
//!   └─ S                         イベントの受け手（WireEncoder, RunLog など）
//! ```

#![no_std]
extern crate alloc;

pub mod change;
pub mod classify;
pub mod grid;
pub mod reactive;

pub use change::{ChangeKind, ChangeSink, DiffRun, RunLog};
pub use classify::classify_row;
pub use grid::{RowData, RowGrid};
pub use reactive::ReactiveGrid;
