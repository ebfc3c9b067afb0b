//! カーソルウィンドウ

use core::ops::Range;

use memview_region::PLATFORM_MAX_ADDRESS;

/// 既定のキャッシュ保持距離（バイト）
pub const DEFAULT_CACHE_DISTANCE: u32 = 4096;

/// 現在の表示範囲とキャッシュ保持範囲
///
/// ```text
///   min_address                                                  max_address
///   │        cursor - D    cursor        cursor + L    cursor + L + D     │
///   │            ├──────────┼─────────────┼──────────────┤               │
///   │            │  保持    │  読み出し   │     保持     │               │
/// ```
///
/// 読み出しと追い出しはすべて `[min_address, max_address)` にクリップされる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorWindow {
    pub cursor: u64,
    pub read_length: u32,
    pub cache_distance: u32,
    pub min_address: u64,
    pub max_address: u64,
}

impl CursorWindow {
    pub fn new(cursor: u64, read_length: u32) -> Self {
        CursorWindow {
            cursor,
            read_length,
            cache_distance: DEFAULT_CACHE_DISTANCE,
            min_address: 0,
            max_address: PLATFORM_MAX_ADDRESS,
        }
    }

    pub fn with_cache_distance(mut self, distance: u32) -> Self {
        self.cache_distance = distance;
        self
    }

    pub fn with_bounds(mut self, min_address: u64, max_address: u64) -> Self {
        self.min_address = min_address;
        self.max_address = max_address;
        self
    }

    /// キャッシュに残す範囲 `[cursor - D, cursor + L + D)`（境界でクリップ）
    pub fn keep_range(&self) -> Range<u64> {
        let distance = self.cache_distance as u64;
        let start = self.cursor.saturating_sub(distance).max(self.min_address);
        let end = self
            .cursor
            .saturating_add(self.read_length as u64)
            .saturating_add(distance)
            .min(self.max_address);
        start..end
    }

    /// 読み出し要求 `[cursor, cursor + L)` を境界でクリップしたもの。何も残らなければ `None`
    pub fn request_range(&self) -> Option<Range<u64>> {
        let start = self.cursor.max(self.min_address);
        let end = self
            .cursor
            .saturating_add(self.read_length as u64)
            .min(self.max_address);
        (start < end).then_some(start..end)
    }
}

impl Default for CursorWindow {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
