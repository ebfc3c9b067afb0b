//! 行グリッド
//!
//! アドレス空間を `min_address` 起点の固定幅の行に区切る。
//!
//! ```text
//! min_address ─┬─ row 0: [min,          min + cols)
//!              ├─ row 1: [min + cols,   min + 2*cols)
//!              └─ ...
//! ```
//!
//! グリッド自体はバイトを持たない。どの行を「知っている」かだけを記録し、
//! 中身は `SegmentCache` から都度切り出す。

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::ops::Range;

use memview_cache::SegmentCache;

/// 1 行分のキャッシュ済みデータ（行頭からのオフセット → バイト列、昇順）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowData<'a> {
    chunks: Vec<(u16, &'a [u8])>,
}

impl<'a> RowData<'a> {
    pub fn chunks(&self) -> &[(u16, &'a [u8])] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 行頭から `offset` のバイト（未知なら `None`）
    ///
    /// 行あたりのチャンク数はほとんどの場合 1 なので線形探索。
    pub fn byte_at(&self, offset: u16) -> Option<u8> {
        self.chunks.iter().find_map(|&(start, bytes)| {
            let rel = offset.checked_sub(start)? as usize;
            bytes.get(rel).copied()
        })
    }

    /// 既知のバイト数
    pub fn known_len(&self) -> usize {
        self.chunks.iter().map(|(_, b)| b.len()).sum()
    }
}

/// 行グリッド
#[derive(Debug, Clone)]
pub struct RowGrid {
    cols: u16,
    min_address: u64,
    max_address: u64,
    /// データが入ったことのある行の先頭アドレス
    rows: BTreeSet<u64>,
}

impl RowGrid {
    /// # 引数
    /// - `cols`: 1 行のバイト数（0 は 1 として扱う。設定の検証で弾く前提）
    /// - `min_address` / `max_address`: グリッドのアドレス範囲 `[min, max)`
    pub fn new(cols: u16, min_address: u64, max_address: u64) -> Self {
        debug_assert!(cols > 0, "row grid needs at least one column");
        RowGrid {
            cols: cols.max(1),
            min_address,
            max_address,
            rows: BTreeSet::new(),
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn min_address(&self) -> u64 {
        self.min_address
    }

    pub fn max_address(&self) -> u64 {
        self.max_address
    }

    /// `address` を含む行の先頭アドレス。`min_address` より前は `min_address` に寄せる
    pub fn row_address(&self, address: u64) -> u64 {
        if address < self.min_address {
            return self.min_address;
        }
        let cols = self.cols as u64;
        self.min_address + (address - self.min_address) / cols * cols
    }

    /// 行の終端（排他的、飽和）
    pub fn row_end(&self, row: u64) -> u64 {
        row.saturating_add(self.cols as u64)
    }

    /// `[start, end)` と重なる行の先頭アドレスを昇順に返す
    pub fn rows_overlapping(&self, span: Range<u64>) -> impl Iterator<Item = u64> {
        let cols = self.cols as u64;
        let (first, last) = if span.start < span.end {
            (Some(self.row_address(span.start)), self.row_address(span.end - 1))
        } else {
            (None, 0)
        };
        core::iter::successors(first, move |&row| row.checked_add(cols).filter(|&next| next <= last))
    }

    /// グリッド全体の行数（端数は切り上げ）
    pub fn total_rows(&self) -> u64 {
        let span = self.max_address.saturating_sub(self.min_address);
        span.div_ceil(self.cols as u64)
    }

    pub fn contains_row(&self, row: u64) -> bool {
        self.rows.contains(&row)
    }

    /// データが入っている行の数
    pub fn cached_row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.iter().copied()
    }

    pub fn insert_row(&mut self, row: u64) -> bool {
        self.rows.insert(row)
    }

    pub fn remove_row(&mut self, row: u64) -> bool {
        self.rows.remove(&row)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// 行のキャッシュ済みデータを行頭基準のチャンクで返す
    ///
    /// # 戻り値
    /// 行が未知、またはキャッシュに 1 バイトも残っていなければ `None`
    pub fn row_data<'c>(&self, cache: &'c SegmentCache, row: u64) -> Option<RowData<'c>> {
        if !self.contains_row(row) {
            return None;
        }
        let chunks: Vec<(u16, &'c [u8])> = cache
            .read(row, self.cols as u64)
            .into_iter()
            .map(|view| ((view.address - row) as u16, view.bytes))
            .collect();
        (!chunks.is_empty()).then_some(RowData { chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use memview_cache::CursorWindow;
    use memview_region::Region;

    #[test]
    fn test_row_address_alignment() {
        let grid = RowGrid::new(16, 0x1004, u64::MAX);
        assert_eq!(grid.row_address(0x1004), 0x1004);
        assert_eq!(grid.row_address(0x1013), 0x1004);
        assert_eq!(grid.row_address(0x1014), 0x1014);
        // min より前は min に寄せる
        assert_eq!(grid.row_address(0x10), 0x1004);
    }

    #[test]
    fn test_rows_overlapping() {
        let grid = RowGrid::new(16, 0, u64::MAX);
        let rows: Vec<u64> = grid.rows_overlapping(0x0F..0x21).collect();
        assert_eq!(rows, vec![0x00, 0x10, 0x20]);

        let rows: Vec<u64> = grid.rows_overlapping(0x10..0x20).collect();
        assert_eq!(rows, vec![0x10]);

        assert_eq!(grid.rows_overlapping(0x10..0x10).count(), 0);
    }

    #[test]
    fn test_rows_overlapping_top_of_address_space() {
        let grid = RowGrid::new(16, 0, u64::MAX);
        let rows: Vec<u64> = grid.rows_overlapping(u64::MAX - 0x18..u64::MAX).collect();
        assert_eq!(rows, vec![u64::MAX - 0x1F, u64::MAX - 0xF]);
    }

    #[test]
    fn test_total_rows() {
        assert_eq!(RowGrid::new(16, 0x1000, 0x1100).total_rows(), 16);
        assert_eq!(RowGrid::new(16, 0x1000, 0x1101).total_rows(), 17);
    }

    #[test]
    fn test_row_data_requires_known_row() {
        let mut cache = SegmentCache::new();
        let region = Region::new(0, 0x10000, 0x04);
        let window = CursorWindow::new(0x100, 0x40);
        let read = cache.prepare(0x104, vec![1, 2, 3, 4], region).unwrap();
        cache.merge(read, &window);
        let read = cache.prepare(0x10C, vec![5, 6], region).unwrap();
        cache.merge(read, &window);

        let mut grid = RowGrid::new(16, 0, u64::MAX);
        assert!(grid.row_data(&cache, 0x100).is_none());

        grid.insert_row(0x100);
        let data = grid.row_data(&cache, 0x100).unwrap();
        assert_eq!(data.chunks(), &[(4u16, &[1u8, 2, 3, 4][..]), (12u16, &[5u8, 6][..])]);
        assert_eq!(data.byte_at(5), Some(2));
        assert_eq!(data.byte_at(8), None);
        assert_eq!(data.byte_at(13), Some(6));
        assert_eq!(data.known_len(), 6);

        // キャッシュに何もない既知の行
        grid.insert_row(0x200);
        assert!(grid.row_data(&cache, 0x200).is_none());
        assert_eq!(grid.cached_row_count(), 2);
    }
}
