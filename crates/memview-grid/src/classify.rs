//! 1 行分の新データを古い内容と比較して変更イベントに分類する
//!
//! ```text
//! old:  [ 10 11 12 13 ] .. .. ..
//! new:        [ 12 99 14 15 16 ]
//!               │  │  └──┴──┴── Extended（古いバイトなし）
//!               │  └─────────── Updated（値が変化）
//!               └────────────── 変化なし（イベントなし）
//! ```
//!
//! 同じ分類が続くバイトは 1 つの run にまとめる。

use crate::change::ChangeSink;
use crate::grid::RowData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteClass {
    Unchanged,
    Updated,
    Extended,
}

/// 新データの 1 行分を分類して sink に流す
///
/// # 引数
/// - `row`: 行の先頭アドレス
/// - `row_offset`: `chunk` の行頭からのオフセット
/// - `chunk`: この行に重なる新データ
/// - `old`: マージ前の行の内容（未知の行なら `None`）
///
/// # 戻り値
/// イベントを 1 つ以上出したら `true`
pub fn classify_row<S: ChangeSink + ?Sized>(
    sink: &mut S,
    row: u64,
    row_offset: u16,
    chunk: &[u8],
    old: Option<&RowData<'_>>,
) -> bool {
    if chunk.is_empty() {
        return false;
    }

    let Some(old) = old.filter(|o| !o.is_empty()) else {
        sink.on_new_row(row, row_offset, chunk);
        return true;
    };

    let mut emitted = false;
    let mut current = ByteClass::Unchanged;
    let mut run_start = 0usize;

    for (i, &new_byte) in chunk.iter().enumerate() {
        let class = match old.byte_at(row_offset + i as u16) {
            None => ByteClass::Extended,
            Some(old_byte) if old_byte != new_byte => ByteClass::Updated,
            Some(_) => ByteClass::Unchanged,
        };
        if class != current {
            emitted |= close_run(sink, row, row_offset, chunk, current, run_start, i);
            current = class;
            run_start = i;
        }
    }
    emitted |= close_run(sink, row, row_offset, chunk, current, run_start, chunk.len());

    emitted
}

fn close_run<S: ChangeSink + ?Sized>(
    sink: &mut S,
    row: u64,
    row_offset: u16,
    chunk: &[u8],
    class: ByteClass,
    start: usize,
    end: usize,
) -> bool {
    if start >= end {
        return false;
    }
    let offset = row_offset + start as u16;
    let data = &chunk[start..end];
    match class {
        ByteClass::Unchanged => return false,
        ByteClass::Updated => sink.on_update_row(row, offset, data),
        ByteClass::Extended => sink.on_extend_row(row, offset, data),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeKind, DiffRun, RunLog};
    use crate::grid::RowGrid;
    use alloc::vec;
    use alloc::vec::Vec;
    use memview_cache::{CursorWindow, SegmentCache};
    use memview_region::Region;

    /// `[row, row+16)` のうち `[row+from, row+from+bytes.len())` がキャッシュ済みの状態
    fn cached_row(row: u64, from: u64, bytes: &[u8]) -> (SegmentCache, RowGrid) {
        let mut cache = SegmentCache::new();
        let read = cache
            .prepare(row + from, bytes.to_vec(), Region::new(0, u64::MAX, 0x04))
            .unwrap();
        cache.merge(read, &CursorWindow::new(row, 16));
        let mut grid = RowGrid::new(16, 0, u64::MAX);
        grid.insert_row(row);
        (cache, grid)
    }

    fn run(kind: ChangeKind, offset: u16, bytes: Vec<u8>) -> DiffRun {
        DiffRun { row_address: 0x1000, kind, offset, bytes }
    }

    #[test]
    fn test_unknown_row_is_new() {
        let mut log = RunLog::new();
        assert!(classify_row(&mut log, 0x1000, 2, &[1, 2, 3], None));
        assert_eq!(log.runs, vec![run(ChangeKind::New, 2, vec![1, 2, 3])]);
    }

    #[test]
    fn test_identical_bytes_emit_nothing() {
        let (cache, grid) = cached_row(0x1000, 0, &[1, 2, 3, 4]);
        let old = grid.row_data(&cache, 0x1000);
        let mut log = RunLog::new();

        assert!(!classify_row(&mut log, 0x1000, 0, &[1, 2, 3, 4], old.as_ref()));
        assert!(log.runs.is_empty());
    }

    #[test]
    fn test_single_byte_update() {
        let (cache, grid) = cached_row(0x1000, 0, &[0; 16]);
        let old = grid.row_data(&cache, 0x1000);
        let mut log = RunLog::new();

        let mut new = [0u8; 16];
        new[4] = 0xAB;
        assert!(classify_row(&mut log, 0x1000, 0, &new, old.as_ref()));
        assert_eq!(log.runs, vec![run(ChangeKind::Updated, 4, vec![0xAB])]);
    }

    #[test]
    fn test_mixed_update_and_extend() {
        // 古いデータは [0..4)
        let (cache, grid) = cached_row(0x1000, 0, &[10, 11, 12, 13]);
        let old = grid.row_data(&cache, 0x1000);
        let mut log = RunLog::new();

        classify_row(&mut log, 0x1000, 2, &[12, 99, 14, 15, 16], old.as_ref());
        assert_eq!(
            log.runs,
            vec![
                run(ChangeKind::Updated, 3, vec![99]),
                run(ChangeKind::Extended, 4, vec![14, 15, 16]),
            ]
        );
    }

    #[test]
    fn test_extend_fills_hole_between_chunks() {
        let (mut cache, grid) = cached_row(0x1000, 0, &[1, 2]);
        let read = cache
            .prepare(0x1006, vec![7, 8], Region::new(0, u64::MAX, 0x04))
            .unwrap();
        cache.merge(read, &CursorWindow::new(0x1000, 16));
        let old = grid.row_data(&cache, 0x1000);
        let mut log = RunLog::new();

        classify_row(&mut log, 0x1000, 0, &[1, 5, 3, 4, 5, 6, 7, 9], old.as_ref());
        assert_eq!(
            log.runs,
            vec![
                run(ChangeKind::Updated, 1, vec![5]),
                run(ChangeKind::Extended, 2, vec![3, 4, 5, 6]),
                run(ChangeKind::Updated, 7, vec![9]),
            ]
        );
    }
}
