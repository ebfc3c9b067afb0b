//! 読み出し結果を行単位の変更イベントに変換するキャッシュフック

use core::ops::Range;

use memview_cache::{CacheHook, CursorWindow, ReadResult, SegmentCache};
use tracing::trace;

use crate::change::ChangeSink;
use crate::classify::classify_row;
use crate::grid::RowGrid;

/// 変更検出付きのグリッド
///
/// ## 1 回の読み出しの処理順
///
/// ```text
/// ReadResult
///   1. 新データと重なる各行について
///        古い内容（まだマージ前のキャッシュ）と比較 → sink へ New / Updated / Extended
///   2. SegmentCache::merge（ウィンドウ端の掃除込み）
///   3. 掃除で空になった既知の行 → sink へ Removed
/// バッチ終了（on_batch_end）
///   変更が 1 つでもあれば sink.on_changes_committed() を 1 回
/// ```
#[derive(Debug)]
pub struct ReactiveGrid<S> {
    grid: RowGrid,
    sink: S,
    has_changes: bool,
}

impl<S: ChangeSink> ReactiveGrid<S> {
    pub fn new(grid: RowGrid, sink: S) -> Self {
        ReactiveGrid { grid, sink, has_changes: false }
    }

    pub fn grid(&self) -> &RowGrid {
        &self.grid
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// 未コミットの変更があるか
    pub fn has_pending_changes(&self) -> bool {
        self.has_changes
    }

    // ===== Private メソッド =====

    /// `dropped` と重なる既知の行のうち、キャッシュに 1 バイトも残っていないものを消す
    fn remove_empty_rows(&mut self, cache: &SegmentCache, dropped: &[Range<u64>]) {
        let cols = self.grid.cols() as u64;
        for span in dropped {
            for row in self.grid.rows_overlapping(span.clone()) {
                if !self.grid.contains_row(row) || !cache.read(row, cols).is_empty() {
                    continue;
                }
                self.grid.remove_row(row);
                self.sink.on_remove_row(row);
                self.has_changes = true;
            }
        }
    }
}

impl<S: ChangeSink> CacheHook for ReactiveGrid<S> {
    fn on_read(&mut self, cache: &mut SegmentCache, read: ReadResult, window: &CursorWindow) {
        let start = read.address;
        let end = read.end();

        for row in self.grid.rows_overlapping(start..end) {
            let overlap_start = start.max(row);
            let overlap_end = end.min(self.grid.row_end(row));
            if overlap_end <= overlap_start {
                continue;
            }

            let row_offset = (overlap_start - row) as u16;
            let from = (overlap_start - start) as usize;
            let to = (overlap_end - start) as usize;
            let chunk = &read.new_data[from..to];

            let old = self.grid.row_data(cache, row);
            if classify_row(&mut self.sink, row, row_offset, chunk, old.as_ref()) {
                self.has_changes = true;
            }
            self.grid.insert_row(row);
        }

        let dropped = cache.merge(read, window);
        if !dropped.is_empty() {
            self.on_evicted(cache, &dropped);
        }
    }

    fn on_evicted(&mut self, cache: &SegmentCache, dropped: &[Range<u64>]) {
        let before = self.grid.cached_row_count();
        self.remove_empty_rows(cache, dropped);
        let removed = before - self.grid.cached_row_count();
        if removed > 0 {
            trace!(removed, remaining = self.grid.cached_row_count(), "rows evicted");
        }
    }

    fn on_batch_end(&mut self) {
        if self.has_changes {
            self.sink.on_changes_committed();
            self.has_changes = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeKind, DiffRun, RunLog};
    use alloc::vec;
    use alloc::vec::Vec;
    use memview_region::Region;

    const RW: u32 = 0x04;

    fn reactive() -> ReactiveGrid<RunLog> {
        ReactiveGrid::new(RowGrid::new(16, 0, u64::MAX), RunLog::new())
    }

    fn feed(hook: &mut ReactiveGrid<RunLog>, cache: &mut SegmentCache, address: u64, data: &[u8], window: &CursorWindow) {
        let read = cache
            .prepare(address, data.to_vec(), Region::new(0, u64::MAX, RW))
            .unwrap();
        hook.on_read(cache, read, window);
    }

    fn kinds(runs: &[DiffRun]) -> Vec<(u64, ChangeKind, u16, usize)> {
        runs.iter()
            .map(|r| (r.row_address, r.kind, r.offset, r.bytes.len()))
            .collect()
    }

    #[test]
    fn test_first_read_emits_new_rows_then_one_commit() {
        let mut cache = SegmentCache::new();
        let mut hook = reactive();
        let window = CursorWindow::new(0x1008, 0x20);

        feed(&mut hook, &mut cache, 0x1008, &[0xAA; 0x20], &window);
        hook.on_batch_end();

        let log = hook.sink();
        assert_eq!(
            kinds(&log.runs),
            vec![
                (0x1000, ChangeKind::New, 8, 8),
                (0x1010, ChangeKind::New, 0, 16),
                (0x1020, ChangeKind::New, 0, 8),
            ]
        );
        assert_eq!(log.commits, 1);
        assert_eq!(hook.grid().cached_row_count(), 3);
    }

    #[test]
    fn test_unchanged_reread_commits_nothing() {
        let mut cache = SegmentCache::new();
        let mut hook = reactive();
        let window = CursorWindow::new(0x1000, 0x10);

        feed(&mut hook, &mut cache, 0x1000, &[1; 16], &window);
        hook.on_batch_end();
        hook.sink_mut().take_runs();

        feed(&mut hook, &mut cache, 0x1000, &[1; 16], &window);
        hook.on_batch_end();

        assert!(hook.sink().runs.is_empty());
        assert_eq!(hook.sink().commits, 1);
    }

    #[test]
    fn test_update_at_offset_four() {
        let mut cache = SegmentCache::new();
        let mut hook = reactive();
        let window = CursorWindow::new(0x1000, 0x10);

        feed(&mut hook, &mut cache, 0x1000, &[0; 16], &window);
        hook.on_batch_end();
        hook.sink_mut().take_runs();

        let mut changed = [0u8; 16];
        changed[4] = 0x7F;
        feed(&mut hook, &mut cache, 0x1000, &changed, &window);
        hook.on_batch_end();

        assert_eq!(
            hook.sink().runs,
            vec![DiffRun {
                row_address: 0x1000,
                kind: ChangeKind::Updated,
                offset: 4,
                bytes: vec![0x7F],
            }]
        );
        assert_eq!(hook.sink().commits, 2);
    }

    #[test]
    fn test_eviction_removes_only_empty_rows() {
        let mut cache = SegmentCache::new();
        let mut hook = reactive();
        let far = CursorWindow::new(0x1000, 0x40).with_cache_distance(0x100);

        feed(&mut hook, &mut cache, 0x1000, &[3; 0x40], &far);
        hook.on_batch_end();
        hook.sink_mut().take_runs();

        // keep = [0x1028, 0x1030): 0x1020 行だけ一部が残る
        let near = CursorWindow::new(0x1028, 0x8).with_cache_distance(0);
        let dropped = cache.evict_outside_window(&near);
        hook.on_evicted(&cache, &dropped);
        hook.on_batch_end();

        let removed: Vec<u64> = hook
            .sink()
            .runs
            .iter()
            .filter(|r| r.kind == ChangeKind::Removed)
            .map(|r| r.row_address)
            .collect();
        assert_eq!(removed, vec![0x1000, 0x1010, 0x1030]);
        assert!(hook.grid().contains_row(0x1020));
        assert!(!hook.grid().contains_row(0x1030));
        assert_eq!(hook.sink().commits, 2);
    }

    #[test]
    fn test_merge_eviction_reports_removed_rows_in_same_batch() {
        let mut cache = SegmentCache::new();
        let mut hook = reactive();

        feed(&mut hook, &mut cache, 0x100, &[1; 16], &CursorWindow::new(0x100, 16));
        hook.on_batch_end();
        hook.sink_mut().take_runs();

        // 遠くへ移動して読む: 古い行はマージ後の掃除で消える
        let window = CursorWindow::new(0x9000, 16).with_cache_distance(0x10);
        feed(&mut hook, &mut cache, 0x9000, &[2; 16], &window);
        hook.on_batch_end();

        assert_eq!(
            kinds(&hook.sink().runs),
            vec![(0x9000, ChangeKind::New, 0, 16), (0x100, ChangeKind::Removed, 0, 0)]
        );
        assert_eq!(hook.sink().commits, 2);
    }
}
