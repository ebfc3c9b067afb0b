//! 読み出し結果をキャッシュへ流し込むフック
//!
//! viewer は生の読み出し結果を直接マージせず、このフックを経由させる。
//! diff 層（`memview-grid`）はここで古い内容と比較してからマージする。

use core::ops::Range;

use crate::cache::SegmentCache;
use crate::segment::ReadResult;
use crate::window::CursorWindow;

/// viewer から呼ばれるキャッシュ更新フック
///
/// すべてのメソッドに既定実装がある。既定の `on_read` は単純にマージし、
/// 追い出された範囲を `on_evicted` に渡す。
pub trait CacheHook {
    /// 1 回の連続読み出しの結果を処理する
    fn on_read(&mut self, cache: &mut SegmentCache, read: ReadResult, window: &CursorWindow) {
        let dropped = cache.merge(read, window);
        if !dropped.is_empty() {
            self.on_evicted(cache, &dropped);
        }
    }

    /// キャッシュから範囲が消えた（追い出し・切り詰め・アクセス不能化）
    fn on_evicted(&mut self, _cache: &SegmentCache, _dropped: &[Range<u64>]) {}

    /// 一連の処理（読み出しパス / カーソル移動時の追い出し）が終わった
    fn on_batch_end(&mut self) {}
}

/// マージするだけのフック
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOnly;

impl CacheHook for MergeOnly {}

impl<H: CacheHook + ?Sized> CacheHook for &mut H {
    fn on_read(&mut self, cache: &mut SegmentCache, read: ReadResult, window: &CursorWindow) {
        (**self).on_read(cache, read, window)
    }

    fn on_evicted(&mut self, cache: &SegmentCache, dropped: &[Range<u64>]) {
        (**self).on_evicted(cache, dropped)
    }

    fn on_batch_end(&mut self) {
        (**self).on_batch_end()
    }
}
