//! 疎なセグメントキャッシュ
//!
//! アドレス → バッファの統合キャッシュ。挿入時に接する / 重なるセグメントを
//! 1 つにマージし、カーソルウィンドウから遠いデータを追い出す。
//!
//! ## 不変条件
//!
//! - セグメントは空でない
//! - 任意の 2 セグメントは重ならず、接してもいない（接していればマージ済み）
//! - アドレス昇順（`BTreeMap` なので常に整列済み）

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ops::Range;

use memview_region::Region;
use tracing::trace;

use crate::segment::{ReadResult, SegmentView, ValidRange};
use crate::window::CursorWindow;

/// 疎なセグメントキャッシュ
#[derive(Debug, Clone, Default)]
pub struct SegmentCache {
    /// セグメント先頭アドレス → バイト列
    segments: BTreeMap<u64, Vec<u8>>,
    /// セグメント先頭アドレス → 最後に読み出したリージョン
    regions: BTreeMap<u64, Region>,
}

fn segment_end(address: u64, bytes: &[u8]) -> u64 {
    address + bytes.len() as u64
}

impl SegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新しく読み出したデータのマージ計画を立てる
    ///
    /// `[address, address + data.len()]` に接する / 重なるセグメントを探し、
    /// それらを包含するゼロ初期化バッファに既存データを複製する。
    /// キャッシュ自体はまだ変更しない（diff 層が古い状態を読めるように）。
    ///
    /// # 戻り値
    /// - `Some(ReadResult)`: `merge` に渡す読み出し結果
    /// - `None`: `data` が空
    pub fn prepare(&self, address: u64, data: Vec<u8>, region: Region) -> Option<ReadResult> {
        if data.is_empty() {
            return None;
        }

        let new_end = address.saturating_add(data.len() as u64);
        let mut merge_start = address;
        let mut merge_end = new_end;
        let mut touching: Vec<(u64, &[u8])> = Vec::new();

        // 降順に見て、終端が address より前に来たら以降はすべて手前
        for (&seg_addr, bytes) in self.segments.range(..=new_end).rev() {
            let seg_end = segment_end(seg_addr, bytes);
            if seg_end < address {
                break;
            }
            touching.push((seg_addr, bytes.as_slice()));
            merge_start = merge_start.min(seg_addr);
            merge_end = merge_end.max(seg_end);
        }

        if touching.is_empty() {
            return Some(ReadResult::standalone(address, data, region));
        }

        let mut merged = alloc::vec![0u8; (merge_end - merge_start) as usize];
        let mut valid_ranges = Vec::with_capacity(touching.len());
        let mut obsolete_addresses = Vec::with_capacity(touching.len());

        for &(seg_addr, bytes) in touching.iter().rev() {
            let offset = (seg_addr - merge_start) as usize;
            merged[offset..offset + bytes.len()].copy_from_slice(bytes);
            valid_ranges.push(ValidRange { offset, len: bytes.len() });
            obsolete_addresses.push(seg_addr);
        }

        Some(ReadResult {
            address,
            new_data: data,
            merged_segment: Some(merged),
            merged_segment_address: merge_start,
            region,
            obsolete_addresses,
            valid_ranges,
        })
    }

    /// 読み出し結果をキャッシュに確定する
    ///
    /// マージ後は必ずウィンドウ端の掃除（`evict_outside_window`）を行う。
    ///
    /// # 戻り値
    /// 掃除でキャッシュから消えたアドレス範囲
    pub fn merge(&mut self, read: ReadResult, window: &CursorWindow) -> Vec<Range<u64>> {
        let ReadResult {
            address,
            new_data,
            merged_segment,
            merged_segment_address,
            region,
            obsolete_addresses,
            ..
        } = read;

        match merged_segment {
            None => self.insert(address, new_data, region),
            Some(mut merged) => {
                for seg_addr in &obsolete_addresses {
                    self.segments.remove(seg_addr);
                    self.regions.remove(seg_addr);
                }
                let offset = (address - merged_segment_address) as usize;
                merged[offset..offset + new_data.len()].copy_from_slice(&new_data);
                self.insert(merged_segment_address, merged, region);
            }
        }

        let dropped = self.evict_outside_window(window);
        self.debug_check();
        dropped
    }

    /// `[address, address + length)` に含まれるキャッシュ済みバイト列を返す
    ///
    /// 各要素は要求範囲にちょうどクリップされ、互いに重ならない。
    /// キャッシュにない部分（穴）は結果に含まれない（ゼロ埋めはしない）。
    pub fn read(&self, address: u64, length: u64) -> Vec<SegmentView<'_>> {
        let mut views = Vec::new();
        if length == 0 {
            return views;
        }

        let end = address.saturating_add(length);
        let first_key = self
            .segments
            .range(..=address)
            .next_back()
            .map(|(&k, _)| k)
            .unwrap_or(address);

        for (&seg_addr, bytes) in self.segments.range(first_key..end) {
            let seg_end = segment_end(seg_addr, bytes);
            let start = seg_addr.max(address);
            let stop = seg_end.min(end);
            if start < stop {
                let from = (start - seg_addr) as usize;
                let to = (stop - seg_addr) as usize;
                views.push(SegmentView { address: start, bytes: &bytes[from..to] });
            }
        }

        views
    }

    /// ウィンドウから遠いセグメントを削除・切り詰める
    ///
    /// 昇順・降順の 2 パスで走査し、保持範囲の完全に外側にあるものは削除、
    /// 境界をまたぐものは保持範囲側だけを残した新しいバッファに置き換える。
    /// 下端の切り詰めはキーを保持範囲の先頭に移し、上端の切り詰めはキーを変えない。
    /// 各パスは保持範囲内のエントリに当たった時点で止まる（残りはさらに内側）。
    ///
    /// # 戻り値
    /// キャッシュから消えたアドレス範囲
    pub fn evict_outside_window(&mut self, window: &CursorWindow) -> Vec<Range<u64>> {
        let keep = window.keep_range();
        let mut dropped = Vec::new();

        // 下端から
        while let Some((seg_addr, len)) = self.segments.first_key_value().map(|(&a, b)| (a, b.len())) {
            let seg_end = seg_addr + len as u64;
            if seg_end <= keep.start {
                self.remove(seg_addr);
                dropped.push(seg_addr..seg_end);
                continue;
            }
            if seg_addr < keep.start {
                if let Some(mut bytes) = self.segments.remove(&seg_addr) {
                    let kept = bytes.split_off((keep.start - seg_addr) as usize);
                    let region = self.regions.remove(&seg_addr);
                    self.segments.insert(keep.start, kept);
                    if let Some(region) = region {
                        self.regions.insert(keep.start, region);
                    }
                }
                dropped.push(seg_addr..keep.start);
            }
            break;
        }

        // 上端から
        while let Some((seg_addr, len)) = self.segments.last_key_value().map(|(&a, b)| (a, b.len())) {
            let seg_end = seg_addr + len as u64;
            if seg_addr >= keep.end {
                self.remove(seg_addr);
                dropped.push(seg_addr..seg_end);
                continue;
            }
            if seg_end > keep.end {
                if let Some(bytes) = self.segments.get_mut(&seg_addr) {
                    bytes.truncate((keep.end - seg_addr) as usize);
                    bytes.shrink_to_fit();
                }
                dropped.push(keep.end..seg_end);
            }
            break;
        }

        if !dropped.is_empty() {
            trace!(
                keep_start = keep.start,
                keep_end = keep.end,
                spans = dropped.len(),
                "segment cache evicted outside window"
            );
        }
        self.debug_check();
        dropped
    }

    /// `[start, end)` のキャッシュ済みバイトを捨てる
    ///
    /// アクセス不能になったリージョンのデータを消すのに使う。
    /// 範囲をまたぐセグメントは外側の部分だけ残す。
    ///
    /// # 戻り値
    /// キャッシュから消えたアドレス範囲
    pub fn evict_range(&mut self, start: u64, end: u64) -> Vec<Range<u64>> {
        let mut dropped = Vec::new();
        if start >= end {
            return dropped;
        }

        let first_key = self
            .segments
            .range(..=start)
            .next_back()
            .map(|(&k, _)| k)
            .unwrap_or(start);
        let hit: Vec<u64> = self
            .segments
            .range(first_key..end)
            .filter(|&(&a, b)| segment_end(a, b) > start)
            .map(|(&a, _)| a)
            .collect();

        for seg_addr in hit {
            let Some(bytes) = self.segments.remove(&seg_addr) else {
                continue;
            };
            let region = self.regions.remove(&seg_addr);
            let seg_end = segment_end(seg_addr, &bytes);

            dropped.push(seg_addr.max(start)..seg_end.min(end));

            if seg_addr < start {
                let left = bytes[..(start - seg_addr) as usize].to_vec();
                self.insert_with(seg_addr, left, region);
            }
            if seg_end > end {
                let right = bytes[(end - seg_addr) as usize..].to_vec();
                self.insert_with(end, right, region);
            }
        }

        self.debug_check();
        dropped
    }

    /// `address` を含むセグメントを最後に読み出したリージョン
    pub fn region_of(&self, address: u64) -> Option<&Region> {
        let (&seg_addr, bytes) = self.segments.range(..=address).next_back()?;
        if address >= segment_end(seg_addr, bytes) {
            return None;
        }
        self.regions.get(&seg_addr)
    }

    /// 1 バイト読む（キャッシュになければ `None`）
    pub fn byte_at(&self, address: u64) -> Option<u8> {
        let (&seg_addr, bytes) = self.segments.range(..=address).next_back()?;
        bytes.get((address - seg_addr) as usize).copied()
    }

    /// 全セグメントを昇順に返す
    pub fn iter(&self) -> impl Iterator<Item = SegmentView<'_>> {
        self.segments
            .iter()
            .map(|(&address, bytes)| SegmentView { address, bytes })
    }

    /// セグメント数
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// キャッシュ済みの総バイト数
    pub fn cached_bytes(&self) -> u64 {
        self.segments.values().map(|b| b.len() as u64).sum()
    }

    /// すべて破棄する
    ///
    /// # 戻り値
    /// 破棄したアドレス範囲
    pub fn clear(&mut self) -> Vec<Range<u64>> {
        let dropped = self
            .segments
            .iter()
            .map(|(&a, b)| a..segment_end(a, b))
            .collect();
        self.segments.clear();
        self.regions.clear();
        dropped
    }

    /// 不変条件（空でない・重ならない・接していない）を満たしているか
    pub fn check_invariants(&self) -> bool {
        let mut prev_end: Option<u64> = None;
        for (&seg_addr, bytes) in &self.segments {
            if bytes.is_empty() {
                return false;
            }
            if let Some(end) = prev_end {
                if seg_addr <= end {
                    return false;
                }
            }
            prev_end = Some(segment_end(seg_addr, bytes));
        }
        self.regions.keys().all(|k| self.segments.contains_key(k))
    }

    // ===== Private メソッド =====

    fn insert(&mut self, address: u64, bytes: Vec<u8>, region: Region) {
        self.insert_with(address, bytes, Some(region));
    }

    fn insert_with(&mut self, address: u64, bytes: Vec<u8>, region: Option<Region>) {
        if bytes.is_empty() {
            return;
        }
        self.segments.insert(address, bytes);
        match region {
            Some(region) => {
                self.regions.insert(address, region);
            }
            None => {
                self.regions.remove(&address);
            }
        }
    }

    fn remove(&mut self, address: u64) {
        self.segments.remove(&address);
        self.regions.remove(&address);
    }

    fn debug_check(&self) {
        debug_assert!(
            self.check_invariants(),
            "segment cache invariant violated: overlapping or unmerged segments"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    const RW: u32 = 0x04;

    fn region() -> Region {
        Region::new(0, u64::MAX, RW)
    }

    fn wide_window() -> CursorWindow {
        CursorWindow::new(0x1000, 0x1000).with_cache_distance(u32::MAX)
    }

    fn put(cache: &mut SegmentCache, address: u64, data: &[u8]) -> Vec<Range<u64>> {
        let read = cache.prepare(address, data.to_vec(), region()).unwrap();
        cache.merge(read, &wide_window())
    }

    fn collect(cache: &SegmentCache) -> Vec<(u64, Vec<u8>)> {
        cache.iter().map(|v| (v.address, v.bytes.to_vec())).collect()
    }

    #[test]
    fn test_prepare_standalone() {
        let cache = SegmentCache::new();
        let read = cache.prepare(0x1000, vec![1, 2, 3], region()).unwrap();
        assert!(read.merged_segment.is_none());
        assert_eq!(read.merged_segment_address, 0x1000);
        assert!(read.obsolete_addresses.is_empty());
        assert!(read.valid_ranges.is_empty());
    }

    #[test]
    fn test_prepare_empty_data() {
        let cache = SegmentCache::new();
        assert!(cache.prepare(0x1000, vec![], region()).is_none());
    }

    #[test]
    fn test_prepare_touching_segments() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x1000, &[1, 1]);
        put(&mut cache, 0x1006, &[3, 3]);

        // [0x1002, 0x1006) は両方に接する
        let read = cache.prepare(0x1002, vec![2, 2, 2, 2], region()).unwrap();
        assert_eq!(read.merged_segment_address, 0x1000);
        assert_eq!(read.obsolete_addresses, vec![0x1000, 0x1006]);
        assert_eq!(
            read.valid_ranges,
            vec![ValidRange { offset: 0, len: 2 }, ValidRange { offset: 6, len: 2 }]
        );
        assert_eq!(read.merged_segment.as_deref(), Some(&[1, 1, 0, 0, 0, 0, 3, 3][..]));
        assert!(read.is_old_byte(1));
        assert!(!read.is_old_byte(2));

        // prepare はキャッシュを変更しない
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_merge_adjacent_into_one() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x1000, &[1, 1]);
        put(&mut cache, 0x1006, &[3, 3]);
        put(&mut cache, 0x1002, &[2, 2, 2, 2]);

        assert_eq!(collect(&cache), vec![(0x1000, vec![1, 1, 2, 2, 2, 2, 3, 3])]);
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_merge_overlapping_overwrites() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x1000, &[0; 8]);
        put(&mut cache, 0x1004, &[9; 8]);

        assert_eq!(
            collect(&cache),
            vec![(0x1000, vec![0, 0, 0, 0, 9, 9, 9, 9, 9, 9, 9, 9])]
        );
    }

    #[test]
    fn test_merge_same_bytes_is_idempotent() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x1000, &[1, 2, 3, 4]);
        let before = collect(&cache);
        put(&mut cache, 0x1001, &[2, 3]);
        assert_eq!(collect(&cache), before);
    }

    #[test]
    fn test_read_clips_and_skips_gaps() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x1000, &[1, 2, 3, 4]);
        put(&mut cache, 0x1008, &[5, 6, 7, 8]);

        let views = cache.read(0x1002, 8);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0], SegmentView { address: 0x1002, bytes: &[3, 4] });
        assert_eq!(views[1], SegmentView { address: 0x1008, bytes: &[5, 6] });

        assert!(cache.read(0x1004, 4).is_empty());
        assert!(cache.read(0x1000, 0).is_empty());
    }

    #[test]
    fn test_evict_deletes_and_trims_low_edge() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x100, &[1; 0x10]);
        put(&mut cache, 0x0F0, &[0; 0x8]);
        put(&mut cache, 0x200, &[2; 0x20]);

        // keep = [0x208, 0x208 + 0x8 + 0x8)
        let window = CursorWindow::new(0x210, 0x8).with_cache_distance(0x8);
        let dropped = cache.evict_outside_window(&window);

        assert_eq!(collect(&cache), vec![(0x208, vec![2; 0x18])]);
        assert_eq!(dropped, vec![0x0F0..0x0F8, 0x100..0x110, 0x200..0x208]);
    }

    #[test]
    fn test_evict_trims_high_edge_keeps_key() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x100, &[1; 0x40]);
        put(&mut cache, 0x200, &[2; 0x10]);

        // keep = [0x0F0, 0x120)
        let window = CursorWindow::new(0x100, 0x10).with_cache_distance(0x10);
        let dropped = cache.evict_outside_window(&window);

        assert_eq!(collect(&cache), vec![(0x100, vec![1; 0x20])]);
        assert_eq!(dropped, vec![0x200..0x210, 0x120..0x140]);
    }

    #[test]
    fn test_evict_keeps_region_on_trim() {
        let mut cache = SegmentCache::new();
        let r = Region::new(0x100, 0x100, 0x20);
        let read = cache.prepare(0x100, vec![7; 0x40], r).unwrap();
        cache.merge(read, &wide_window());

        let window = CursorWindow::new(0x130, 0).with_cache_distance(0x8);
        cache.evict_outside_window(&window);
        assert_eq!(cache.region_of(0x128), Some(&r));
        assert_eq!(cache.region_of(0x120), None);
    }

    #[test]
    fn test_evict_range_splits_segment() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x100, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let dropped = cache.evict_range(0x102, 0x105);
        assert_eq!(dropped, vec![0x102..0x105]);
        assert_eq!(collect(&cache), vec![(0x100, vec![1, 2]), (0x105, vec![6, 7, 8])]);
        assert!(cache.check_invariants());
    }

    #[test]
    fn test_byte_at_and_stats() {
        let mut cache = SegmentCache::new();
        put(&mut cache, 0x100, &[0xAA, 0xBB]);
        assert_eq!(cache.byte_at(0x101), Some(0xBB));
        assert_eq!(cache.byte_at(0x102), None);
        assert_eq!(cache.byte_at(0x0FF), None);
        assert_eq!(cache.cached_bytes(), 2);

        let dropped = cache.clear();
        assert_eq!(dropped, vec![0x100..0x102]);
        assert!(cache.is_empty());
    }
}
