//! 変更イベント → パケット

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use memview_grid::ChangeSink;
use tracing::trace;

use crate::format::{write_removal, write_run, FieldWidth};

/// エンコーダーの統計情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    /// 確定したパケット数
    pub packets: u64,
    /// run レコード数
    pub runs: u64,
    /// 削除レコード数
    pub removals: u64,
    /// パケットの総バイト数
    pub bytes: u64,
}

/// `ChangeSink` として変更イベントを受け取り、コミットごとに 1 パケットにまとめる
///
/// ```text
/// on_new_row / on_update_row / on_extend_row → run レコード
/// on_remove_row                              → 削除レコード
/// on_changes_committed                       → pending をパケットとして確定
/// ```
///
/// 確定したパケットは `take_packets()` で取り出してホストの転送路に流す。
/// コミットとコミットの間には何も出さない。
#[derive(Debug, Clone)]
pub struct WireEncoder {
    cols: u16,
    width: FieldWidth,
    /// 次のコミットで確定するレコード列
    pending: Vec<u8>,
    /// 確定済み・未取得のパケット
    packets: VecDeque<Vec<u8>>,
    stats: EncoderStats,
}

impl WireEncoder {
    pub fn new(cols: u16) -> Self {
        WireEncoder {
            cols,
            width: FieldWidth::for_cols(cols),
            pending: Vec::new(),
            packets: VecDeque::new(),
            stats: EncoderStats::default(),
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn field_width(&self) -> FieldWidth {
        self.width
    }

    /// 確定済みのパケットをすべて取り出す（古い順）
    pub fn take_packets(&mut self) -> Vec<Vec<u8>> {
        self.packets.drain(..).collect()
    }

    /// 確定済みのパケットを 1 つ取り出す
    pub fn pop_packet(&mut self) -> Option<Vec<u8>> {
        self.packets.pop_front()
    }

    pub fn has_packets(&self) -> bool {
        !self.packets.is_empty()
    }

    /// 未コミットのバイト数
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> EncoderStats {
        self.stats
    }

    fn push_run(&mut self, address: u64, offset: u16, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        write_run(&mut self.pending, self.width, address, offset, data);
        self.stats.runs += 1;
    }
}

impl ChangeSink for WireEncoder {
    fn on_new_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        self.push_run(address, offset, data);
    }

    fn on_update_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        self.push_run(address, offset, data);
    }

    fn on_extend_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        self.push_run(address, offset, data);
    }

    fn on_remove_row(&mut self, address: u64) {
        write_removal(&mut self.pending, self.width, self.cols, address);
        self.stats.removals += 1;
    }

    fn on_changes_committed(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let packet = core::mem::take(&mut self.pending);
        self.stats.packets += 1;
        self.stats.bytes += packet.len() as u64;
        trace!(len = packet.len(), queued = self.packets.len() + 1, "wire packet committed");
        self.packets.push_back(packet);
    }
}
