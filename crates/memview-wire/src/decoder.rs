//! パケット → 受信側の行ストア
//!
//! ## レコードの適用規則
//!
//! ```text
//! run (address, offset, data)
//!   未知の行                          → 新しい行（on_new_row）
//!   既存チャンクに完全に収まる        → 上書き（on_update_row）
//!   それ以外                          → 接する / 重なるチャンクと結合（on_extend_row）
//! removal (address)
//!   既知の行                          → 削除（on_remove_row）
//!   未知の行                          → 無視
//! ```
//!
//! 行内のチャンクは常に重ならず、接してもいない状態に保つ。

use alloc::collections::btree_map::Entry;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use memview_grid::ChangeSink;
use tracing::warn;

use crate::error::WireError;
use crate::format::{parse_packet, Record};

/// 1 行分のチャンク（行頭からのオフセット → バイト列）
pub type RowChunks = BTreeMap<u16, Vec<u8>>;

/// デコーダーの統計情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// 適用したパケット数
    pub packets: u64,
    /// 適用したレコード数（削除含む）
    pub records: u64,
    /// 不正として捨てたパケット数
    pub rejected: u64,
    /// 受け取った総バイト数（捨てたパケットも含む）
    pub bytes: u64,
}

/// 受信側の行ストア
///
/// 適用した変更は `S` にも通知する（画面側の再描画トリガーなど）。
#[derive(Debug, Clone)]
pub struct WireDecoder<S = ()> {
    cols: u16,
    rows: BTreeMap<u64, RowChunks>,
    sink: S,
    stats: DecoderStats,
}

impl WireDecoder<()> {
    pub fn new(cols: u16) -> Self {
        Self::with_sink(cols, ())
    }
}

impl<S: ChangeSink> WireDecoder<S> {
    pub fn with_sink(cols: u16, sink: S) -> Self {
        WireDecoder {
            cols,
            rows: BTreeMap::new(),
            sink,
            stats: DecoderStats::default(),
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// パケットを適用する
    ///
    /// 先にパケット全体を解析し、すべてのレコードが正しい場合だけ順に適用する。
    /// 1 件以上適用したら最後に `on_changes_committed` を 1 回呼ぶ。
    ///
    /// # 戻り値
    /// 適用したレコード数
    ///
    /// # エラー
    /// パケットが不正な場合（行ストアは変更しない）
    pub fn apply_packet(&mut self, packet: &[u8]) -> Result<usize, WireError> {
        self.stats.bytes += packet.len() as u64;

        let records = match parse_packet(packet, self.cols) {
            Ok(records) => records,
            Err(e) => {
                self.stats.rejected += 1;
                warn!(error = %e, len = packet.len(), "rejected wire packet");
                return Err(e);
            }
        };

        for record in &records {
            match *record {
                Record::Run { address, offset, data } => self.apply_run(address, offset, data),
                Record::Remove { address } => self.apply_removal(address),
            }
        }

        if !records.is_empty() {
            self.stats.packets += 1;
            self.stats.records += records.len() as u64;
            self.sink.on_changes_committed();
        }
        Ok(records.len())
    }

    /// 行のチャンク
    pub fn row(&self, address: u64) -> Option<&RowChunks> {
        self.rows.get(&address)
    }

    /// 行頭から `offset` のバイト（未知なら `None`）
    pub fn byte_at(&self, row: u64, offset: u16) -> Option<u8> {
        let chunks = self.rows.get(&row)?;
        let (&start, bytes) = chunks.range(..=offset).next_back()?;
        bytes.get((offset - start) as usize).copied()
    }

    /// 行の全カラム（未知のバイトは `None`）
    pub fn row_cells(&self, row: u64) -> Vec<Option<u8>> {
        let mut cells = alloc::vec![None; self.cols as usize];
        if let Some(chunks) = self.rows.get(&row) {
            for (&start, bytes) in chunks {
                for (i, &b) in bytes.iter().enumerate() {
                    if let Some(cell) = cells.get_mut(start as usize + i) {
                        *cell = Some(b);
                    }
                }
            }
        }
        cells
    }

    /// 既知の行の先頭アドレス（昇順）
    pub fn rows(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.keys().copied()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 行ストアを空にする（sink には通知しない）
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    // ===== Private メソッド =====

    fn apply_run(&mut self, address: u64, offset: u16, data: &[u8]) {
        let row = match self.rows.entry(address) {
            Entry::Vacant(slot) => {
                let mut row = RowChunks::new();
                row.insert(offset, data.to_vec());
                slot.insert(row);
                self.sink.on_new_row(address, offset, data);
                return;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        let end = offset as usize + data.len();

        // 既存チャンクに完全に収まるなら上書き
        if let Some((&start, chunk)) = row.range_mut(..=offset).next_back() {
            if end <= start as usize + chunk.len() {
                let at = (offset - start) as usize;
                chunk[at..at + data.len()].copy_from_slice(data);
                self.sink.on_update_row(address, offset, data);
                return;
            }
        }

        // 接する / 重なるチャンクをまとめて 1 つにする
        let touching: Vec<u16> = row
            .iter()
            .filter(|&(&s, c)| s as usize <= end && s as usize + c.len() >= offset as usize)
            .map(|(&s, _)| s)
            .collect();

        let mut merge_start = offset as usize;
        let mut merge_end = end;
        for s in &touching {
            if let Some(c) = row.get(s) {
                merge_start = merge_start.min(*s as usize);
                merge_end = merge_end.max(*s as usize + c.len());
            }
        }

        let mut merged = alloc::vec![0u8; merge_end - merge_start];
        for s in touching {
            if let Some(c) = row.remove(&s) {
                let at = s as usize - merge_start;
                merged[at..at + c.len()].copy_from_slice(&c);
            }
        }
        let at = offset as usize - merge_start;
        merged[at..at + data.len()].copy_from_slice(data);
        row.insert(merge_start as u16, merged);

        self.sink.on_extend_row(address, offset, data);
    }

    fn apply_removal(&mut self, address: u64) {
        if self.rows.remove(&address).is_some() {
            self.sink.on_remove_row(address);
        }
    }
}
