//! セグメントと読み出し結果

use alloc::vec::Vec;

use memview_region::Region;

/// キャッシュ内の連続バイト列の参照（`SegmentCache::read` の戻り値）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentView<'a> {
    pub address: u64,
    pub bytes: &'a [u8],
}

impl SegmentView<'_> {
    /// 終端アドレス（排他的）
    pub fn end(&self) -> u64 {
        self.address + self.bytes.len() as u64
    }
}

/// マージ済みバッファのうち、既存キャッシュから複製された範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRange {
    pub offset: usize,
    pub len: usize,
}

/// 1 回の連続した生読み出しの結果
///
/// `SegmentCache::prepare` が作り、フック（diff 層）を経て `SegmentCache::merge` で確定する。
///
/// ```text
/// merged_segment_address
/// │                                   merged_segment
/// ├───────────┬─────────────┬────────────────────────┐
/// │ old seg A │   (gap=0)   │ old seg B              │
/// └───────────┴─────┬───────┴──────────┬─────────────┘
///                   address            address + new_data.len()
///                   └──── new_data ────┘
/// valid_ranges = [A の範囲, B の範囲]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    /// 読み出し開始アドレス
    pub address: u64,
    /// 読み出したバイト列
    pub new_data: Vec<u8>,
    /// 既存セグメントと接する / 重なる場合のマージ先バッファ（new_data はまだ書き込まれていない）
    pub merged_segment: Option<Vec<u8>>,
    /// マージ先バッファの先頭アドレス
    pub merged_segment_address: u64,
    /// 読み出し元リージョン
    pub region: Region,
    /// マージ時にキャッシュから削除するセグメントのキー
    pub obsolete_addresses: Vec<u64>,
    /// `merged_segment` のうち既存キャッシュ由来の範囲
    pub valid_ranges: Vec<ValidRange>,
}

impl ReadResult {
    /// 既存キャッシュと接しない読み出し結果
    pub fn standalone(address: u64, new_data: Vec<u8>, region: Region) -> Self {
        ReadResult {
            address,
            new_data,
            merged_segment: None,
            merged_segment_address: address,
            region,
            obsolete_addresses: Vec::new(),
            valid_ranges: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.new_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new_data.is_empty()
    }

    /// 新データの終端アドレス（排他的）
    pub fn end(&self) -> u64 {
        self.address + self.new_data.len() as u64
    }

    /// `merged_segment` 内のオフセットが既存データ由来か
    ///
    /// 新規確保されたまま未充填のバイトと、本物の古いデータを区別するのに使う。
    pub fn is_old_byte(&self, merged_offset: usize) -> bool {
        self.valid_ranges
            .iter()
            .any(|r| merged_offset >= r.offset && merged_offset < r.offset + r.len)
    }
}
