//! 変更イベントとその受け手

use alloc::vec::Vec;

/// 行に対する変更の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// 初めてデータが入った行
    New,
    /// 既知のバイトが変化した
    Updated,
    /// 未知だったバイトが埋まった
    Extended,
    /// 行のデータがキャッシュから消えた
    Removed,
}

/// 1 行内の連続した変更
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRun {
    pub row_address: u64,
    pub kind: ChangeKind,
    /// 行頭からのオフセット
    pub offset: u16,
    /// `Removed` では空
    pub bytes: Vec<u8>,
}

impl DiffRun {
    pub fn removed(row_address: u64) -> Self {
        DiffRun { row_address, kind: ChangeKind::Removed, offset: 0, bytes: Vec::new() }
    }
}

/// 変更イベントの受け手
///
/// すべて既定で何もしない。必要なものだけ実装する。
/// `on_changes_committed` は 1 バッチ（読み出しパス / 追い出し）の終わりに
/// 変更が 1 つ以上あった場合だけ呼ばれる。
pub trait ChangeSink {
    fn on_new_row(&mut self, _address: u64, _offset: u16, _data: &[u8]) {}
    fn on_update_row(&mut self, _address: u64, _offset: u16, _data: &[u8]) {}
    fn on_extend_row(&mut self, _address: u64, _offset: u16, _data: &[u8]) {}
    fn on_remove_row(&mut self, _address: u64) {}
    fn on_changes_committed(&mut self) {}
}

impl ChangeSink for () {}

impl<S: ChangeSink + ?Sized> ChangeSink for &mut S {
    fn on_new_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        (**self).on_new_row(address, offset, data)
    }

    fn on_update_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        (**self).on_update_row(address, offset, data)
    }

    fn on_extend_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        (**self).on_extend_row(address, offset, data)
    }

    fn on_remove_row(&mut self, address: u64) {
        (**self).on_remove_row(address)
    }

    fn on_changes_committed(&mut self) {
        (**self).on_changes_committed()
    }
}

/// 受け取った変更を `DiffRun` として記録する sink
///
/// テストや、イベントをまとめて後処理したいホスト向け。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLog {
    pub runs: Vec<DiffRun>,
    /// `on_changes_committed` の呼び出し回数
    pub commits: u32,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 記録済みの変更を取り出す（コミット回数はそのまま）
    pub fn take_runs(&mut self) -> Vec<DiffRun> {
        core::mem::take(&mut self.runs)
    }

    fn push(&mut self, row_address: u64, kind: ChangeKind, offset: u16, data: &[u8]) {
        self.runs.push(DiffRun { row_address, kind, offset, bytes: data.to_vec() });
    }
}

impl ChangeSink for RunLog {
    fn on_new_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        self.push(address, ChangeKind::New, offset, data);
    }

    fn on_update_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        self.push(address, ChangeKind::Updated, offset, data);
    }

    fn on_extend_row(&mut self, address: u64, offset: u16, data: &[u8]) {
        self.push(address, ChangeKind::Extended, offset, data);
    }

    fn on_remove_row(&mut self, address: u64) {
        self.runs.push(DiffRun::removed(address));
    }

    fn on_changes_committed(&mut self) {
        self.commits += 1;
    }
}
