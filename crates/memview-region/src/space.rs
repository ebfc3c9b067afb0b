//! メモリ上に構築したアドレス空間
//!
//! 実プロセスにアタッチせずに viewer を動かすための `RegionOracle` 実装。
//! テストやデモで使う。マップされていない範囲は no-access の空きリージョンとして返す。

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::cell::Cell;

use crate::error::OracleError;
use crate::protection::ProtectionTable;
use crate::region::{Region, RegionOracle};

#[derive(Debug, Clone)]
struct Mapping {
    protection: u32,
    bytes: Vec<u8>,
}

/// 疎なアドレス空間（base → マッピング）
#[derive(Debug, Clone, Default)]
pub struct MappedSpace {
    mappings: BTreeMap<u64, Mapping>,
    /// 読み出しを強制的に失敗させるリージョンの base
    failing: BTreeSet<u64>,
    table: ProtectionTable,
    query_count: Cell<u64>,
    read_count: Cell<u64>,
}

impl MappedSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: ProtectionTable) -> Self {
        MappedSpace { table, ..Self::default() }
    }

    /// `base` にリージョンをマップする（サイズは `bytes.len()`）
    ///
    /// 既存マッピングと重なる場合は呼び出し側の責任（後勝ちにはならない）。
    pub fn map(&mut self, base: u64, bytes: Vec<u8>, protection: u32) -> &mut Self {
        self.mappings.insert(base, Mapping { protection, bytes });
        self
    }

    /// 読み書き可能なゼロ埋めリージョンをマップする
    pub fn map_zeroed(&mut self, base: u64, size: usize) -> &mut Self {
        let protection = self.table.read_write;
        self.map(base, alloc::vec![0u8; size], protection)
    }

    /// no-access リージョンをマップする（予約済み・未コミットのページ相当）
    pub fn map_no_access(&mut self, base: u64, size: usize) -> &mut Self {
        let protection = self.table.no_access;
        self.map(base, alloc::vec![0u8; size], protection)
    }

    pub fn unmap(&mut self, base: u64) -> bool {
        self.failing.remove(&base);
        self.mappings.remove(&base).is_some()
    }

    pub fn set_protection(&mut self, base: u64, protection: u32) -> bool {
        match self.mappings.get_mut(&base) {
            Some(m) => {
                m.protection = protection;
                true
            }
            None => false,
        }
    }

    /// マップ済みメモリを書き換える（相手プロセスでの値の変化を模す）
    ///
    /// # 戻り値
    /// 書き込み先が 1 つのマッピングに収まっていれば `true`
    pub fn write(&mut self, address: u64, data: &[u8]) -> bool {
        let Some((&base, mapping)) = self.mappings.range_mut(..=address).next_back() else {
            return false;
        };
        let offset = (address - base) as usize;
        let Some(end) = offset.checked_add(data.len()) else {
            return false;
        };
        if end > mapping.bytes.len() {
            return false;
        }
        mapping.bytes[offset..end].copy_from_slice(data);
        true
    }

    /// `base` のリージョンへの読み出しを失敗させる
    pub fn fail_reads(&mut self, base: u64) {
        self.failing.insert(base);
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.get()
    }

    pub fn read_count(&self) -> u64 {
        self.read_count.get()
    }

    fn mapping_at(&self, address: u64) -> Option<(u64, &Mapping)> {
        let (&base, mapping) = self.mappings.range(..=address).next_back()?;
        let end = base.saturating_add(mapping.bytes.len() as u64);
        (address < end).then_some((base, mapping))
    }
}

impl RegionOracle for MappedSpace {
    fn query(&self, address: u64) -> Result<Region, OracleError> {
        self.query_count.set(self.query_count.get() + 1);

        if let Some((base, mapping)) = self.mapping_at(address) {
            return Ok(Region::new(base, mapping.bytes.len() as u64, mapping.protection));
        }

        // 空き領域: 直前のマッピング終端から次のマッピング先頭まで
        let free_base = self
            .mappings
            .range(..=address)
            .next_back()
            .map(|(&b, m)| b.saturating_add(m.bytes.len() as u64))
            .unwrap_or(0);
        let free_end = self
            .mappings
            .range(address..)
            .next()
            .map(|(&b, _)| b)
            .unwrap_or(u64::MAX);

        Ok(Region::new(free_base, free_end - free_base, self.table.no_access))
    }

    fn read(&self, address: u64, length: u32) -> Result<Vec<u8>, OracleError> {
        self.read_count.set(self.read_count.get() + 1);

        if length == 0 {
            return Err(OracleError::InvalidLength { address, length });
        }
        let (base, mapping) = self
            .mapping_at(address)
            .ok_or(OracleError::InvalidAddress(address))?;
        if self.failing.contains(&base) || !self.table.can_access(mapping.protection) {
            return Err(OracleError::AccessDenied(address));
        }

        let offset = (address - base) as usize;
        let end = offset + length as usize;
        if end > mapping.bytes.len() {
            return Err(OracleError::InvalidLength { address, length });
        }
        Ok(mapping.bytes[offset..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> MappedSpace {
        let mut s = MappedSpace::new();
        s.map(0x1000, (0u8..=255).cycle().take(0x1000).collect(), 0x04);
        s.map_no_access(0x3000, 0x1000);
        s
    }

    #[test]
    fn test_query_mapped_region() {
        let s = space();
        let r = s.query(0x1800).unwrap();
        assert_eq!(r, Region::new(0x1000, 0x1000, 0x04));
        assert_eq!(s.query_count(), 1);
    }

    #[test]
    fn test_query_gap_returns_free_region() {
        let s = space();
        let r = s.query(0x2000).unwrap();
        assert_eq!(r.base, 0x2000);
        assert_eq!(r.end(), 0x3000);
        assert!(r.is_no_access(&ProtectionTable::WINDOWS));

        let below = s.query(0x10).unwrap();
        assert_eq!(below.base, 0);
        assert_eq!(below.end(), 0x1000);

        let above = s.query(0x5000).unwrap();
        assert_eq!(above.base, 0x4000);
        assert_eq!(above.end(), u64::MAX);
    }

    #[test]
    fn test_read_within_region() {
        let s = space();
        assert_eq!(s.read(0x1001, 3).unwrap(), alloc::vec![1, 2, 3]);
    }

    #[test]
    fn test_read_errors() {
        let mut s = space();
        assert_eq!(s.read(0x2000, 4), Err(OracleError::InvalidAddress(0x2000)));
        assert_eq!(s.read(0x3000, 4), Err(OracleError::AccessDenied(0x3000)));
        assert!(matches!(s.read(0x1FFE, 4), Err(OracleError::InvalidLength { .. })));

        s.fail_reads(0x1000);
        assert_eq!(s.read(0x1000, 4), Err(OracleError::AccessDenied(0x1000)));
        assert_eq!(s.read_count(), 4);
    }

    #[test]
    fn test_write_changes_bytes() {
        let mut s = space();
        assert!(s.write(0x1004, &[0xFF]));
        assert_eq!(s.read(0x1004, 1).unwrap(), alloc::vec![0xFF]);
        // マッピングをまたぐ書き込みは拒否
        assert!(!s.write(0x1FFF, &[1, 2]));
        assert!(!s.write(0x2000, &[1]));
    }
}
