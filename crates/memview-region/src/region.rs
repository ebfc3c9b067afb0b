//! リージョン（保護属性が一様な連続アドレス範囲）と RegionOracle

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::error::OracleError;
use crate::protection::{Access, ProtectionTable};

/// 対象プロセスのアドレス空間における 1 リージョン
///
/// 一度観測したら不変。同じアドレスを後で問い合わせると、
/// 相手のアドレス空間が変わっていれば別のリージョンが返ることがある。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: u64,
    pub size: u64,
    pub protection: u32,
}

impl Region {
    pub fn new(base: u64, size: u64, protection: u32) -> Self {
        Region { base, size, protection }
    }

    /// リージョン終端（排他的）。`u64::MAX` で飽和する
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn can_read(&self, table: &ProtectionTable) -> bool {
        table.can_read(self.protection)
    }

    pub fn can_write(&self, table: &ProtectionTable) -> bool {
        table.can_write(self.protection)
    }

    pub fn can_execute(&self, table: &ProtectionTable) -> bool {
        table.can_execute(self.protection)
    }

    pub fn can_copy(&self, table: &ProtectionTable) -> bool {
        table.can_copy(self.protection)
    }

    pub fn is_guarded(&self, table: &ProtectionTable) -> bool {
        table.is_guarded(self.protection)
    }

    pub fn is_no_access(&self, table: &ProtectionTable) -> bool {
        table.is_no_access(self.protection)
    }

    pub fn can_access(&self, table: &ProtectionTable) -> bool {
        table.can_access(self.protection)
    }

    pub fn access(&self, table: &ProtectionTable) -> Access {
        table.access(self.protection)
    }
}

/// 対象プロセスのメモリを問い合わせ・読み出す外部協調者
///
/// 実装はホスト側（ネイティブ API、JS ブリッジ、テスト用の `MappedSpace` など）。
/// `read` はブロッキング呼び出しとして扱い、キャンセルは保証しない。
/// タイムアウトが必要なら呼び出し側が oracle の外側で行う。
pub trait RegionOracle {
    /// `address` を含むリージョンを返す
    fn query(&self, address: u64) -> Result<Region, OracleError>;

    /// `[address, address + length)` を読み出す
    ///
    /// # エラー
    /// アドレス・長さが不正、またはリージョンがアクセスを拒否した場合
    fn read(&self, address: u64, length: u32) -> Result<Vec<u8>, OracleError>;
}

impl<T: RegionOracle + ?Sized> RegionOracle for &T {
    fn query(&self, address: u64) -> Result<Region, OracleError> {
        (**self).query(address)
    }

    fn read(&self, address: u64, length: u32) -> Result<Vec<u8>, OracleError> {
        (**self).read(address, length)
    }
}

impl<T: RegionOracle + ?Sized> RegionOracle for Rc<T> {
    fn query(&self, address: u64) -> Result<Region, OracleError> {
        (**self).query(address)
    }

    fn read(&self, address: u64, length: u32) -> Result<Vec<u8>, OracleError> {
        (**self).read(address, length)
    }
}
