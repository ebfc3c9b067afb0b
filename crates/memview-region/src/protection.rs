//! 保護属性ビットマスクの解釈
//!
//! ビット値そのものはプラットフォーム依存なので、グローバル定数には頼らず
//! `ProtectionTable` を呼び出し側から渡す。既定値は Windows の `PAGE_*` 定数。

use core::fmt;

use bitflags::bitflags;

/// 保護属性ビットの定数表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionTable {
    pub no_access: u32,
    pub read_only: u32,
    pub read_write: u32,
    pub write_copy: u32,
    pub execute: u32,
    pub execute_read: u32,
    pub execute_read_write: u32,
    pub execute_write_copy: u32,
    pub guard: u32,
}

impl ProtectionTable {
    /// Windows (`VirtualQueryEx`) の `PAGE_*` 値
    pub const WINDOWS: Self = ProtectionTable {
        no_access: 0x01,
        read_only: 0x02,
        read_write: 0x04,
        write_copy: 0x08,
        execute: 0x10,
        execute_read: 0x20,
        execute_read_write: 0x40,
        execute_write_copy: 0x80,
        guard: 0x100,
    };

    fn any(mask: u32, bits: &[u32]) -> bool {
        bits.iter().any(|&b| mask & b != 0)
    }

    pub fn can_read(&self, mask: u32) -> bool {
        Self::any(
            mask,
            &[self.read_only, self.read_write, self.execute_read, self.execute_read_write],
        )
    }

    pub fn can_write(&self, mask: u32) -> bool {
        Self::any(
            mask,
            &[self.read_write, self.write_copy, self.execute_read_write, self.execute_write_copy],
        )
    }

    pub fn can_execute(&self, mask: u32) -> bool {
        Self::any(
            mask,
            &[self.execute, self.execute_read, self.execute_read_write, self.execute_write_copy],
        )
    }

    /// copy-on-write ページか
    pub fn can_copy(&self, mask: u32) -> bool {
        Self::any(mask, &[self.write_copy, self.execute_write_copy])
    }

    pub fn is_guarded(&self, mask: u32) -> bool {
        mask & self.guard != 0
    }

    pub fn is_no_access(&self, mask: u32) -> bool {
        mask & self.no_access != 0
    }

    /// 読み出しを試みてよいか（no-access でも guard でもない）
    pub fn can_access(&self, mask: u32) -> bool {
        !self.is_no_access(mask) && !self.is_guarded(mask)
    }

    /// ビットマスクを `Access` フラグに変換する
    pub fn access(&self, mask: u32) -> Access {
        let mut access = Access::NONE;
        access.set(Access::READ, self.can_read(mask));
        access.set(Access::WRITE, self.can_write(mask));
        access.set(Access::EXECUTE, self.can_execute(mask));
        access.set(Access::COPY, self.can_copy(mask));
        access
    }
}

impl Default for ProtectionTable {
    fn default() -> Self {
        Self::WINDOWS
    }
}

bitflags! {
    /// プラットフォーム非依存のアクセス権
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ    = 1;
        const WRITE   = 2;
        const EXECUTE = 4;
        const COPY    = 8;

        const NONE    = 0;
    }
}

/// `RWX` 形式（例: `R-X`）
impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(Self::READ) { 'R' } else { '-' };
        let w = if self.contains(Self::WRITE) { 'W' } else { '-' };
        let x = if self.contains(Self::EXECUTE) { 'X' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}
