//! viewer の設定
//!
//! JSON（ホストからの IPC / wasm 経由）で受け取る前提。キーは camelCase。
//! アドレスは JSON の数値でも `"0x7ff6_0000"` のような文字列でもよい
//! （JS の number は 2^53 を超えるアドレスを表せないため）。
//!
//! ```json
//! { "cols": 16, "rows": 4096, "minAddress": "0x7ff600000000", "readLength": 512 }
//! ```

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// 既定のデバウンス時間（ミリ秒）
pub const DEFAULT_DEBOUNCE_MS: u64 = 400;
/// 既定の自動リフレッシュ間隔（ミリ秒）
pub const DEFAULT_AUTO_REFRESH_MS: u64 = 1000;

/// 設定エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cols must be non-zero")]
    ZeroColumns,
    #[error("empty address range: min {min:#x} >= max {max:#x}")]
    EmptyRange { min: u64, max: u64 },
    #[error("{rows} rows of {cols} columns overflow the address space from {min:#x}")]
    RowsOverflow { min: u64, rows: u64, cols: u16 },
    #[error("invalid config: {0}")]
    Parse(String),
}

/// viewer / グリッドの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerConfig {
    /// 1 行のバイト数
    pub cols: u16,
    /// 行数。指定すると上限は `min_address + rows * cols` になる
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(default, with = "address")]
    pub min_address: u64,
    /// 上限（排他的）。`rows` があればそちらが優先
    #[serde(default, with = "opt_address", skip_serializing_if = "Option::is_none")]
    pub max_address: Option<u64>,
    #[serde(default, with = "address")]
    pub cursor: u64,
    #[serde(default)]
    pub read_length: u32,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// 0 で無効
    #[serde(default = "default_auto_refresh_ms")]
    pub auto_refresh_ms: u64,
    #[serde(default = "default_cache_distance")]
    pub cache_distance: u32,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_auto_refresh_ms() -> u64 {
    DEFAULT_AUTO_REFRESH_MS
}

fn default_cache_distance() -> u32 {
    memview_cache::DEFAULT_CACHE_DISTANCE
}

impl ViewerConfig {
    /// 行幅だけ指定し、残りは既定値
    pub fn new(cols: u16) -> Self {
        ViewerConfig {
            cols,
            rows: None,
            min_address: 0,
            max_address: None,
            cursor: 0,
            read_length: 0,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            auto_refresh_ms: DEFAULT_AUTO_REFRESH_MS,
            cache_distance: memview_cache::DEFAULT_CACHE_DISTANCE,
        }
    }

    /// JSON 文字列から読み込み、検証する
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 実効上限アドレス（排他的）
    ///
    /// `rows` があれば `min + rows * cols`、なければ `max_address`、どちらもなければ `u64::MAX`。
    pub fn effective_max_address(&self) -> Result<u64, ConfigError> {
        match self.rows {
            Some(rows) => rows
                .checked_mul(self.cols as u64)
                .and_then(|span| self.min_address.checked_add(span))
                .ok_or(ConfigError::RowsOverflow {
                    min: self.min_address,
                    rows,
                    cols: self.cols,
                }),
            None => Ok(self.max_address.unwrap_or(u64::MAX)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 {
            return Err(ConfigError::ZeroColumns);
        }
        let max = self.effective_max_address()?;
        if self.min_address >= max {
            return Err(ConfigError::EmptyRange { min: self.min_address, max });
        }
        Ok(())
    }
}

/// 実行中の viewer への部分的な設定変更
///
/// 指定されたフィールドだけを反映する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerUpdate {
    #[serde(default, with = "opt_address", skip_serializing_if = "Option::is_none")]
    pub cursor: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_refresh_ms: Option<u64>,
}

impl ViewerUpdate {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ===== アドレスの (de)serialize =====

/// 数値 / 10 進文字列 / `0x` 付き 16 進文字列を受け付けるアドレス
struct HexOrNumber(u64);

impl Serialize for HexOrNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", self.0))
    }
}

impl<'de> Deserialize<'de> for HexOrNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddressVisitor;

        impl<'de> Visitor<'de> for AddressVisitor {
            type Value = HexOrNumber;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an address as a non-negative integer or a \"0x\" hex string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(HexOrNumber(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(HexOrNumber)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                parse_address(v)
                    .map(HexOrNumber)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(AddressVisitor)
    }
}

/// `"0x1f00"` / `"0X1F00"` / `"7936"`（`_` 区切り可）
pub fn parse_address(text: &str) -> Option<u64> {
    let text = text.trim();
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => cleaned.parse().ok(),
    }
}

mod address {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        HexOrNumber(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        HexOrNumber::deserialize(deserializer).map(|a| a.0)
    }
}

mod opt_address {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(HexOrNumber).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Option::<HexOrNumber>::deserialize(deserializer).map(|a| a.map(|a| a.0))
    }
}
