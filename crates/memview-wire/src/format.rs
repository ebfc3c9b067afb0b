//! パケットフォーマット
//!
//! ## Record Wire Format
//! ```text
//! [row address: u64 LE (8 bytes)]
//! [offset: u8 | u16 LE]   cols < 256 なら 1 バイト、それ以外は 2 バイト
//! [length: u8 | u16 LE]   offset と同じ幅
//! [payload: length bytes]
//! ```
//!
//! 削除レコードは `offset == cols`、`length == 0`、ペイロードなし。
//! パケットはレコードを連結しただけのもの（ヘッダー・件数・チェックサムなし）。

use alloc::vec::Vec;

use crate::error::WireError;

/// アドレス長
const ADDRESS_LEN: usize = 8;

/// offset / length フィールドの幅
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U8,
    U16,
}

impl FieldWidth {
    pub fn for_cols(cols: u16) -> Self {
        if cols < 256 {
            FieldWidth::U8
        } else {
            FieldWidth::U16
        }
    }

    /// フィールド 1 つのバイト数
    pub fn size(self) -> usize {
        match self {
            FieldWidth::U8 => 1,
            FieldWidth::U16 => 2,
        }
    }

    /// レコードヘッダー長（address + offset + length）
    pub fn header_len(self) -> usize {
        ADDRESS_LEN + self.size() * 2
    }

    fn put(self, out: &mut Vec<u8>, value: u16) {
        match self {
            FieldWidth::U8 => {
                debug_assert!(value <= u8::MAX as u16);
                out.push(value as u8);
            }
            FieldWidth::U16 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    fn get(self, bytes: &[u8]) -> u16 {
        match self {
            FieldWidth::U8 => bytes[0] as u16,
            FieldWidth::U16 => u16::from_le_bytes([bytes[0], bytes[1]]),
        }
    }
}

/// 解析済みのレコード（ペイロードはパケットを借用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// New / Updated / Extended（ワイヤー上は区別しない）
    Run { address: u64, offset: u16, data: &'a [u8] },
    /// 行の削除
    Remove { address: u64 },
}

impl Record<'_> {
    pub fn address(&self) -> u64 {
        match *self {
            Record::Run { address, .. } | Record::Remove { address } => address,
        }
    }
}

/// run レコードを書き出す
pub fn write_run(out: &mut Vec<u8>, width: FieldWidth, address: u64, offset: u16, data: &[u8]) {
    out.extend_from_slice(&address.to_le_bytes());
    width.put(out, offset);
    width.put(out, data.len() as u16);
    out.extend_from_slice(data);
}

/// 削除レコードを書き出す
pub fn write_removal(out: &mut Vec<u8>, width: FieldWidth, cols: u16, address: u64) {
    out.extend_from_slice(&address.to_le_bytes());
    width.put(out, cols);
    width.put(out, 0);
}

/// パケット全体を解析する
///
/// 1 レコードでも不正なら何も返さずエラーにする。長さ 0 の run は読み飛ばす。
///
/// # 引数
/// - `packet`: 受信したパケット
/// - `cols`: 行幅（フィールド幅と削除レコードの判定に使う）
pub fn parse_packet(packet: &[u8], cols: u16) -> Result<Vec<Record<'_>>, WireError> {
    let width = FieldWidth::for_cols(cols);
    let header_len = width.header_len();
    let mut records = Vec::new();
    let mut at = 0usize;

    while at < packet.len() {
        let rest = &packet[at..];
        if rest.len() < header_len {
            return Err(WireError::TruncatedHeader { at, need: header_len, have: rest.len() });
        }

        let mut address_bytes = [0u8; ADDRESS_LEN];
        address_bytes.copy_from_slice(&rest[..ADDRESS_LEN]);
        let address = u64::from_le_bytes(address_bytes);
        let offset = width.get(&rest[ADDRESS_LEN..]);
        let length = width.get(&rest[ADDRESS_LEN + width.size()..]);
        at += header_len;

        if offset == cols {
            if length != 0 {
                return Err(WireError::MalformedRemoval { address, length });
            }
            records.push(Record::Remove { address });
            continue;
        }
        if offset > cols {
            return Err(WireError::OffsetOutOfRow { address, offset, cols });
        }
        if offset as u32 + length as u32 > cols as u32 {
            return Err(WireError::RunOverflow { address, offset, length, cols });
        }

        let have = packet.len() - at;
        let need = length as usize;
        if have < need {
            return Err(WireError::TruncatedPayload { at, need, have });
        }
        let data = &packet[at..at + need];
        at += need;

        if !data.is_empty() {
            records.push(Record::Run { address, offset, data });
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_field_width() {
        assert_eq!(FieldWidth::for_cols(16), FieldWidth::U8);
        assert_eq!(FieldWidth::for_cols(255), FieldWidth::U8);
        assert_eq!(FieldWidth::for_cols(256), FieldWidth::U16);
        assert_eq!(FieldWidth::U8.header_len(), 10);
        assert_eq!(FieldWidth::U16.header_len(), 12);
    }

    #[test]
    fn test_run_layout_narrow() {
        let mut out = Vec::new();
        write_run(&mut out, FieldWidth::U8, 0x1000, 4, &[0xAB]);
        assert_eq!(out, vec![0x00, 0x10, 0, 0, 0, 0, 0, 0, 4, 1, 0xAB]);
    }

    #[test]
    fn test_removal_layout_wide() {
        let mut out = Vec::new();
        write_removal(&mut out, FieldWidth::U16, 512, 0x2000);
        assert_eq!(out, vec![0x00, 0x20, 0, 0, 0, 0, 0, 0, 0x00, 0x02, 0, 0]);
    }

    #[test]
    fn test_parse_mixed_packet() {
        let mut out = Vec::new();
        write_run(&mut out, FieldWidth::U8, 0x1000, 0, &[1, 2, 3]);
        write_removal(&mut out, FieldWidth::U8, 16, 0x2000);
        write_run(&mut out, FieldWidth::U8, 0x1010, 15, &[9]);

        let records = parse_packet(&out, 16).unwrap();
        assert_eq!(
            records,
            vec![
                Record::Run { address: 0x1000, offset: 0, data: &[1, 2, 3] },
                Record::Remove { address: 0x2000 },
                Record::Run { address: 0x1010, offset: 15, data: &[9] },
            ]
        );
        assert!(parse_packet(&[], 16).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_truncation() {
        let mut out = Vec::new();
        write_run(&mut out, FieldWidth::U8, 0x1000, 0, &[1, 2, 3]);

        let err = parse_packet(&out[..5], 16).unwrap_err();
        assert_eq!(err, WireError::TruncatedHeader { at: 0, need: 10, have: 5 });

        let err = parse_packet(&out[..12], 16).unwrap_err();
        assert_eq!(err, WireError::TruncatedPayload { at: 10, need: 3, have: 2 });
    }

    #[test]
    fn test_parse_rejects_bad_offsets() {
        let mut out = Vec::new();
        write_run(&mut out, FieldWidth::U8, 0x1000, 17, &[]);
        assert_eq!(
            parse_packet(&out, 16).unwrap_err(),
            WireError::OffsetOutOfRow { address: 0x1000, offset: 17, cols: 16 }
        );

        let mut out = Vec::new();
        write_run(&mut out, FieldWidth::U8, 0x1000, 14, &[1, 2, 3]);
        assert_eq!(
            parse_packet(&out, 16).unwrap_err(),
            WireError::RunOverflow { address: 0x1000, offset: 14, length: 3, cols: 16 }
        );

        // offset == cols で長さ付き
        let mut out = Vec::new();
        write_run(&mut out, FieldWidth::U8, 0x1000, 16, &[1]);
        assert_eq!(
            parse_packet(&out, 16).unwrap_err(),
            WireError::MalformedRemoval { address: 0x1000, length: 1 }
        );
    }
}
