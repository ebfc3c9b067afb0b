//! 行の文字列表現

/// 行のカラムを 16 進で並べる。未知のバイトは `??`
///
/// ```text
/// [Some(0x00), None, Some(0xAB)] → "00 ?? ab"
/// ```
pub fn format_row_hex(cells: &[Option<u8>]) -> String {
    let mut out = String::with_capacity(cells.len() * 3);
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match cell {
            Some(b) => {
                const HEX: &[u8; 16] = b"0123456789abcdef";
                out.push(HEX[(b >> 4) as usize] as char);
                out.push(HEX[(b & 0x0F) as usize] as char);
            }
            None => out.push_str("??"),
        }
    }
    out
}
