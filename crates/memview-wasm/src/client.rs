//! MemoryGridClient wasm-bindgen エクスポート
//!
//! 画面側（受信側）。パケットを行ストアに再生し、行の表示用文字列を返す。

use serde::Serialize;
use wasm_bindgen::prelude::*;

use memview_wire::WireDecoder;

use crate::render::format_row_hex;

#[derive(Debug, Serialize)]
struct ClientStats {
    cols: u16,
    rows: usize,
    packets: u64,
    records: u64,
    rejected: u64,
    bytes: u64,
}

/// メモリグリッドの受信側
///
/// ```typescript
/// const client = new MemoryGridClient(16);
/// port.onmessage = (e) => client.applyPacket(e.data);
/// client.getRowHex(0x1000n); // "00 1a ?? ?? ..."
/// ```
#[wasm_bindgen]
pub struct MemoryGridClient {
    decoder: WireDecoder,
}

#[wasm_bindgen]
impl MemoryGridClient {
    /// # エラー
    /// `cols` が 0
    #[wasm_bindgen(constructor)]
    pub fn new(cols: u16) -> Result<MemoryGridClient, JsError> {
        if cols == 0 {
            return Err(JsError::new("cols must be non-zero"));
        }
        Ok(MemoryGridClient { decoder: WireDecoder::new(cols) })
    }

    /// パケットを適用する
    ///
    /// # 戻り値
    /// 適用したレコード数
    ///
    /// # エラー
    /// パケットが不正（何も適用しない）
    #[wasm_bindgen(js_name = "applyPacket")]
    pub fn apply_packet(&mut self, packet: &[u8]) -> Result<u32, JsError> {
        self.decoder
            .apply_packet(packet)
            .map(|n| n as u32)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// 行の 16 進表示（未知のバイトは `??`）
    #[wasm_bindgen(js_name = "getRowHex")]
    pub fn get_row_hex(&self, row: u64) -> String {
        format_row_hex(&self.decoder.row_cells(row))
    }

    /// 行のバイト列（未知のバイトは 0）と既知マスク（1 = 既知）を連結したもの
    ///
    /// 長さは `cols * 2`。前半がデータ、後半がマスク。
    #[wasm_bindgen(js_name = "getRowBytes")]
    pub fn get_row_bytes(&self, row: u64) -> Vec<u8> {
        let cells = self.decoder.row_cells(row);
        let mut out: Vec<u8> = cells.iter().map(|c| c.unwrap_or(0)).collect();
        out.extend(cells.iter().map(|c| c.is_some() as u8));
        out
    }

    #[wasm_bindgen(js_name = "hasRow")]
    pub fn has_row(&self, row: u64) -> bool {
        self.decoder.row(row).is_some()
    }

    /// 既知の行の先頭アドレス（bigint の配列）
    pub fn rows(&self) -> js_sys::Array {
        self.decoder.rows().map(JsValue::from).collect()
    }

    #[wasm_bindgen(getter, js_name = "rowCount")]
    pub fn row_count(&self) -> u32 {
        self.decoder.row_count() as u32
    }

    pub fn clear(&mut self) {
        self.decoder.clear();
    }

    #[wasm_bindgen(js_name = "getStats")]
    pub fn get_stats(&self) -> Result<String, JsError> {
        let s = self.decoder.stats();
        let stats = ClientStats {
            cols: self.decoder.cols(),
            rows: self.decoder.row_count(),
            packets: s.packets,
            records: s.records,
            rejected: s.rejected,
            bytes: s.bytes,
        };
        serde_json::to_string(&stats).map_err(|e| JsError::new(&e.to_string()))
    }
}
