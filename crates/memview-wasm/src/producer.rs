//! MemoryGridProducer wasm-bindgen エクスポート
//!
//! 対象プロセス側（読み出し側）。JS の oracle オブジェクトを読み、
//! 変更をワイヤーパケットにして返す。

use js_sys::Uint8Array;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use memview_viewer::{NetworkedGrid, ViewerConfig, ViewerUpdate};

use crate::oracle::JsOracle;

/// 統計情報（`getStats` の JSON）
#[derive(Debug, Serialize)]
struct ProducerStats {
    cursor: String,
    read_length: u32,
    running: bool,
    passes: u64,
    reads: u64,
    failed_reads: u64,
    skipped_regions: u64,
    bytes_read: u64,
    cached_segments: usize,
    cached_bytes: u64,
    cached_rows: usize,
    packets: u64,
    runs: u64,
    removals: u64,
    packet_bytes: u64,
}

/// メモリグリッドの送信側
///
/// ## 使用方法（TypeScript）
///
/// ```typescript
/// const producer = new MemoryGridProducer(oracle, JSON.stringify({ cols: 16, readLength: 512 }));
/// producer.start(Date.now());
///
/// setInterval(() => {
///   for (const packet of producer.tick(Date.now())) {
///     port.postMessage(packet);
///   }
/// }, 50);
/// ```
#[wasm_bindgen]
pub struct MemoryGridProducer {
    viewer: NetworkedGrid<JsOracle>,
}

#[wasm_bindgen]
impl MemoryGridProducer {
    /// # 引数
    /// - `oracle`: `query(address)` / `read(address, length)` を持つオブジェクト
    /// - `config_json`: `ViewerConfig` の JSON（例: `{"cols":16,"minAddress":"0x1000"}`）
    ///
    /// # エラー
    /// - oracle にメソッドがない
    /// - 設定の解析・検証に失敗
    #[wasm_bindgen(constructor)]
    pub fn new(oracle: JsValue, config_json: &str) -> Result<MemoryGridProducer, JsError> {
        let oracle = JsOracle::new(oracle)
            .map_err(|e| JsError::new(&e.as_string().unwrap_or_else(|| "invalid oracle".into())))?;
        let config = ViewerConfig::from_json(config_json).map_err(|e| JsError::new(&e.to_string()))?;
        let viewer = NetworkedGrid::networked(oracle, &config).map_err(|e| JsError::new(&e.to_string()))?;
        tracing::debug!(cols = config.cols, cursor = config.cursor, "producer created");
        Ok(MemoryGridProducer { viewer })
    }

    /// カーソルを移動する（読み出しはデバウンス後の `tick` で）
    ///
    /// # 戻り値
    /// 追い出しで生じた削除パケット
    #[wasm_bindgen(js_name = "setCursor")]
    pub fn set_cursor(&mut self, address: u64, now_ms: f64) -> js_sys::Array {
        self.viewer.set_cursor(address, now_ms as u64);
        self.drain_packets()
    }

    #[wasm_bindgen(js_name = "setReadLength")]
    pub fn set_read_length(&mut self, length: u32) {
        self.viewer.set_read_length(length);
    }

    /// 部分的な設定変更（`{"cursor":"0x...","readLength":..,"debounceMs":..,"autoRefreshMs":..}`）
    pub fn update(&mut self, update_json: &str, now_ms: f64) -> Result<js_sys::Array, JsError> {
        let update = ViewerUpdate::from_json(update_json).map_err(|e| JsError::new(&e.to_string()))?;
        self.viewer.update(&update, now_ms as u64);
        Ok(self.drain_packets())
    }

    pub fn start(&mut self, now_ms: f64) {
        self.viewer.start(now_ms as u64);
    }

    pub fn stop(&mut self) {
        self.viewer.stop();
    }

    /// デバウンスを無視して即座に読み、パケットを返す
    pub fn refresh(&mut self) -> js_sys::Array {
        self.viewer.refresh();
        self.drain_packets()
    }

    /// タイマーを進め、確定したパケットを返す
    ///
    /// ホストの `setInterval` から呼び出す。`nextDeadline()` までは呼ばなくてよい。
    ///
    /// # 引数
    /// - `now_ms`: 現在時刻（`Date.now()`）
    ///
    /// # 戻り値
    /// 受信側に送るパケットの配列（変化がなければ空）
    pub fn tick(&mut self, now_ms: f64) -> js_sys::Array {
        self.viewer.tick(now_ms as u64);
        self.drain_packets()
    }

    /// 次に `tick` を呼ぶべき時刻（タイマーがなければ `undefined`）
    #[wasm_bindgen(js_name = "nextDeadline")]
    pub fn next_deadline(&self) -> Option<f64> {
        self.viewer.next_deadline().map(|ms| ms as f64)
    }

    #[wasm_bindgen(getter)]
    pub fn cursor(&self) -> u64 {
        self.viewer.cursor()
    }

    #[wasm_bindgen(getter)]
    pub fn cols(&self) -> u16 {
        self.viewer.grid().cols()
    }

    /// 統計情報を JSON 文字列で返す
    #[wasm_bindgen(js_name = "getStats")]
    pub fn get_stats(&self) -> Result<String, JsError> {
        let viewer = self.viewer.stats();
        let encoder = self.viewer.encoder_stats();
        let cache = self.viewer.cache();
        let stats = ProducerStats {
            cursor: format!("{:#x}", self.viewer.cursor()),
            read_length: self.viewer.read_length(),
            running: self.viewer.is_running(),
            passes: viewer.passes,
            reads: viewer.reads,
            failed_reads: viewer.failed_reads,
            skipped_regions: viewer.skipped_regions,
            bytes_read: viewer.bytes_read,
            cached_segments: cache.len(),
            cached_bytes: cache.cached_bytes(),
            cached_rows: self.viewer.grid().cached_row_count(),
            packets: encoder.packets,
            runs: encoder.runs,
            removals: encoder.removals,
            packet_bytes: encoder.bytes,
        };
        serde_json::to_string(&stats).map_err(|e| JsError::new(&e.to_string()))
    }
}

impl MemoryGridProducer {
    fn drain_packets(&mut self) -> js_sys::Array {
        let result = js_sys::Array::new();
        for packet in self.viewer.take_packets() {
            let arr = Uint8Array::new_with_length(packet.len() as u32);
            arr.copy_from(&packet);
            result.push(&arr);
        }
        result
    }
}
