//! MemoryViewer 状態機械
//!
//! カーソル位置の `read_length` バイトを対象プロセスから読み、`SegmentCache` に反映する。
//!
//! ## 状態遷移
//!
//! ```text
//!            set_cursor                 debounce 期限 (tick)
//!   Idle ───────────────→ Debouncing ───────────────────→ 読み出しパス ──→ Idle
//!    │                        ↑ set_cursor で再設定             ↑
//!    └──── 自動リフレッシュ (tick, Debouncing 中はスキップ) ────┘
//!    └──── refresh()（デバウンスを無視して即時） ──────────────┘
//! ```
//!
//! 読み出しパスは `tick` / `refresh` の中で同期的に完結するので、状態としては現れない。
//!
//! 時刻はホストが `tick(now_ms)` で与える（内部にスレッドやタイマーはない）。

use memview_cache::{CacheHook, CursorWindow, MergeOnly, SegmentCache, SegmentView};
use memview_region::{ProtectionTable, Region, RegionOracle};
use tracing::{debug, trace, warn};

use crate::config::{ConfigError, ViewerConfig, ViewerUpdate};
use crate::scheduler::{Scheduler, TimerToken};

/// 読み出しパスで連続してスキップできるアクセス不能リージョン数の上限
///
/// 読めるリージョンを 1 つ読むたびに数え直す。
pub const MAX_REGION_CHAIN: usize = 256;

/// viewer の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Idle,
    /// カーソル移動後、デバウンス期限待ち
    Debouncing,
}

/// 読み出しの統計情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerStats {
    /// 実行した読み出しパス数
    pub passes: u64,
    /// 成功した部分読み出し数
    pub reads: u64,
    /// 失敗した部分読み出し数
    pub failed_reads: u64,
    /// アクセス不能でスキップしたリージョン数
    pub skipped_regions: u64,
    /// 読み出した総バイト数
    pub bytes_read: u64,
}

/// メモリビューア
///
/// - `O`: 対象プロセスへの問い合わせ・読み出し
/// - `H`: 読み出し結果をキャッシュに流し込むフック（差分検出など）
#[derive(Debug)]
pub struct MemoryViewer<O, H = MergeOnly> {
    oracle: O,
    hook: H,
    cache: SegmentCache,
    table: ProtectionTable,
    window: CursorWindow,
    debounce_ms: u64,
    auto_refresh_ms: u64,
    scheduler: Scheduler,
    debounce_timer: Option<TimerToken>,
    refresh_timer: Option<TimerToken>,
    state: ViewerState,
    /// 直近のパスでカーソル位置に観測したリージョン
    region: Option<Region>,
    stats: ViewerStats,
}

impl<O: RegionOracle> MemoryViewer<O, MergeOnly> {
    /// キャッシュへのマージだけを行う viewer を作る
    pub fn new(oracle: O, config: &ViewerConfig) -> Result<Self, ConfigError> {
        Self::with_hook(oracle, config, MergeOnly)
    }
}

impl<O: RegionOracle, H: CacheHook> MemoryViewer<O, H> {
    /// # エラー
    /// 設定が不正な場合（`ViewerConfig::validate`）
    pub fn with_hook(oracle: O, config: &ViewerConfig, hook: H) -> Result<Self, ConfigError> {
        config.validate()?;
        let max_address = config.effective_max_address()?;
        let window = CursorWindow::new(config.cursor, config.read_length)
            .with_cache_distance(config.cache_distance)
            .with_bounds(config.min_address, max_address);

        Ok(MemoryViewer {
            oracle,
            hook,
            cache: SegmentCache::new(),
            table: ProtectionTable::default(),
            window,
            debounce_ms: config.debounce_ms,
            auto_refresh_ms: config.auto_refresh_ms,
            scheduler: Scheduler::new(),
            debounce_timer: None,
            refresh_timer: None,
            state: ViewerState::Idle,
            region: None,
            stats: ViewerStats::default(),
        })
    }

    /// 保護属性の解釈テーブルを差し替える（既定は Windows `PAGE_*`）
    pub fn with_protection_table(mut self, table: ProtectionTable) -> Self {
        self.table = table;
        self
    }

    // ===== 操作 =====

    /// カーソルを移動する
    ///
    /// 遠くなったキャッシュはその場で追い出し（1 バッチとしてコミット）、
    /// 実際の読み出しは `debounce_ms` 後の `tick` で行う。同じアドレスなら何もしない。
    pub fn set_cursor(&mut self, address: u64, now_ms: u64) {
        if address == self.window.cursor {
            return;
        }
        self.window.cursor = address;

        let dropped = self.cache.evict_outside_window(&self.window);
        if !dropped.is_empty() {
            self.hook.on_evicted(&self.cache, &dropped);
        }
        self.hook.on_batch_end();

        if let Some(token) = self.debounce_timer.take() {
            self.scheduler.cancel(token);
        }
        self.debounce_timer = Some(self.scheduler.schedule_once(now_ms, self.debounce_ms));
        self.state = ViewerState::Debouncing;

        debug!(cursor = address, evicted = dropped.len(), "cursor moved");
    }

    /// 読み出し長を変える（読み出しは次のパスで反映）
    pub fn set_read_length(&mut self, length: u32) {
        self.window.read_length = length;
    }

    /// デバウンス時間を変える（次の `set_cursor` から有効）
    pub fn set_debounce(&mut self, ms: u64) {
        self.debounce_ms = ms;
    }

    /// 自動リフレッシュ間隔を変える
    ///
    /// 0 なら止める。動作中なら新しい間隔で張り直す。止まっていれば開始はしない。
    pub fn set_auto_refresh(&mut self, ms: u64, now_ms: u64) {
        self.auto_refresh_ms = ms;
        if ms == 0 {
            self.cancel_refresh();
            return;
        }
        if self.refresh_timer.is_some() {
            self.cancel_refresh();
            self.start(now_ms);
        }
    }

    /// 自動リフレッシュを開始する（間隔 0 または動作中なら何もしない）
    pub fn start(&mut self, now_ms: u64) {
        if self.auto_refresh_ms == 0 || self.refresh_timer.is_some() {
            return;
        }
        self.refresh_timer = Some(self.scheduler.schedule_interval(now_ms, self.auto_refresh_ms));
        debug!(interval_ms = self.auto_refresh_ms, "auto refresh started");
    }

    /// すべてのタイマーを止める
    pub fn stop(&mut self) {
        if let Some(token) = self.debounce_timer.take() {
            self.scheduler.cancel(token);
        }
        self.cancel_refresh();
        self.state = ViewerState::Idle;
    }

    pub fn is_running(&self) -> bool {
        self.refresh_timer.is_some()
    }

    /// デバウンスを無視して即座に読む
    pub fn refresh(&mut self) {
        self.do_read();
    }

    /// 期限が来たタイマーを処理する
    ///
    /// デバウンスと自動リフレッシュが同じ tick で重なった場合、読み出しは 1 回にまとめる。
    ///
    /// # 戻り値
    /// 実行した読み出しパス数（0 または 1）
    pub fn tick(&mut self, now_ms: u64) -> usize {
        let mut passes = 0;
        for token in self.scheduler.poll(now_ms) {
            if Some(token) == self.debounce_timer {
                self.debounce_timer = None;
                self.state = ViewerState::Idle;
                if passes == 0 {
                    self.do_read();
                    passes += 1;
                }
            } else if Some(token) == self.refresh_timer {
                if self.debounce_timer.is_some() {
                    trace!("auto refresh skipped while debouncing");
                    continue;
                }
                if passes == 0 {
                    self.do_read();
                    passes += 1;
                }
            }
        }
        passes
    }

    /// 部分的な設定変更を反映する
    pub fn update(&mut self, update: &ViewerUpdate, now_ms: u64) {
        if let Some(cursor) = update.cursor {
            self.set_cursor(cursor, now_ms);
        }
        if let Some(length) = update.read_length {
            self.set_read_length(length);
        }
        if let Some(ms) = update.debounce_ms {
            self.set_debounce(ms);
        }
        if let Some(ms) = update.auto_refresh_ms {
            self.set_auto_refresh(ms, now_ms);
            self.start(now_ms);
        }
    }

    // ===== 参照 =====

    /// キャッシュから `[address, address + length)` を読む（新しい読み出しはしない）
    pub fn read(&self, address: u64, length: u64) -> Vec<SegmentView<'_>> {
        self.cache.read(address, length)
    }

    /// 直近のパスでカーソル位置に観測したリージョン
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn cursor(&self) -> u64 {
        self.window.cursor
    }

    pub fn read_length(&self) -> u32 {
        self.window.read_length
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    pub fn auto_refresh_ms(&self) -> u64 {
        self.auto_refresh_ms
    }

    pub fn window(&self) -> &CursorWindow {
        &self.window
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    /// 次にタイマーが発火する時刻（ホストが次の tick を決めるのに使う）
    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    pub fn stats(&self) -> ViewerStats {
        self.stats
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn protection_table(&self) -> &ProtectionTable {
        &self.table
    }

    // ===== Private メソッド =====

    fn cancel_refresh(&mut self) {
        if let Some(token) = self.refresh_timer.take() {
            self.scheduler.cancel(token);
            debug!("auto refresh stopped");
        }
    }

    /// 読み出しパス
    ///
    /// カーソル位置のリージョン問い合わせに失敗したらパス全体を中止する。
    fn do_read(&mut self) {
        self.stats.passes += 1;

        match self.oracle.query(self.window.cursor) {
            Ok(region) => {
                self.region = Some(region);
                self.read_regions();
            }
            Err(e) => {
                warn!(cursor = self.window.cursor, error = %e, "region query failed, read pass aborted");
            }
        }

        self.hook.on_batch_end();
        self.state = if self.debounce_timer.is_some() {
            ViewerState::Debouncing
        } else {
            ViewerState::Idle
        };
    }

    /// 要求範囲をリージョン境界で分割して順に読む
    ///
    /// ```text
    /// request:   [cursor ─────────────────────────────── cursor + L)
    /// regions:   [ RW ......][ NOACCESS ][ RW ......................]
    /// reads:     [──────────]            [───────────────]
    /// ```
    fn read_regions(&mut self) {
        let Some(request) = self.window.request_range() else {
            return;
        };
        let mut address = request.start;
        let mut skipped_in_row = 0;

        loop {
            let region = match self.oracle.query(address) {
                Ok(region) => region,
                Err(e) => {
                    warn!(address, error = %e, "region query failed, rest of request skipped");
                    return;
                }
            };
            let region_end = region.end();
            if region_end <= address {
                warn!(address, base = region.base, size = region.size, "region does not cover the address");
                return;
            }

            if region.can_access(&self.table) {
                if self.read_one(address, request.end, region) {
                    skipped_in_row = 0;
                }
            } else {
                self.skip_region(region);
                skipped_in_row += 1;
            }

            if request.end <= region_end || region_end >= self.window.max_address {
                return;
            }
            if skipped_in_row >= MAX_REGION_CHAIN {
                warn!(
                    limit = MAX_REGION_CHAIN,
                    address = region_end,
                    cursor = self.window.cursor,
                    "too many inaccessible regions in a row, rest of request skipped"
                );
                return;
            }
            address = region_end;
        }
    }

    /// 1 リージョン内の部分読み出し
    ///
    /// # 戻り値
    /// 読み出しに成功したら `true`
    fn read_one(&mut self, address: u64, request_end: u64, region: Region) -> bool {
        let start = address.max(region.base);
        let end = region.end().min(request_end);
        if end <= start {
            return false;
        }
        let Ok(length) = u32::try_from(end - start) else {
            return false;
        };

        match self.oracle.read(start, length) {
            Ok(mut data) => {
                data.truncate(length as usize);
                self.stats.reads += 1;
                self.stats.bytes_read += data.len() as u64;
                trace!(address = start, length = data.len(), protection = region.protection, "read");
                if let Some(result) = self.cache.prepare(start, data, region) {
                    self.hook.on_read(&mut self.cache, result, &self.window);
                }
                true
            }
            Err(e) => {
                self.stats.failed_reads += 1;
                warn!(address = start, length, error = %e, "read failed, skipped");
                false
            }
        }
    }

    /// アクセス不能なリージョン: 読まずに、キャッシュに残っていればその範囲を捨てる
    fn skip_region(&mut self, region: Region) {
        self.stats.skipped_regions += 1;
        let dropped = self.cache.evict_range(region.base, region.end());
        trace!(
            base = region.base,
            size = region.size,
            access = %region.access(&self.table),
            dropped = dropped.len(),
            "inaccessible region skipped"
        );
        if !dropped.is_empty() {
            self.hook.on_evicted(&self.cache, &dropped);
        }
    }
}
