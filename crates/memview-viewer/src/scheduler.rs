//! ホスト駆動のタイマーテーブル
//!
//! スレッドもイベントループも持たない。ホストが自前のタイマーから
//! `poll(now_ms)` を呼び、期限が来たトークンを受け取る。

use std::collections::BTreeMap;

/// タイマーの識別子（キャンセル用）
///
/// 一度キャンセル・発火（単発）したトークンは再利用されない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline_ms: u64,
    /// `Some` なら周期タイマー
    period_ms: Option<u64>,
}

/// タイマーテーブル
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    next_id: u64,
    timers: BTreeMap<TimerToken, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `now_ms + delay_ms` に 1 回だけ発火するタイマー
    pub fn schedule_once(&mut self, now_ms: u64, delay_ms: u64) -> TimerToken {
        self.insert(Timer {
            deadline_ms: now_ms.saturating_add(delay_ms),
            period_ms: None,
        })
    }

    /// `period_ms` ごとに発火するタイマー（最初の発火は `now_ms + period_ms`）
    ///
    /// 周期 0 は 1 ms として扱う。
    pub fn schedule_interval(&mut self, now_ms: u64, period_ms: u64) -> TimerToken {
        let period_ms = period_ms.max(1);
        self.insert(Timer {
            deadline_ms: now_ms.saturating_add(period_ms),
            period_ms: Some(period_ms),
        })
    }

    /// # 戻り値
    /// タイマーが有効だった場合 `true`
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        self.timers.remove(&token).is_some()
    }

    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.timers.contains_key(&token)
    }

    /// 期限が来たタイマーを期限順（同時刻なら登録順）に返す
    ///
    /// 単発タイマーは削除、周期タイマーは次の期限へ進める。
    /// tick が遅れて複数周期ぶん過ぎていても周期タイマーは 1 回だけ発火する。
    pub fn poll(&mut self, now_ms: u64) -> Vec<TimerToken> {
        let mut due: Vec<(u64, TimerToken)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline_ms <= now_ms)
            .map(|(&token, t)| (t.deadline_ms, token))
            .collect();
        due.sort_unstable();

        for &(_, token) in &due {
            let Some(timer) = self.timers.get_mut(&token) else {
                continue;
            };
            match timer.period_ms {
                None => {
                    self.timers.remove(&token);
                }
                Some(period) => {
                    let mut next = timer.deadline_ms.saturating_add(period);
                    if next <= now_ms {
                        next = now_ms.saturating_add(period);
                    }
                    timer.deadline_ms = next;
                }
            }
        }

        due.into_iter().map(|(_, token)| token).collect()
    }

    /// 最も近い期限（タイマーがなければ `None`）
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.values().map(|t| t.deadline_ms).min()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    fn insert(&mut self, timer: Timer) -> TimerToken {
        let token = TimerToken(self.next_id);
        self.next_id += 1;
        self.timers.insert(token, timer);
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_fires_once() {
        let mut s = Scheduler::new();
        let t = s.schedule_once(100, 400);
        assert!(s.poll(499).is_empty());
        assert_eq!(s.poll(500), vec![t]);
        assert!(s.poll(10_000).is_empty());
        assert!(!s.is_pending(t));
    }

    #[test]
    fn test_interval_reschedules() {
        let mut s = Scheduler::new();
        let t = s.schedule_interval(0, 1000);
        assert_eq!(s.poll(1000), vec![t]);
        assert_eq!(s.next_deadline(), Some(2000));

        // 遅れた tick でも 1 回だけ
        assert_eq!(s.poll(5500), vec![t]);
        assert_eq!(s.next_deadline(), Some(6500));
    }

    #[test]
    fn test_due_order_by_deadline() {
        let mut s = Scheduler::new();
        let late = s.schedule_once(0, 300);
        let early = s.schedule_once(0, 100);
        let same = s.schedule_once(0, 100);
        assert_eq!(s.poll(1000), vec![early, same, late]);
    }

    #[test]
    fn test_cancel_invalidates_token() {
        let mut s = Scheduler::new();
        let t = s.schedule_once(0, 10);
        assert!(s.cancel(t));
        assert!(!s.cancel(t));
        assert!(s.poll(100).is_empty());
        assert_eq!(s.next_deadline(), None);

        // トークンは再利用されない
        let t2 = s.schedule_once(0, 10);
        assert_ne!(t, t2);
    }
}
