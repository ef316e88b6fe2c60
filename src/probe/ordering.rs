//! 探针集合排序
//!
//! 对所有探针施加确定的严重程度顺序，最需要关注的排在最前

use crate::probe::record::Record;
use crate::probe::state::Probe;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

/// 探针在某一时刻的只读快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSnapshot {
    /// 探针名称
    pub name: String,
    /// 探针描述
    pub description: String,
    /// 是否被禁用
    pub disabled: bool,
    /// 静默截止时间
    pub silenced_until: Option<DateTime<Utc>>,
    /// 快照时是否处于静默期
    pub silenced: bool,
    /// 当前分数
    pub score: u64,
    /// 是否告警中
    pub alerting: bool,
    /// 上次告警时间
    pub last_alert: Option<DateTime<Utc>>,
    /// 历史记录数量
    pub history_len: usize,
    /// 探测间隔（秒）
    pub interval_seconds: u64,
    /// 最近一次探测记录
    pub last_record: Option<Record>,
}

impl ProbeSnapshot {
    /// 严重程度比较，`Less` 表示更需要关注
    ///
    /// 依次比较：未禁用优先；静默剩余时间短的优先（未静默视为最早）；
    /// 分数高的优先；告警中的优先；上次告警更早（或从未告警）的优先；
    /// 历史更长的优先；最后按名称、描述的字典序。
    pub fn severity_cmp(&self, other: &Self) -> Ordering {
        self.disabled
            .cmp(&other.disabled)
            .then_with(|| self.silenced_until.cmp(&other.silenced_until))
            .then_with(|| other.score.cmp(&self.score))
            .then_with(|| other.alerting.cmp(&self.alerting))
            .then_with(|| self.last_alert.cmp(&other.last_alert))
            .then_with(|| other.history_len.cmp(&self.history_len))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.description.cmp(&other.description))
    }
}

impl Probe {
    /// 读取当前状态的快照
    ///
    /// 状态和历史分别加锁读取，快照不保证与正在进行的探测周期原子一致。
    pub fn snapshot(&self) -> ProbeSnapshot {
        let now = self.clock().now();
        let (disabled, silenced_until, score, alerting, last_alert) = {
            let state = self.lock_state();
            (
                state.disabled,
                state.silenced_until,
                state.score,
                state.alerting,
                state.last_alert,
            )
        };
        let records = self.records();

        ProbeSnapshot {
            name: self.name().to_string(),
            description: self.description().to_string(),
            disabled,
            silenced_until,
            silenced: silenced_until.is_some_and(|until| until > now),
            score,
            alerting,
            last_alert,
            history_len: records.len(),
            interval_seconds: self.interval().as_secs(),
            last_record: records.last().cloned(),
        }
    }
}

/// 探针集合，调用 `sort` 之前不保证有序
#[derive(Debug, Clone, Default)]
pub struct ProbeSet {
    probes: Vec<Arc<Probe>>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, probe: Arc<Probe>) {
        self.probes.push(probe);
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Probe>> {
        self.probes.iter()
    }

    /// 按名称查找
    pub fn get(&self, name: &str) -> Option<&Arc<Probe>> {
        self.probes.iter().find(|p| p.name() == name)
    }

    /// 按严重程度排序
    ///
    /// 每个探针只读取一次快照，排序期间状态变化不会破坏比较的一致性。
    pub fn sort(&mut self) {
        let mut keyed: Vec<(ProbeSnapshot, Arc<Probe>)> = self
            .probes
            .drain(..)
            .map(|probe| (probe.snapshot(), probe))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| a.severity_cmp(b));
        self.probes = keyed.into_iter().map(|(_, probe)| probe).collect();
    }

    /// 当前顺序下的快照
    pub fn snapshots(&self) -> Vec<ProbeSnapshot> {
        self.probes.iter().map(|p| p.snapshot()).collect()
    }

    /// 按严重程度排序后的快照
    pub fn sorted_snapshots(&self) -> Vec<ProbeSnapshot> {
        let mut snapshots = self.snapshots();
        snapshots.sort_by(ProbeSnapshot::severity_cmp);
        snapshots
    }

    /// 当前处于静默期的探针
    pub fn silenced(&self) -> ProbeSet {
        self.probes
            .iter()
            .filter(|p| p.is_silenced())
            .cloned()
            .collect()
    }
}

impl FromIterator<Arc<Probe>> for ProbeSet {
    fn from_iter<I: IntoIterator<Item = Arc<Probe>>>(iter: I) -> Self {
        Self {
            probes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ProbeSet {
    type Item = &'a Arc<Probe>;
    type IntoIter = std::slice::Iter<'a, Arc<Probe>>;

    fn into_iter(self) -> Self::IntoIter {
        self.probes.iter()
    }
}

/// 逐个比较快照和完整历史
impl PartialEq for ProbeSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.probes.iter().zip(&other.probes).all(|(a, b)| {
                a.snapshot() == b.snapshot()
                    && a.failure_penalty() == b.failure_penalty()
                    && a.records() == b.records()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlertError;
    use crate::probe::check::Check;
    use crate::probe::outcome::Outcome;
    use crate::probe::record::RecordLog;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use proptest::prelude::*;

    struct NullCheck;

    #[async_trait]
    impl Check for NullCheck {
        async fn probe(&self) -> Outcome {
            Outcome::passed()
        }

        async fn alert(
            &self,
            _: &str,
            _: &str,
            _: u64,
            _: &RecordLog,
            _: DateTime<Utc>,
        ) -> Result<(), AlertError> {
            Ok(())
        }
    }

    fn base(name: &str) -> ProbeSnapshot {
        ProbeSnapshot {
            name: name.to_string(),
            description: String::new(),
            disabled: false,
            silenced_until: None,
            silenced: false,
            score: 0,
            alerting: false,
            last_alert: None,
            history_len: 0,
            interval_seconds: 60,
            last_record: None,
        }
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1998, 11, 19, 15, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    #[test]
    fn test_higher_score_first() {
        let a = ProbeSnapshot { score: 51, ..base("b") };
        let b = ProbeSnapshot { score: 50, ..base("a") };
        assert_eq!(a.severity_cmp(&b), Ordering::Less);

        let mut all = vec![b.clone(), a.clone()];
        all.sort_by(ProbeSnapshot::severity_cmp);
        assert_eq!(all, vec![a, b]);
    }

    #[test]
    fn test_disabled_always_last() {
        let disabled = ProbeSnapshot {
            disabled: true,
            score: 1000,
            alerting: true,
            ..base("a")
        };
        assert_eq!(disabled.severity_cmp(&base("z")), Ordering::Greater);
    }

    #[test]
    fn test_shorter_silence_first() {
        let unsilenced = ProbeSnapshot { score: 0, ..base("z") };
        let short = ProbeSnapshot {
            silenced_until: Some(at(10)),
            score: 500,
            ..base("a")
        };
        let long = ProbeSnapshot {
            silenced_until: Some(at(60)),
            ..base("a")
        };
        assert_eq!(unsilenced.severity_cmp(&short), Ordering::Less);
        assert_eq!(short.severity_cmp(&long), Ordering::Less);
    }

    #[test]
    fn test_alerting_first_at_equal_score() {
        let alerting = ProbeSnapshot {
            score: 200,
            alerting: true,
            ..base("z")
        };
        let quiet = ProbeSnapshot { score: 200, ..base("a") };
        assert_eq!(alerting.severity_cmp(&quiet), Ordering::Less);
    }

    #[test]
    fn test_older_alert_first() {
        let never = base("z");
        let old = ProbeSnapshot {
            last_alert: Some(at(0)),
            ..base("y")
        };
        let fresh = ProbeSnapshot {
            last_alert: Some(at(30)),
            ..base("a")
        };
        assert_eq!(never.severity_cmp(&old), Ordering::Less);
        assert_eq!(old.severity_cmp(&fresh), Ordering::Less);
    }

    #[test]
    fn test_longer_history_then_name_then_description() {
        let long = ProbeSnapshot {
            history_len: 5,
            ..base("z")
        };
        let short = ProbeSnapshot {
            history_len: 1,
            ..base("a")
        };
        assert_eq!(long.severity_cmp(&short), Ordering::Less);
        assert_eq!(base("a").severity_cmp(&base("b")), Ordering::Less);

        let d1 = ProbeSnapshot {
            description: "first".into(),
            ..base("a")
        };
        let d2 = ProbeSnapshot {
            description: "second".into(),
            ..base("a")
        };
        assert_eq!(d1.severity_cmp(&d2), Ordering::Less);
        assert_eq!(d1.severity_cmp(&d1.clone()), Ordering::Equal);
    }

    #[tokio::test]
    async fn test_probe_set_sort() {
        let low = Arc::new(Probe::new(Arc::new(NullCheck), "low", "", []).unwrap());
        let high = Arc::new(Probe::new(Arc::new(NullCheck), "high", "", []).unwrap());
        for _ in 0..5 {
            high.handle_outcome(Outcome::failed_with("x"));
        }
        low.handle_outcome(Outcome::failed_with("x"));

        let mut set: ProbeSet = vec![Arc::clone(&low), Arc::clone(&high)].into_iter().collect();
        set.sort();
        let names: Vec<&str> = set.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["high", "low"]);

        let again = set.clone();
        set.sort();
        assert_eq!(set, again);
        assert_eq!(high.snapshot().severity_cmp(&low.snapshot()), Ordering::Less);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sort_while_scores_change() {
        let probes: Vec<Arc<Probe>> = (0..100)
            .map(|i| Arc::new(Probe::new(Arc::new(NullCheck), format!("p{i}"), "", []).unwrap()))
            .collect();
        let set: ProbeSet = probes.iter().cloned().collect();

        let writer = tokio::spawn(async move {
            for round in 0..2_000usize {
                let outcome = if round % 3 == 0 {
                    Outcome::passed()
                } else {
                    Outcome::failed_with("x")
                };
                probes[round % probes.len()].handle_outcome(outcome);
                tokio::task::yield_now().await;
            }
        });

        for _ in 0..50 {
            let mut sorted = set.clone();
            sorted.sort();
            assert_eq!(sorted.len(), 100);
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_silenced_subset() {
        let quiet = Arc::new(Probe::new(Arc::new(NullCheck), "quiet", "", []).unwrap());
        let loud = Arc::new(Probe::new(Arc::new(NullCheck), "loud", "", []).unwrap());
        quiet.silence(Utc::now() + chrono::Duration::hours(1));

        let set: ProbeSet = vec![quiet, loud].into_iter().collect();
        let silenced = set.silenced();
        assert_eq!(silenced.len(), 1);
        assert!(silenced.get("quiet").is_some());
    }

    fn arb_snapshot() -> impl Strategy<Value = ProbeSnapshot> {
        (
            any::<bool>(),
            proptest::option::of(0i64..4),
            0u64..4,
            any::<bool>(),
            proptest::option::of(0i64..4),
            0usize..3,
            "[ab]",
            "[xy]",
        )
            .prop_map(
                |(disabled, silenced, score, alerting, last_alert, history_len, name, description)| {
                    ProbeSnapshot {
                        disabled,
                        silenced_until: silenced.map(at),
                        score,
                        alerting,
                        last_alert: last_alert.map(at),
                        history_len,
                        description,
                        ..base(&name)
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_antisymmetric(a in arb_snapshot(), b in arb_snapshot()) {
            prop_assert_eq!(a.severity_cmp(&b), b.severity_cmp(&a).reverse());
        }

        #[test]
        fn prop_transitive(a in arb_snapshot(), b in arb_snapshot(), c in arb_snapshot()) {
            if a.severity_cmp(&b) == Ordering::Less && b.severity_cmp(&c) == Ordering::Less {
                prop_assert_eq!(a.severity_cmp(&c), Ordering::Less);
            }
            if a.severity_cmp(&b) == Ordering::Equal && b.severity_cmp(&c) == Ordering::Equal {
                prop_assert_eq!(a.severity_cmp(&c), Ordering::Equal);
            }
        }

        #[test]
        fn prop_sort_idempotent(mut all in proptest::collection::vec(arb_snapshot(), 0..16)) {
            all.sort_by(ProbeSnapshot::severity_cmp);
            let once = all.clone();
            all.sort_by(ProbeSnapshot::severity_cmp);
            prop_assert_eq!(once, all);
        }
    }
}
