use chrono::{DateTime, Duration, Local, NaiveDate, Timelike};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Source of "seconds in foreground today" for a package
pub trait UsageOracle: Send + Sync {
    fn usage_seconds_today(&self, package: &str) -> u64;

    /// Most recently foregrounded app, kept across screen-off
    fn last_foreground(&self) -> Option<String>;
}

struct LedgerInner {
    date: NaiveDate,
    totals: HashMap<String, u64>,
    current: Option<(String, DateTime<Local>)>,
    last: Option<String>,
}

/// Usage oracle fed by foreground reports.
///
/// Time between two reports is credited to the app that was in front.
/// Totals reset when the local date changes.
pub struct ForegroundLedger {
    inner: Mutex<LedgerInner>,
}

impl ForegroundLedger {
    pub fn new() -> Self {
        Self::starting_at(Local::now())
    }

    fn starting_at(now: DateTime<Local>) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                date: now.date_naive(),
                totals: HashMap::new(),
                current: None,
                last: None,
            }),
        }
    }

    /// An app came to the foreground
    pub fn record_foreground(&self, package: &str) {
        self.record_foreground_at(package, Local::now());
    }

    /// Nothing is in the foreground any more (screen off)
    pub fn record_idle(&self) {
        self.record_idle_at(Local::now());
    }

    fn record_foreground_at(&self, package: &str, now: DateTime<Local>) {
        let mut inner = self.inner.lock();
        close_span(&mut inner, now);
        inner.current = Some((package.to_string(), now));
        inner.last = Some(package.to_string());
    }

    fn record_idle_at(&self, now: DateTime<Local>) {
        let mut inner = self.inner.lock();
        close_span(&mut inner, now);
    }

    fn usage_at(&self, package: &str, now: DateTime<Local>) -> u64 {
        let mut inner = self.inner.lock();
        roll_over(&mut inner, now);

        let closed = inner.totals.get(package).copied().unwrap_or(0);
        let open = match &inner.current {
            Some((current, start)) if current == package => span_seconds(*start, now),
            _ => 0,
        };
        closed + open
    }
}

impl Default for ForegroundLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageOracle for ForegroundLedger {
    fn usage_seconds_today(&self, package: &str) -> u64 {
        self.usage_at(package, Local::now())
    }

    fn last_foreground(&self) -> Option<String> {
        self.inner.lock().last.clone()
    }
}

fn close_span(inner: &mut LedgerInner, now: DateTime<Local>) {
    roll_over(inner, now);
    if let Some((package, start)) = inner.current.take() {
        *inner.totals.entry(package).or_insert(0) += span_seconds(start, now);
    }
}

/// Drop yesterday's totals and clip an open span to today's midnight
fn roll_over(inner: &mut LedgerInner, now: DateTime<Local>) {
    let today = now.date_naive();
    if inner.date == today {
        return;
    }

    inner.date = today;
    inner.totals.clear();

    let midnight = now - Duration::seconds(i64::from(now.num_seconds_from_midnight()));
    if let Some((_, start)) = inner.current.as_mut() {
        if *start < midnight {
            *start = midnight;
        }
    }
}

fn span_seconds(start: DateTime<Local>, end: DateTime<Local>) -> u64 {
    u64::try_from((end - start).num_seconds()).unwrap_or(0)
}
