//! In-memory market-data client with scripted responses.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use etftrack_types::{DateRange, FetchError, Instrument, RawRecord};

use crate::MarketDataClient;

/// A scripted reply to one fetch call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Return these records (filtered to the requested range).
    Records(Vec<RawRecord>),
    /// Fail with this error.
    Fail(FetchError),
    /// Wait, then reply.
    Delay(Duration, Box<Reply>),
    /// Never reply.
    Hang,
}

/// A recorded fetch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    /// Instrument code.
    pub code: String,
    /// Requested range.
    pub range: DateRange,
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    history: HashMap<String, Vec<RawRecord>>,
    calls: Vec<FetchCall>,
    month_delay: Duration,
}

/// Market-data client that replays scripted replies.
///
/// Each instrument has a queue of one-shot replies. When the queue is empty
/// the client serves the instrument's standing history, filtered to the
/// requested range, or an empty result if none was set.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    script: Mutex<Script>,
}

impl ScriptedClient {
    /// Creates a client with no replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the standing history served for `code`.
    #[must_use]
    pub fn with_history(self, code: &str, records: Vec<RawRecord>) -> Self {
        self.lock().history.insert(code.to_string(), records);
        self
    }

    /// Makes every call wait `delay` per calendar month in the requested
    /// range before replying, like a client paced one request per month.
    #[must_use]
    pub fn with_month_delay(self, delay: Duration) -> Self {
        self.lock().month_delay = delay;
        self
    }

    /// Queues a one-shot reply for `code`.
    #[must_use]
    pub fn with_reply(self, code: &str, reply: Reply) -> Self {
        self.push_reply(code, reply);
        self
    }

    /// Queues a one-shot reply for `code` on a shared client.
    pub fn push_reply(&self, code: &str, reply: Reply) {
        self.lock()
            .queued
            .entry(code.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Returns every fetch call made so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<FetchCall> {
        self.lock().calls.clone()
    }

    /// Returns the fetch calls made for one instrument.
    #[must_use]
    pub fn calls_for(&self, code: &str) -> Vec<FetchCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.code == code)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MarketDataClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(
        &self,
        instrument: &Instrument,
        range: DateRange,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let code = instrument.code();
        let (mut reply, pacing) = {
            let mut script = self.lock();
            script.calls.push(FetchCall {
                code: code.to_string(),
                range,
            });
            let reply = match script.queued.get_mut(code).and_then(VecDeque::pop_front) {
                Some(reply) => reply,
                None => Reply::Records(script.history.get(code).cloned().unwrap_or_default()),
            };
            let months = u32::try_from(range.months().count()).unwrap_or(u32::MAX);
            (reply, script.month_delay.saturating_mul(months))
        };

        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
        loop {
            match reply {
                Reply::Records(records) => {
                    return Ok(records
                        .into_iter()
                        .filter(|r| range.contains(r.date))
                        .collect());
                }
                Reply::Fail(error) => return Err(error),
                Reply::Delay(delay, next) => {
                    tokio::time::sleep(delay).await;
                    reply = *next;
                }
                Reply::Hang => return std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(d: u32) -> RawRecord {
        RawRecord::complete(date(d), 1.0, 1.0, 1.0, 1.0, 100.0)
    }

    #[tokio::test]
    async fn test_history_filtered_to_range() {
        let client = ScriptedClient::new().with_history("0050", vec![record(2), record(3), record(4)]);
        let range = DateRange::new(date(3), date(10)).unwrap();

        let records = client
            .fetch(&Instrument::new("0050", "x"), range)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(client.calls_for("0050"), vec![FetchCall { code: "0050".into(), range }]);
    }

    #[tokio::test]
    async fn test_queued_replies_take_precedence() {
        let client = ScriptedClient::new()
            .with_history("0050", vec![record(2)])
            .with_reply("0050", Reply::Fail(FetchError::transient("reset")));
        let instrument = Instrument::new("0050", "x");
        let range = DateRange::single_day(date(2));

        assert!(client.fetch(&instrument, range).await.is_err());
        assert_eq!(client.fetch(&instrument, range).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_reply() {
        let client = ScriptedClient::new().with_reply(
            "0056",
            Reply::Delay(Duration::from_secs(5), Box::new(Reply::Records(vec![record(2)]))),
        );
        let started = tokio::time::Instant::now();

        let records = client
            .fetch(&Instrument::new("0056", "x"), DateRange::single_day(date(2)))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_month_delay_scales_with_range() {
        let client = ScriptedClient::new().with_month_delay(Duration::from_secs(2));
        let range = DateRange::new(date(2), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()).unwrap();
        let started = tokio::time::Instant::now();

        client.fetch(&Instrument::new("0050", "x"), range).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(7));
    }
}
