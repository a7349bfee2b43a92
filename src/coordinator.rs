//! Feed coordinator: the single entry point that mutates engine state.
//!
//! Every reading flows through [`FeedCoordinator::ingest`]:
//! validate → classify → detect against the shard history → append to the
//! history → append events to the shared log → publish to subscribers.
//!
//! Each (location, parameter) shard has its own lock, so readings for
//! different shards are processed in parallel. The shared events log is
//! appended under its own mutex while the shard lock is still held, which
//! keeps per-shard event order identical to ingest order. Readers always get
//! copies, never references into live buffers.
//!
//! Nothing here awaits or touches I/O; locks are `std::sync` and are never
//! held across a suspension point.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::aggregator::{summarize, SummaryFilter};
use crate::event_log::EventLog;
use crate::history::{ShardHistory, ShardKey};
use crate::{
    classifier, detector, AnomalyEvent, EngineConfig, EngineError, LocationKey, Parameter,
    RawMeasurement, RawReading, Reading, SeverityTier, SummaryStats,
};

// ---

/// Buffered updates per subscriber before it starts lagging.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Result of ingesting one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub tier: SeverityTier,
    pub events: Vec<AnomalyEvent>,
}

/// Published to subscribers after every accepted reading.
#[derive(Debug, Clone, Serialize)]
pub struct FeedUpdate {
    pub reading: Reading,
    pub tier: SeverityTier,
    pub events: Vec<AnomalyEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Ingesting,
}

/// Selection for `current_readings`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadingFilter {
    pub parameter: Option<Parameter>,
    pub city: Option<String>,
    pub limit: Option<usize>,
}

impl ReadingFilter {
    fn admits(&self, reading: &Reading) -> bool {
        self.parameter.map_or(true, |p| p == reading.parameter)
            && self
                .city
                .as_ref()
                .map_or(true, |c| reading.city.eq_ignore_ascii_case(c.trim()))
    }
}

pub struct FeedCoordinator {
    config: Arc<EngineConfig>,
    shards: RwLock<HashMap<ShardKey, Arc<Mutex<ShardHistory>>>>,
    events: Mutex<EventLog>,
    readings: Mutex<VecDeque<Reading>>,
    in_flight: AtomicUsize,
    updates: broadcast::Sender<FeedUpdate>,
}

impl FeedCoordinator {
    pub fn new(config: EngineConfig) -> Self {
        // ---
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        FeedCoordinator {
            events: Mutex::new(EventLog::new(config.event_log_capacity)),
            readings: Mutex::new(VecDeque::with_capacity(config.reading_log_capacity)),
            config: Arc::new(config),
            shards: RwLock::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            updates,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate, classify and run detection for one reading, then record it.
    ///
    /// A rejected reading leaves every buffer untouched.
    #[tracing::instrument(
        level = "debug",
        skip(self, reading),
        fields(city = %reading.city, parameter = %reading.parameter)
    )]
    pub fn ingest(&self, reading: Reading) -> Result<IngestOutcome, EngineError> {
        // ---
        let tier = reading
            .validate()
            .and_then(|_| classifier::classify(&self.config, reading.parameter, reading.value))
            .inspect_err(|e| warn!("Rejected reading: {}", e))?;

        let _busy = InFlight::enter(&self.in_flight);

        let shard = self.shard(ShardKey::of(&reading))?;
        let mut history = shard.lock().map_err(poisoned)?;

        let detected = detector::detect(&self.config, &reading, &history)?;
        history.push(reading.clone());

        let events = self.events.lock().map_err(poisoned)?.append(detected);
        {
            let mut log = self.readings.lock().map_err(poisoned)?;
            log.push_back(reading.clone());
            while log.len() > self.config.reading_log_capacity {
                log.pop_front();
            }
        }
        drop(history);

        debug!(
            "Ingested {} = {} ({:?}), {} event(s)",
            reading.parameter,
            reading.value,
            tier,
            events.len()
        );

        // No subscribers is fine.
        let _ = self.updates.send(FeedUpdate {
            reading,
            tier,
            events: events.clone(),
        });

        Ok(IngestOutcome { tier, events })
    }

    /// Convert a wire reading and ingest it.
    pub fn ingest_raw(&self, raw: &RawReading) -> Result<IngestOutcome, EngineError> {
        let reading = raw
            .to_reading()
            .inspect_err(|e| warn!("Rejected raw reading: {}", e))?;
        self.ingest(reading)
    }

    /// Ingest every pollutant in a multi-pollutant document.
    ///
    /// One outcome per reported pollutant, in `Parameter::ALL` order; a
    /// rejected pollutant does not stop the rest. A document reporting no
    /// pollutant at all is itself an invalid reading.
    pub fn ingest_measurement(
        &self,
        measurement: &RawMeasurement,
    ) -> Result<Vec<(String, Result<IngestOutcome, EngineError>)>, EngineError> {
        // ---
        let parts = measurement.split();
        if parts.is_empty() {
            return Err(EngineError::InvalidReading(
                "measurement reports no pollutant".into(),
            ));
        }
        Ok(parts
            .into_iter()
            .map(|raw| {
                let outcome = self.ingest_raw(&raw);
                (raw.parameter, outcome)
            })
            .collect())
    }

    /// Summary over the trailing window ending at `now`.
    pub fn current_summary(
        &self,
        filter: &SummaryFilter,
        now: DateTime<Utc>,
    ) -> Result<SummaryStats, EngineError> {
        // ---
        let readings: Vec<Reading> = self
            .readings
            .lock()
            .map_err(poisoned)?
            .iter()
            .filter(|r| filter.admits_reading(r, now))
            .cloned()
            .collect();

        let events: Vec<AnomalyEvent> = self
            .events
            .lock()
            .map_err(poisoned)?
            .snapshot()
            .into_iter()
            .filter(|e| filter.admits_event(e, now))
            .collect();

        Ok(summarize(&readings, &events))
    }

    /// Up to `limit` recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<AnomalyEvent>, EngineError> {
        Ok(self.events.lock().map_err(poisoned)?.recent(limit))
    }

    /// Latest reading of every shard matching `filter`, newest first.
    pub fn current_readings(
        &self,
        filter: &ReadingFilter,
    ) -> Result<Vec<(Reading, SeverityTier)>, EngineError> {
        // ---
        let shards: Vec<Arc<Mutex<ShardHistory>>> = self
            .shards
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect();

        let mut latest = Vec::with_capacity(shards.len());
        for shard in shards {
            if let Some(reading) = shard.lock().map_err(poisoned)?.latest() {
                if filter.admits(reading) {
                    latest.push(reading.clone());
                }
            }
        }

        latest.sort_by(|a, b| {
            b.observed_at
                .cmp(&a.observed_at)
                .then_with(|| a.city.cmp(&b.city))
                .then_with(|| a.parameter.cmp(&b.parameter))
        });
        if let Some(limit) = filter.limit {
            latest.truncate(limit);
        }

        latest
            .into_iter()
            .map(|r| {
                let tier = classifier::classify(&self.config, r.parameter, r.value)?;
                Ok((r, tier))
            })
            .collect()
    }

    /// Copy of one shard's history, oldest first. Empty if the shard is unknown.
    pub fn shard_history(
        &self,
        location: LocationKey,
        parameter: Parameter,
    ) -> Result<Vec<Reading>, EngineError> {
        // ---
        let key = ShardKey {
            location,
            parameter,
        };
        let shard = self.shards.read().map_err(poisoned)?.get(&key).cloned();
        match shard {
            Some(shard) => Ok(shard.lock().map_err(poisoned)?.to_vec()),
            None => Ok(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.updates.subscribe()
    }

    pub fn state(&self) -> CoordinatorState {
        if self.in_flight.load(Ordering::Acquire) > 0 {
            CoordinatorState::Ingesting
        } else {
            CoordinatorState::Idle
        }
    }

    fn shard(&self, key: ShardKey) -> Result<Arc<Mutex<ShardHistory>>, EngineError> {
        // ---
        if let Some(shard) = self.shards.read().map_err(poisoned)?.get(&key) {
            return Ok(Arc::clone(shard));
        }

        let capacity = self.config.history_capacity;
        let mut shards = self.shards.write().map_err(poisoned)?;
        let shard = shards
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(ShardHistory::new(capacity))));
        Ok(Arc::clone(shard))
    }
}

fn poisoned<T>(_: PoisonError<T>) -> EngineError {
    EngineError::Internal("engine lock poisoned".into())
}

/// Marks an ingest as in flight for the guard's lifetime.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::thresholds::tests::test_config;
    use crate::{AnomalyKind, GeoPoint};
    use chrono::{Duration, TimeZone};
    use std::thread;

    const ANKARA: GeoPoint = GeoPoint {
        latitude: 39.9334,
        longitude: 32.8597,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 12, 0, 0).unwrap()
    }

    fn reading(location: GeoPoint, parameter: Parameter, minute: i64, value: f64) -> Reading {
        Reading {
            location,
            city: "Ankara".to_string(),
            parameter,
            value,
            observed_at: t0() + Duration::minutes(minute),
        }
    }

    fn kinds(events: &[AnomalyEvent]) -> Vec<AnomalyKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_rejected_reading_leaves_state_unchanged() {
        // ---
        let feed = FeedCoordinator::new(test_config());

        let err = feed
            .ingest(reading(ANKARA, Parameter::Pm25, 0, -5.0))
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidReading(_)));
        assert!(feed
            .shard_history(ANKARA.key(), Parameter::Pm25)
            .unwrap()
            .is_empty());
        assert!(feed.recent_events(10).unwrap().is_empty());
        assert!(feed
            .current_readings(&ReadingFilter::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_history_is_bounded_per_shard() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        for i in 0..8 {
            feed.ingest(reading(ANKARA, Parameter::O3, i * 15, 20.0 + i as f64))
                .unwrap();
        }

        let values: Vec<f64> = feed
            .shard_history(ANKARA.key(), Parameter::O3)
            .unwrap()
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![25.0, 26.0, 27.0]);
    }

    #[test]
    fn test_shards_are_independent() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        let izmir = GeoPoint {
            latitude: 38.4237,
            longitude: 27.1428,
        };

        feed.ingest(reading(ANKARA, Parameter::Pm25, 0, 20.0)).unwrap();
        // a first reading elsewhere is never sudden, whatever Ankara did
        let other = feed.ingest(reading(izmir, Parameter::Pm25, 15, 45.0)).unwrap();
        let other_param = feed.ingest(reading(ANKARA, Parameter::Pm10, 15, 45.0)).unwrap();

        assert!(other.events.is_empty());
        assert!(other_param.events.is_empty());
    }

    #[test]
    fn test_events_get_increasing_sequence_ids() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        feed.ingest(reading(ANKARA, Parameter::Pm25, 0, 20.0)).unwrap();
        let out = feed.ingest(reading(ANKARA, Parameter::Pm25, 15, 160.0)).unwrap();

        assert_eq!(
            kinds(&out.events),
            vec![
                AnomalyKind::WhoLimitExceeded,
                AnomalyKind::ThresholdExceeded,
                AnomalyKind::SuddenIncrease
            ]
        );
        let seqs: Vec<u64> = out.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let recent: Vec<u64> = feed.recent_events(2).unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(recent, vec![3, 2]);
    }

    #[test]
    fn test_event_log_is_bounded() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        for i in 0..12 {
            feed.ingest(reading(ANKARA, Parameter::Pm25, i * 15, 90.0)).unwrap();
        }

        let recent = feed.recent_events(100).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].seq, 12);
        assert_eq!(recent[9].seq, 3);
    }

    #[test]
    fn test_summary_uses_window_and_scope() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        feed.ingest(reading(ANKARA, Parameter::Pm25, 0, 90.0)).unwrap();
        feed.ingest(reading(ANKARA, Parameter::No2, 0, 250.0)).unwrap();
        feed.ingest(reading(ANKARA, Parameter::Pm25, 60 * 30, 30.0)).unwrap();

        let now = t0() + Duration::hours(31);
        let last_day = SummaryFilter::trailing(Duration::hours(24));

        let stats = feed.current_summary(&last_day, now).unwrap();
        assert_eq!(stats.total_alerts, 0);
        assert_eq!(stats.highest_value, Some(30.0));

        let all = SummaryFilter::trailing(Duration::hours(48));
        let stats = feed.current_summary(&all, now).unwrap();
        assert_eq!(stats.who_limit_exceeded_count, 2);
        assert_eq!(stats.affected_region_count, 1);
        assert_eq!(stats.highest_value, Some(250.0));

        let pm = all.for_parameter(Parameter::Pm25);
        let stats = feed.current_summary(&pm, now).unwrap();
        assert_eq!(stats.who_limit_exceeded_count, 1);
        assert_eq!(stats.highest_value, Some(90.0));
    }

    #[test]
    fn test_empty_feed_summary_is_no_data() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        let stats = feed
            .current_summary(&SummaryFilter::trailing(Duration::hours(24)), t0())
            .unwrap();

        assert_eq!(stats, SummaryStats::default());
        assert_eq!(feed.state(), CoordinatorState::Idle);
    }

    #[test]
    fn test_current_readings_latest_per_shard() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        feed.ingest(reading(ANKARA, Parameter::Pm25, 0, 20.0)).unwrap();
        feed.ingest(reading(ANKARA, Parameter::Pm25, 15, 160.0)).unwrap();
        feed.ingest(reading(ANKARA, Parameter::No2, 5, 10.0)).unwrap();

        let current = feed.current_readings(&ReadingFilter::default()).unwrap();
        assert_eq!(current.len(), 2);
        assert_eq!(current[0].0.value, 160.0);
        assert_eq!(current[0].1, SeverityTier::Hazardous);
        assert_eq!(current[1].0.parameter, Parameter::No2);

        let only_no2 = ReadingFilter {
            parameter: Some(Parameter::No2),
            ..Default::default()
        };
        assert_eq!(feed.current_readings(&only_no2).unwrap().len(), 1);

        let elsewhere = ReadingFilter {
            city: Some("Izmir".into()),
            ..Default::default()
        };
        assert!(feed.current_readings(&elsewhere).unwrap().is_empty());
    }

    #[test]
    fn test_measurement_ingest_reports_each_pollutant() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        let doc = RawMeasurement {
            latitude: ANKARA.latitude,
            longitude: ANKARA.longitude,
            city: Some("Ankara".into()),
            timestamp: t0(),
            pm25: Some(60.0),
            pm10: Some(-1.0),
            no2: None,
            so2: None,
            o3: Some(20.0),
        };

        let outcomes = feed.ingest_measurement(&doc).unwrap();
        let params: Vec<&str> = outcomes.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(params, vec!["pm25", "pm10", "o3"]);
        assert_eq!(outcomes[0].1.as_ref().unwrap().events.len(), 1);
        assert!(matches!(outcomes[1].1, Err(EngineError::InvalidReading(_))));
        assert!(outcomes[2].1.is_ok());

        let empty = RawMeasurement {
            pm25: None,
            pm10: None,
            o3: None,
            ..doc
        };
        assert!(feed.ingest_measurement(&empty).is_err());
    }

    #[test]
    fn test_subscribers_receive_updates() {
        // ---
        let feed = FeedCoordinator::new(test_config());
        let mut rx = feed.subscribe();

        feed.ingest(reading(ANKARA, Parameter::Pm25, 0, 90.0)).unwrap();

        let update = rx.try_recv().unwrap();
        assert_eq!(update.tier, SeverityTier::Unhealthy);
        assert_eq!(update.events.len(), 1);
        assert_eq!(update.events[0].seq, 1);
    }

    #[test]
    fn test_parallel_ingest_keeps_sequence_ids_unique() {
        // ---
        let feed = Arc::new(FeedCoordinator::new(test_config()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let feed = Arc::clone(&feed);
                thread::spawn(move || {
                    let site = GeoPoint {
                        latitude: 40.0 + i as f64,
                        longitude: 30.0,
                    };
                    for m in 0..25 {
                        feed.ingest(reading(site, Parameter::Pm25, m * 15, 90.0))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // 100 WHO events went through a log of capacity 10
        let recent = feed.recent_events(10).unwrap();
        let seqs: Vec<u64> = recent.iter().map(|e| e.seq).collect();
        let expected: Vec<u64> = (91..=100).rev().collect();
        assert_eq!(seqs, expected);
        assert_eq!(feed.state(), CoordinatorState::Idle);
    }
}
