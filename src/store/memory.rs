//! In-memory stores with failure injection.
//!
//! These back the test suite and let the engine be exercised without a
//! running database. Writes honour the same overwrite-on-duplicate-key rule
//! as the real destination.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{DestinationStore, SourceStore, StoreError, StoreResult};
use crate::models::{DataPoint, SourceRecord, TimeFormat};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Protocol("in-memory store lock poisoned".to_string())
}

#[derive(Default)]
pub struct MemorySource {
    measurements: Mutex<BTreeMap<String, Vec<SourceRecord>>>,
    read_failures: Mutex<HashMap<String, (usize, StoreError)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, measurement: &str, record: SourceRecord) {
        if let Ok(mut guard) = self.measurements.lock() {
            guard.entry(measurement.to_string()).or_default().push(record);
        }
    }

    /// Make the next `times` range queries for `measurement` fail with `error`.
    pub fn fail_reads(&self, measurement: &str, times: usize, error: StoreError) {
        if let Ok(mut guard) = self.read_failures.lock() {
            guard.insert(measurement.to_string(), (times, error));
        }
    }

    fn sorted_times(&self, measurement: &str) -> StoreResult<Vec<(DateTime<Utc>, String)>> {
        let guard = self.measurements.lock().map_err(poisoned)?;
        let mut times = Vec::new();
        for record in guard.get(measurement).into_iter().flatten() {
            let (at, _) = TimeFormat::detect(&record.time)
                .map_err(|e| StoreError::Protocol(e.to_string()))?;
            times.push((at, record.time.clone()));
        }
        times.sort();
        Ok(times)
    }
}

impl SourceStore for MemorySource {
    fn list_measurements(&self) -> StoreResult<Vec<String>> {
        let guard = self.measurements.lock().map_err(poisoned)?;
        Ok(guard.keys().cloned().collect())
    }

    fn earliest_timestamp(&self, measurement: &str) -> StoreResult<Option<String>> {
        Ok(self
            .sorted_times(measurement)?
            .into_iter()
            .next()
            .map(|(_, text)| text))
    }

    fn latest_timestamp(&self, measurement: &str) -> StoreResult<Option<String>> {
        Ok(self
            .sorted_times(measurement)?
            .into_iter()
            .next_back()
            .map(|(_, text)| text))
    }

    fn query_range(
        &self,
        measurement: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<Vec<SourceRecord>> {
        {
            let mut failures = self.read_failures.lock().map_err(poisoned)?;
            if let Some((remaining, error)) = failures.get_mut(measurement) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }
        }

        let to_instant = |text: &str| {
            TimeFormat::detect(text)
                .map(|(at, _)| at)
                .map_err(|e| StoreError::Rejected(e.to_string()))
        };
        let start = to_instant(start)?;
        let end = to_instant(end)?;

        let guard = self.measurements.lock().map_err(poisoned)?;
        let mut matched = Vec::new();
        for record in guard.get(measurement).into_iter().flatten() {
            let at = to_instant(&record.time)?;
            if at >= start && at < end {
                matched.push((at, record.clone()));
            }
        }
        matched.sort_by_key(|(at, _)| *at);
        Ok(matched.into_iter().map(|(_, record)| record).collect())
    }
}

type SeriesKey = (String, Vec<(String, String)>, DateTime<Utc>);

#[derive(Default)]
pub struct MemoryDestination {
    buckets: Mutex<BTreeMap<String, BTreeMap<SeriesKey, DataPoint>>>,
    write_failures: Mutex<HashMap<DateTime<Utc>, (usize, StoreError)>>,
    failing_buckets: Mutex<HashSet<String>>,
    write_calls: AtomicUsize,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` batches containing a point at `at` fail with `error`.
    pub fn fail_writes_at(&self, at: DateTime<Utc>, times: usize, error: StoreError) {
        if let Ok(mut guard) = self.write_failures.lock() {
            guard.insert(at, (times, error));
        }
    }

    /// Make bucket provisioning for `name` fail.
    pub fn fail_bucket(&self, name: &str) {
        if let Ok(mut guard) = self.failing_buckets.lock() {
            guard.insert(name.to_string());
        }
    }

    /// Number of `write_points` calls, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets
            .lock()
            .map(|guard| guard.contains_key(name))
            .unwrap_or(false)
    }

    /// Stored points of a bucket, ordered by series key.
    pub fn points(&self, bucket: &str) -> Vec<DataPoint> {
        self.buckets
            .lock()
            .ok()
            .and_then(|guard| guard.get(bucket).map(|s| s.values().cloned().collect()))
            .unwrap_or_default()
    }
}

impl DestinationStore for MemoryDestination {
    fn ensure_bucket(&self, name: &str) -> StoreResult<String> {
        if self.failing_buckets.lock().map_err(poisoned)?.contains(name) {
            return Err(StoreError::Rejected(format!("cannot create bucket {name}")));
        }
        let mut guard = self.buckets.lock().map_err(poisoned)?;
        guard.entry(name.to_string()).or_default();
        Ok(name.to_string())
    }

    fn last_timestamp(&self, bucket: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let guard = self.buckets.lock().map_err(poisoned)?;
        Ok(guard
            .get(bucket)
            .and_then(|series| series.values().map(|p| p.time).max()))
    }

    fn write_points(&self, bucket: &str, points: &[DataPoint]) -> StoreResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.write_failures.lock().map_err(poisoned)?;
            for point in points {
                if let Some((remaining, error)) = failures.get_mut(&point.time) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(error.clone());
                    }
                }
            }
        }

        let mut guard = self.buckets.lock().map_err(poisoned)?;
        let series = guard
            .get_mut(bucket)
            .ok_or_else(|| StoreError::Rejected(format!("bucket not found: {bucket}")))?;
        for point in points {
            let tags = point
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            series.insert(
                (point.measurement.clone(), tags, point.time),
                point.clone(),
            );
        }
        Ok(())
    }
}
