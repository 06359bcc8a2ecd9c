//! Time-windowed sensor reading store
//!
//! Holds per-sensor insertion-ordered series of temperature/humidity
//! readings. Pruning is lazy: every ingest drops entries older than the
//! retention window from the ingested series only, which bounds series
//! length under continuous ingestion without a background sweeper.
//!
//! The control aggregate is a flat mean over individual readings within the
//! (much shorter) aggregation window - NOT a mean of per-sensor means. A
//! sensor that reports more often carries proportionally more weight. This
//! is a deliberate, long-standing simplification; changing it changes
//! control behavior.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime};

use crate::constants::{limits, timing};
use crate::data::types::{Aggregate, AggregationMode, ReadingSample, SensorReading};

/// Per-sensor reading series with windowed aggregation
#[derive(Debug)]
pub struct SensorStore {
    series: HashMap<String, VecDeque<SensorReading>>,
    retention: Duration,
}

impl SensorStore {
    pub fn new() -> Self {
        Self::with_retention(timing::RETENTION_WINDOW)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            series: HashMap::new(),
            retention,
        }
    }

    /// Append a reading to the named series, creating it if absent, then
    /// prune that series against the retention window.
    ///
    /// Numeric validity is the caller's contract; nothing is checked here.
    pub fn ingest(
        &mut self,
        sensor_id: &str,
        temperature_f: f64,
        humidity: f64,
        timestamp: SystemTime,
    ) {
        let series = self.series.entry(sensor_id.to_string()).or_default();
        series.push_back(SensorReading {
            timestamp,
            temperature_f,
            humidity,
        });

        let retention = self.retention;
        // Readings with timestamps "in the future" relative to the newest
        // entry are kept; only provably old entries go.
        series.retain(|r| {
            timestamp
                .duration_since(r.timestamp)
                .map(|age| age <= retention)
                .unwrap_or(true)
        });
    }

    /// Windowed flat mean over the series selected by `mode`.
    ///
    /// Returns `None` when no reading in scope falls within `window` of
    /// `now` - a first-class "no data" outcome, not an error.
    pub fn windowed_average(
        &self,
        mode: &AggregationMode,
        window: Duration,
        now: SystemTime,
    ) -> Option<Aggregate> {
        let mut temp_sum = 0.0;
        let mut hum_sum = 0.0;
        let mut count = 0usize;

        let mut tally = |series: &VecDeque<SensorReading>| {
            for r in series {
                let in_window = now
                    .duration_since(r.timestamp)
                    .map(|age| age <= window)
                    .unwrap_or(false);
                if in_window {
                    temp_sum += r.temperature_f;
                    hum_sum += r.humidity;
                    count += 1;
                }
            }
        };

        match mode {
            AggregationMode::Average => {
                for series in self.series.values() {
                    tally(series);
                }
            }
            AggregationMode::Specific(name) => {
                if let Some(series) = self.series.get(name) {
                    tally(series);
                }
            }
        }

        if count == 0 {
            return None;
        }
        Some(Aggregate {
            temperature_f: temp_sum / count as f64,
            humidity: hum_sum / count as f64,
            sample_count: count,
        })
    }

    /// Whether the named sensor has any historical reading. Gates
    /// `Specific` mode selection.
    pub fn has_readings(&self, sensor_id: &str) -> bool {
        self.series
            .get(sensor_id)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    /// Most recent readings per sensor, newest last, for status reports.
    pub fn recent(&self) -> HashMap<String, Vec<ReadingSample>> {
        self.series
            .iter()
            .map(|(name, series)| {
                let samples = series
                    .iter()
                    .rev()
                    .take(limits::STATUS_READINGS_PER_SENSOR)
                    .rev()
                    .copied()
                    .map(ReadingSample::from)
                    .collect();
                (name.clone(), samples)
            })
            .collect()
    }

    /// Number of retained readings for one sensor (test/diagnostic hook)
    pub fn series_len(&self, sensor_id: &str) -> usize {
        self.series.get(sensor_id).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for SensorStore {
    fn default() -> Self {
        Self::new()
    }
}
