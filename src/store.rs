//! Live metrics and recording buffers.
//!
//! The store is fed exclusively by the reassembler's output (first segments
//! and full samples) and by explicit session commands.  It also owns the
//! liveness bookkeeping the watchdog reads: the last-update instant and the
//! possible-drop flag.

use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use serde::Serialize;
use tokio::time::Instant;

use crate::types::{FullSample, LiveMetrics, TimePoint, WearStatus};

pub(crate) fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

// ── Series ────────────────────────────────────────────────────────────────────

/// The ten recorded series, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Series {
    Focus,
    Relax,
    Delta,
    Theta,
    LowAlpha,
    HighAlpha,
    LowBeta,
    HighBeta,
    LowGamma,
    HighGamma,
}

impl Series {
    pub const ALL: [Series; 10] = [
        Series::Focus,
        Series::Relax,
        Series::Delta,
        Series::Theta,
        Series::LowAlpha,
        Series::HighAlpha,
        Series::LowBeta,
        Series::HighBeta,
        Series::LowGamma,
        Series::HighGamma,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Series::Focus => "focus",
            Series::Relax => "relax",
            Series::Delta => "delta",
            Series::Theta => "theta",
            Series::LowAlpha => "lowAlpha",
            Series::HighAlpha => "highAlpha",
            Series::LowBeta => "lowBeta",
            Series::HighBeta => "highBeta",
            Series::LowGamma => "lowGamma",
            Series::HighGamma => "highGamma",
        }
    }

    fn value(self, s: &FullSample) -> u32 {
        match self {
            Series::Focus => s.focus as u32,
            Series::Relax => s.relax as u32,
            Series::Delta => s.delta,
            Series::Theta => s.theta,
            Series::LowAlpha => s.low_alpha,
            Series::HighAlpha => s.high_alpha,
            Series::LowBeta => s.low_beta,
            Series::HighBeta => s.high_beta,
            Series::LowGamma => s.low_gamma,
            Series::HighGamma => s.high_gamma,
        }
    }
}

/// Ten parallel sequences that only ever grow together.
///
/// There is no way to push to a single series, so every series always has
/// the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeriesBuffers {
    data: [Vec<u32>; 10],
}

impl SeriesBuffers {
    fn push(&mut self, sample: &FullSample) {
        for (buf, series) in self.data.iter_mut().zip(Series::ALL) {
            buf.push(series.value(sample));
        }
    }

    fn clear(&mut self) {
        for buf in &mut self.data {
            buf.clear();
        }
    }

    pub fn get(&self, series: Series) -> &[u32] {
        &self.data[series as usize]
    }

    pub fn len(&self) -> usize {
        self.data[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RecordingSession {
    pub active: bool,
    /// Wall-clock milliseconds since Unix epoch; `None` before the first
    /// start and after [`TelemetryStore::clear`].
    pub started_at_ms: Option<f64>,
}

/// Read-only hand-off of a recording to the scoring collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub started_at_ms: Option<f64>,
    pub duration_samples: usize,
    pub time_points: Vec<TimePoint>,
    pub series: SeriesBuffers,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TelemetryStore {
    live: LiveMetrics,
    last_sample: Option<FullSample>,
    last_update: Option<Instant>,
    possible_drop: bool,
    session: RecordingSession,
    time_points: Vec<TimePoint>,
    series: SeriesBuffers,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the first-segment metrics.  Refreshes the last-update instant
    /// and clears the possible-drop flag.
    pub fn update_live_metrics(&mut self, signal_quality: u8, focus: u8, relax: u8) {
        self.live = LiveMetrics {
            signal_quality,
            focus,
            relax,
            wear: WearStatus::from_signal_quality(signal_quality),
        };
        self.touch();
    }

    /// Record a full sample.  Live metrics are always refreshed; the
    /// recording buffers only grow while a session is active.
    pub fn append_full_sample(&mut self, sample: &FullSample) {
        self.update_live_metrics(sample.signal_quality, sample.focus, sample.relax);
        self.last_sample = Some(*sample);

        if !self.session.active {
            return;
        }
        self.time_points.push(TimePoint {
            timestamp_ms: now_ms(),
            focus: sample.focus,
            relax: sample.relax,
        });
        self.series.push(sample);
    }

    /// Begin a new recording.  Anything left over from the previous one is
    /// discarded.
    pub fn start_session(&mut self) {
        self.time_points.clear();
        self.series.clear();
        self.session = RecordingSession {
            active: true,
            started_at_ms: Some(now_ms()),
        };
        info!("recording session started");
    }

    /// End the recording.  The buffers stay in place for the scoring
    /// collaborator; the returned snapshot is a copy of them.
    pub fn stop_session(&mut self) -> SessionSnapshot {
        self.session.active = false;
        info!(
            "recording session stopped after {} samples",
            self.time_points.len()
        );
        self.snapshot()
    }

    /// Drop the buffers and session metadata.  Live metrics and liveness
    /// state are untouched.
    pub fn clear(&mut self) {
        self.time_points.clear();
        self.series.clear();
        self.session = RecordingSession::default();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            started_at_ms: self.session.started_at_ms,
            duration_samples: self.time_points.len(),
            time_points: self.time_points.clone(),
            series: self.series.clone(),
        }
    }

    pub fn live(&self) -> LiveMetrics {
        self.live
    }

    pub fn last_sample(&self) -> Option<&FullSample> {
        self.last_sample.as_ref()
    }

    pub fn session(&self) -> RecordingSession {
        self.session
    }

    pub fn time_points(&self) -> &[TimePoint] {
        &self.time_points
    }

    pub fn series(&self) -> &SeriesBuffers {
        &self.series
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn possible_drop(&self) -> bool {
        self.possible_drop
    }

    // ── Liveness (crate-internal) ─────────────────────────────────────────────

    fn touch(&mut self) {
        self.last_update = Some(Instant::now());
        self.possible_drop = false;
    }

    /// Start the silence clock for a fresh link.
    pub(crate) fn mark_link_up(&mut self) {
        self.touch();
    }

    pub(crate) fn mark_link_down(&mut self) {
        self.possible_drop = false;
    }

    pub(crate) fn raise_possible_drop(&mut self) {
        self.possible_drop = true;
    }
}
