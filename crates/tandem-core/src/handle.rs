//! Control-side surface of the engine.
//!
//! The handle owns everything that must never run on the audio thread:
//! reference file loading (on a worker thread), cluster rebuilds,
//! statistics queries, the miss-log reader, and state persistence.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tandem_midi::{BuildOptions, ReferenceBuilder, ReferenceData, ReferenceNote};

use crate::counters::{EngineStats, StatsSnapshot};
use crate::error::{Error, Result};
use crate::misslog::{MissLogEntry, MissLogReader};
use crate::shared::SharedReference;

/// Outcome of a reference load, for the host's display.
#[derive(Clone, Debug, Serialize)]
pub struct ReferenceSummary {
    pub notes: usize,
    pub clusters: usize,
    pub duration_secs: f64,
    pub cluster_window_ms: f64,
    pub bar_duration_secs: f64,
}

impl From<&ReferenceData> for ReferenceSummary {
    fn from(data: &ReferenceData) -> Self {
        Self {
            notes: data.notes.len(),
            clusters: data.clusters.len(),
            duration_secs: data.duration(),
            cluster_window_ms: data.cluster_window * 1000.0,
            bar_duration_secs: data.bar_duration,
        }
    }
}

/// Live statistics of the currently loaded reference.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ReferenceStats {
    pub notes: usize,
    pub clusters: usize,
    pub cluster_window_ms: f64,
    pub min_ioi_ms: f64,
    pub median_ioi_ms: f64,
    pub bar_duration_secs: f64,
    pub duration_secs: f64,
}

/// Full note list for piano-roll style display.
#[derive(Clone, Debug, Serialize)]
pub struct ReferenceDisplay {
    pub sample_rate: f64,
    pub first_note_sample: i64,
    pub notes: Vec<ReferenceNote>,
}

/// Where in the take the performer actually started.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StartOffset {
    pub ms: f64,
    pub bars: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    reference_path: Option<PathBuf>,
}

type LoadResult = Result<ReferenceSummary>;

/// Control-thread half of an engine instance.
pub struct EngineHandle {
    sample_rate: f64,
    tempo_shift_bars: u32,
    shared: Arc<SharedReference>,
    stats: Arc<EngineStats>,
    miss: Mutex<MissLogReader>,
    pending: Mutex<Option<Receiver<LoadResult>>>,
    reference_path: Arc<Mutex<Option<PathBuf>>>,
}

impl EngineHandle {
    pub(crate) fn new(
        sample_rate: f64,
        tempo_shift_bars: u32,
        shared: Arc<SharedReference>,
        stats: Arc<EngineStats>,
        miss: MissLogReader,
    ) -> Self {
        Self {
            sample_rate,
            tempo_shift_bars,
            shared,
            stats,
            miss: Mutex::new(miss),
            pending: Mutex::new(None),
            reference_path: Arc::new(Mutex::new(None)),
        }
    }

    /// Start loading a reference file on a worker thread.
    ///
    /// Rejected while the transport is running: a publish mid-take
    /// would invalidate the matcher's cursor. Completion is observed
    /// through [`poll_load`](Self::poll_load).
    pub fn load_reference(&self, path: impl Into<PathBuf>) -> Result<()> {
        if self.stats.is_playing.get() {
            return Err(Error::TransportBusy);
        }
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return Err(Error::LoadInProgress);
        }

        let path = path.into();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let shared = Arc::clone(&self.shared);
        let reference_path = Arc::clone(&self.reference_path);
        let builder = ReferenceBuilder::new(self.sample_rate);
        let bars = self.tempo_shift_bars;

        thread::spawn(move || {
            let result = build_pair_from_file(&builder, &path, bars).map(|(base, shifted)| {
                let summary = ReferenceSummary::from(base.as_ref());
                shared.publish(base, shifted);
                *reference_path.lock() = Some(path.clone());
                info!(path = %path.display(), notes = summary.notes, "reference published");
                summary
            });
            if let Err(err) = &result {
                warn!(%err, "reference load failed");
            }
            let _ = tx.send(result);
        });

        *pending = Some(rx);
        Ok(())
    }

    /// Check on an in-flight load. `Ok(None)` means still running (or
    /// nothing pending).
    pub fn poll_load(&self) -> Result<Option<ReferenceSummary>> {
        let mut pending = self.pending.lock();
        let Some(rx) = pending.as_ref() else {
            return Ok(None);
        };
        match rx.try_recv() {
            Ok(result) => {
                *pending = None;
                if result.is_ok() {
                    self.miss.lock().clear();
                }
                result.map(Some)
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                *pending = None;
                Err(Error::InvalidState(
                    "reference load worker vanished".to_string(),
                ))
            }
        }
    }

    /// Parse and publish reference MIDI data synchronously. For hosts
    /// that already hold the bytes (embedded content, tests).
    pub fn load_reference_from(&self, bytes: &[u8]) -> Result<ReferenceSummary> {
        if self.stats.is_playing.get() {
            return Err(Error::TransportBusy);
        }
        let builder = ReferenceBuilder::new(self.sample_rate);
        let (base, shifted) = build_pair(&builder, bytes, self.tempo_shift_bars)?;
        let summary = ReferenceSummary::from(base.as_ref());
        self.shared.publish(base, shifted);
        *self.reference_path.lock() = None;
        self.miss.lock().clear();
        Ok(summary)
    }

    /// Re-partition the loaded reference with an explicit cluster
    /// window. The matched bitmaps start over.
    pub fn rebuild_clusters(&self, window_ms: f32) -> Result<()> {
        if self.stats.is_playing.get() {
            return Err(Error::TransportBusy);
        }
        let base = self.shared.base().ok_or(Error::NoReference)?;
        let shifted = self.shared.shifted().ok_or(Error::NoReference)?;
        let window = window_ms.max(0.0) as f64 / 1000.0;
        self.shared.publish(
            Arc::new(base.with_cluster_window(window)),
            Arc::new(shifted.with_cluster_window(window)),
        );
        info!(window_ms, "clusters rebuilt");
        Ok(())
    }

    pub fn is_reference_loaded(&self) -> bool {
        self.shared.is_loaded()
    }

    pub fn reference_path(&self) -> Option<PathBuf> {
        self.reference_path.lock().clone()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Offset of the first live note into the current take, once one
    /// has been played.
    pub fn start_offset(&self) -> Option<StartOffset> {
        if !self.stats.start_offset_captured.get() {
            return None;
        }
        Some(StartOffset {
            ms: self.stats.start_offset_ms.get(),
            bars: self.stats.start_offset_bars.get(),
        })
    }

    pub fn reference_stats(&self) -> Option<ReferenceStats> {
        let data = self.shared.base()?;
        Some(ReferenceStats {
            notes: data.notes.len(),
            clusters: data.clusters.len(),
            cluster_window_ms: data.cluster_window * 1000.0,
            min_ioi_ms: data.min_ioi * 1000.0,
            median_ioi_ms: data.median_ioi * 1000.0,
            bar_duration_secs: data.bar_duration,
            duration_secs: data.duration(),
        })
    }

    pub fn reference_display(&self) -> Option<ReferenceDisplay> {
        let data = self.shared.base()?;
        Some(ReferenceDisplay {
            sample_rate: data.sample_rate,
            first_note_sample: data.first_note_sample,
            notes: data.notes.clone(),
        })
    }

    /// Misses recorded so far in the current take.
    pub fn misses(&self) -> Vec<MissLogEntry> {
        self.miss.lock().entries().to_vec()
    }

    /// Human-readable miss report for the current take.
    pub fn miss_report(&self) -> String {
        self.miss.lock().report()
    }

    /// Serialize host-persistable state (currently the reference path).
    pub fn save_state(&self) -> Result<Vec<u8>> {
        let state = PersistedState {
            reference_path: self.reference_path.lock().clone(),
        };
        Ok(serde_json::to_vec(&state)?)
    }

    /// Restore persisted state, re-triggering the reference load if a
    /// path was saved.
    pub fn restore_state(&self, bytes: &[u8]) -> Result<()> {
        let state: PersistedState = serde_json::from_slice(bytes)?;
        if let Some(path) = state.reference_path {
            self.load_reference(path)?;
        }
        Ok(())
    }
}

fn build_pair(
    builder: &ReferenceBuilder,
    bytes: &[u8],
    bars: u32,
) -> Result<(Arc<ReferenceData>, Arc<ReferenceData>)> {
    let base = builder.parse(bytes, &BuildOptions::default())?;
    let shifted = builder.parse(
        bytes,
        &BuildOptions {
            bar_shift: bars,
            cluster_window: None,
        },
    )?;
    Ok((Arc::new(base), Arc::new(shifted)))
}

fn build_pair_from_file(
    builder: &ReferenceBuilder,
    path: &Path,
    bars: u32,
) -> Result<(Arc<ReferenceData>, Arc<ReferenceData>)> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            tandem_midi::Error::FileNotFound(path.display().to_string())
        }
        _ => tandem_midi::Error::Unreadable(format!("{}: {e}", path.display())),
    })?;
    build_pair(builder, &bytes, bars)
}
