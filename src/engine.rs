use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::constants::{DEFAULT_INTER_FILE_DELAY, DEFAULT_STORE_FILE};
use crate::core::{CaptionService, MediaFile};
use crate::error::ApiResult;
use crate::http::Sleeper;
use crate::ingest::LocalIngestor;
use crate::progress::FileStage;
use crate::store::CaptionStore;
use crate::telemetry::{RunMonitor, RunSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Pause after each captioned file to stay under rate limits.
    pub inter_file_delay: Duration,
    /// Store file name, relative to the media directory.
    pub store_file: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            inter_file_delay: DEFAULT_INTER_FILE_DELAY,
            store_file: DEFAULT_STORE_FILE.to_string(),
        }
    }
}

/// Captions every pending media file in a directory, one at a time.
pub struct Engine<S: CaptionService> {
    pub ingestor: LocalIngestor,
    pub service: S,
    pub monitor: RunMonitor,
    pub sleeper: Arc<dyn Sleeper>,
    pub options: BatchOptions,
}

impl<S: CaptionService> Engine<S> {
    /// Files already in the store are skipped; per-file failures are logged
    /// and left for the next run. A rejected credential aborts the run.
    pub fn run(&self, dir: &Path) -> Result<RunSummary> {
        let status = self.monitor.status();
        let mut store = CaptionStore::load(&dir.join(&self.options.store_file))?;
        let files = self.ingestor.discover(dir)?;
        let total = files.len();
        self.monitor.record_found(total);
        status.line(&format!("Found {total} videos."));
        info!(dir = %dir.display(), total, recorded = store.len(), "starting batch");

        let mut model: Option<String> = None;
        for (index, media) in files.iter().enumerate() {
            let position = format!("[{}/{}]", index + 1, total);
            if store.contains(&media.name) {
                status.line(&format!("{position} Skipping {} (Already captioned)", media.name));
                self.monitor.record_skip();
                continue;
            }

            if model.is_none() {
                let selected = self.service.select_model().context("selecting model")?;
                status.line(&format!("Selected model: {selected}"));
                model = Some(selected);
            }
            let model_name = model.as_deref().unwrap_or_default();

            status.line(&format!("{position} Processing {}...", media.name));
            match self.caption(media, model_name) {
                Ok(caption) => {
                    store
                        .record(&media.name, caption)
                        .with_context(|| format!("saving caption for {}", media.name))?;
                    self.monitor
                        .record_outcome(&media.name, FileStage::Recorded, None);
                    status.line("  - Done.");
                    info!(file = %media.name, "captioned");
                    if index + 1 < total {
                        self.sleeper.sleep(self.options.inter_file_delay);
                    }
                }
                Err(err) if err.is_fatal() => {
                    self.monitor.record_outcome(
                        &media.name,
                        FileStage::Failed,
                        Some(err.to_string()),
                    );
                    return Err(err).with_context(|| format!("captioning {}", media.name));
                }
                Err(err) => {
                    error!(file = %media.name, "captioning failed: {err}");
                    status.line(&format!("  - Error: {err}"));
                    self.monitor.record_outcome(
                        &media.name,
                        FileStage::Failed,
                        Some(err.to_string()),
                    );
                }
            }
        }

        Ok(self.monitor.summarize())
    }

    /// Uploading -> Polling -> Generating; any error short-circuits.
    fn caption(&self, media: &MediaFile, model: &str) -> ApiResult<String> {
        let status = self.monitor.status();
        status.transient(&format!("  - {}...", FileStage::Uploading));
        let handle = self.service.upload(media)?;
        status.transient(&format!("  - {}... ", FileStage::Polling));
        let handle = self.service.await_active(&handle)?;
        status.transient(&format!("  - {}... ", FileStage::Generating));
        self.service.generate_caption(&handle, model)
    }
}
