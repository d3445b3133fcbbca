use crate::client::sender::ProgressCallback;
use crate::models::{TransferError, UploadResponse};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Terminal progress bars for a batch, one per file.
pub struct BatchProgress {
    mp: MultiProgress,
    bars: RwLock<HashMap<usize, ProgressBar>>,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchProgress {
    pub fn new() -> Self {
        Self {
            mp: MultiProgress::new(),
            bars: RwLock::new(HashMap::new()),
        }
    }

    /// Bars are drawn to a hidden target, for tests and non-interactive runs.
    pub fn hidden() -> Self {
        Self {
            mp: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            bars: RwLock::new(HashMap::new()),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar(&self, index: usize) -> Option<ProgressBar> {
        self.bars.read().ok()?.get(&index).cloned()
    }

    fn println(&self, line: String) {
        let _ = self.mp.println(line);
    }
}

impl ProgressCallback for BatchProgress {
    fn file_started(&self, index: usize, name: &str, total_bytes: Option<u64>) {
        let pb = match total_bytes {
            Some(total) if total > 0 => {
                let pb = self.mp.add(ProgressBar::new(total));
                pb.set_style(Self::bar_style());
                pb
            }
            _ => {
                let pb = self.mp.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            }
        };
        pb.set_message(format!("Sending {}", name));

        match self.bars.write() {
            Ok(mut bars) => {
                bars.insert(index, pb);
            }
            Err(e) => eprintln!("Error accessing progress bars: {}", e),
        }
    }

    fn file_progress(&self, index: usize, delta: u64) {
        if let Some(pb) = self.bar(index) {
            pb.inc(delta);
        }
    }

    fn file_done(&self, index: usize, response: &UploadResponse) {
        let message = format!(
            "[DONE] {} -> {} ({})",
            response.filename,
            response.stored_as.as_deref().unwrap_or("stored"),
            response.state
        );
        match self.bar(index) {
            Some(pb) => pb.finish_with_message(message),
            None => self.println(message),
        }
    }

    fn file_error(&self, index: usize, error: &TransferError) {
        let message = format!("[FAILED] {}", error);
        match self.bar(index) {
            Some(pb) => pb.abandon_with_message(message),
            None => self.println(message),
        }
    }
}
