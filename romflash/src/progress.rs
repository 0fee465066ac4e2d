//! CLI progress display
//!
//! indicatif spinners and bars when stdout is a terminal, plain lines
//! otherwise.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use romflash_lib::progress::{
    ProgressCallback, ProgressCallbackArc, ProgressId, ProgressInfo, ProgressStatus, ProgressType,
    no_op_progress_callback,
};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Prints one line per step start and finish.
#[derive(Default)]
pub struct LineProgressCallback {
    prefixes: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
}

impl LineProgressCallback {
    pub fn new() -> Self {
        Self::default()
    }

    fn print_line(&self, line: &str) {
        let mut stdout = io::stdout();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }
}

impl ProgressCallback for LineProgressCallback {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.print_line(&format!("[{}] {}", info.prefix, info.operation));
        if let Ok(mut prefixes) = self.prefixes.lock() {
            prefixes.insert(id, info.prefix);
        }
        ProgressId(id)
    }

    fn update_message(&self, id: ProgressId, message: String) {
        if let Ok(prefixes) = self.prefixes.lock()
            && let Some(prefix) = prefixes.get(&id.0)
        {
            self.print_line(&format!("[{}] {}", prefix, message));
        }
    }

    fn increment(&self, _id: ProgressId, _delta: u64) {}

    fn finish(&self, id: ProgressId, status: ProgressStatus) {
        let prefix = self.prefixes.lock().ok().and_then(|mut p| p.remove(&id.0));
        if let Some(prefix) = prefix {
            self.print_line(&format!("[{}] {}", prefix, status));
        }
    }
}

pub struct IndicatifProgressCallback {
    multi_progress: MultiProgress,
    progress_bars: Mutex<HashMap<u64, ProgressBar>>,
    next_id: AtomicU64,
}

impl IndicatifProgressCallback {
    pub fn new() -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            progress_bars: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for IndicatifProgressCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for IndicatifProgressCallback {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let progress_bar = match info.progress_type {
            ProgressType::Spinner => {
                let spinner = self.multi_progress.add(ProgressBar::new_spinner());
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner.set_style(
                    ProgressStyle::with_template(&format!("[{}] {{spinner}} {{msg}}", info.prefix))
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(info.operation.to_string());
                spinner
            }
            ProgressType::Bar { total } => {
                let bar = self.multi_progress.add(ProgressBar::new(total));
                bar.set_style(
                    ProgressStyle::with_template(&format!(
                        "[{}] {{msg}} {{wide_bar}} {{pos}}/{{len}}",
                        info.prefix
                    ))
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
                );
                bar.set_message(info.operation.to_string());
                bar
            }
        };

        if let Ok(mut bars) = self.progress_bars.lock() {
            bars.insert(id, progress_bar);
        }
        ProgressId(id)
    }

    fn update_message(&self, id: ProgressId, message: String) {
        if let Ok(bars) = self.progress_bars.lock()
            && let Some(bar) = bars.get(&id.0)
        {
            bar.set_message(message);
        }
    }

    fn increment(&self, id: ProgressId, delta: u64) {
        if let Ok(bars) = self.progress_bars.lock()
            && let Some(bar) = bars.get(&id.0)
        {
            bar.inc(delta);
        }
    }

    fn finish(&self, id: ProgressId, status: ProgressStatus) {
        if let Ok(mut bars) = self.progress_bars.lock()
            && let Some(bar) = bars.remove(&id.0)
        {
            bar.finish_with_message(status.to_string());
        }
    }
}

pub fn create_progress_callback(quiet: bool) -> ProgressCallbackArc {
    if quiet {
        no_op_progress_callback()
    } else if io::stdout().is_terminal() {
        Arc::new(IndicatifProgressCallback::new())
    } else {
        Arc::new(LineProgressCallback::new())
    }
}
