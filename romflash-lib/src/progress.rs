//! Progress callback system
//!
//! Abstract progress interface so the CLI (or any other front end) decides
//! how flashing steps are displayed.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::DeviceMode;

#[derive(Debug, Clone)]
pub enum ProgressType {
    /// Indeterminate, for tool calls of unknown duration
    Spinner,
    /// Counted, for the partition image loop
    Bar { total: u64 },
}

/// Step being reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressOperation {
    Extract { archive: String },
    DetectMode,
    WaitForMode { expected: DeviceMode },
    RebootToBootloader,
    Wipe,
    FlashUpdate,
    FlashImages { count: usize },
    FlashImage { partition: String },
    RebootToSystem,
}

impl fmt::Display for ProgressOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extract { archive } => write!(f, "Extracting {}...", archive),
            Self::DetectMode => write!(f, "Detecting device mode..."),
            Self::WaitForMode { expected } => write!(f, "Waiting for {} mode...", expected),
            Self::RebootToBootloader => write!(f, "Rebooting to bootloader..."),
            Self::Wipe => write!(f, "Formatting device..."),
            Self::FlashUpdate => write!(f, "Flashing update package..."),
            Self::FlashImages { count } => write!(f, "Flashing {} final images...", count),
            Self::FlashImage { partition } => write!(f, "Flashing {}...", partition),
            Self::RebootToSystem => write!(f, "Rebooting to system..."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStatus {
    Success,
    Skipped,
    Failed(String),
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "done"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub progress_type: ProgressType,
    /// Step prefix, a hex step number such as `0x03`
    pub prefix: String,
    pub operation: ProgressOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

pub trait ProgressCallback: Send + Sync {
    /// Begin displaying a step; the returned id addresses it afterwards.
    fn start(&self, info: ProgressInfo) -> ProgressId;

    fn update_message(&self, id: ProgressId, message: String);

    /// Advance a bar; ignored for spinners.
    fn increment(&self, id: ProgressId, delta: u64);

    fn finish(&self, id: ProgressId, status: ProgressStatus);
}

/// Produces no output.
#[derive(Debug, Default)]
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn start(&self, _info: ProgressInfo) -> ProgressId {
        ProgressId(0)
    }

    fn update_message(&self, _id: ProgressId, _message: String) {}

    fn increment(&self, _id: ProgressId, _delta: u64) {}

    fn finish(&self, _id: ProgressId, _status: ProgressStatus) {}
}

pub type ProgressCallbackArc = Arc<dyn ProgressCallback>;

pub fn no_op_progress_callback() -> ProgressCallbackArc {
    Arc::new(NoOpProgressCallback)
}

/// Numbers steps and hands out handlers.
pub struct ProgressHelper {
    callback: ProgressCallbackArc,
    step_counter: AtomicU32,
}

impl ProgressHelper {
    pub fn new(callback: ProgressCallbackArc, initial_step: u32) -> Self {
        Self {
            callback,
            step_counter: AtomicU32::new(initial_step),
        }
    }

    fn next_step(&self) -> u32 {
        self.step_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn start(&self, progress_type: ProgressType, operation: ProgressOperation) -> ProgressHandler {
        let info = ProgressInfo {
            progress_type,
            prefix: format!("0x{:02X}", self.next_step()),
            operation,
        };
        let id = self.callback.start(info);
        ProgressHandler {
            callback: Arc::clone(&self.callback),
            id,
        }
    }

    pub fn create_spinner(&self, operation: ProgressOperation) -> ProgressHandler {
        self.start(ProgressType::Spinner, operation)
    }

    pub fn create_bar(&self, total: u64, operation: ProgressOperation) -> ProgressHandler {
        self.start(ProgressType::Bar { total }, operation)
    }

    pub fn current_step(&self) -> u32 {
        self.step_counter.load(Ordering::SeqCst)
    }
}

pub struct ProgressHandler {
    callback: ProgressCallbackArc,
    id: ProgressId,
}

impl ProgressHandler {
    pub fn set_message(&self, message: impl Into<String>) {
        self.callback.update_message(self.id, message.into());
    }

    pub fn inc(&self, delta: u64) {
        self.callback.increment(self.id, delta);
    }

    pub fn finish(self, status: ProgressStatus) {
        self.callback.finish(self.id, status);
    }
}
