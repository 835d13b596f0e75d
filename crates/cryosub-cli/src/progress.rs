use std::sync::Mutex;

use cryosub_core::pipeline::{PipelineStage, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};

/// Drives one indicatif bar per pipeline stage.
pub struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    /// Remove any bar still on screen.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                if let Ok(style) =
                    ProgressStyle::default_bar().template("{msg:28} [{bar:40}] {pos}/{len} ({eta})")
                {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.enable_steady_tick(std::time::Duration::from_millis(120));
                bar
            }
        };
        bar.set_message(stage.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn advance(&self, items_done: usize) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(ref bar) = *slot {
                bar.inc(items_done as u64);
            }
        }
    }

    fn finish_stage(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}
