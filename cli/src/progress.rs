use indicatif::{ProgressBar, ProgressStyle};
use pi_rec::{ProgressUpdate, TestProgress};

/// Draws a progress bar on stderr while a test run is going
pub struct ProgressBarReporter {
    pb: ProgressBar,
    total_len: usize,
}

impl ProgressBarReporter {
    pub fn new() -> Self {
        let sty = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        let pb = ProgressBar::new(0);
        pb.set_style(sty);

        Self { pb, total_len: 0 }
    }
}

impl Drop for ProgressBarReporter {
    fn drop(&mut self) {
        if !self.pb.is_finished() {
            self.pb.abandon();
        }
    }
}

impl TestProgress for ProgressBarReporter {
    fn update(&mut self, update: ProgressUpdate<'_>) {
        if update.total != self.total_len {
            self.total_len = update.total;
            self.pb.set_length(self.total_len as u64);
        }

        self.pb.set_position(update.index as u64);
        self.pb.set_message(update.name.to_owned());
    }

    fn finish(&mut self) {
        self.pb.finish_with_message("done");
    }
}
