use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while a long AWS or Pulumi step runs
pub struct StepProgress {
    progress_bar: ProgressBar,
}

impl StepProgress {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));

        Self { progress_bar: pb }
    }

    pub fn finish_success(&self, message: &str) {
        self.progress_bar
            .finish_with_message(format!("{} ✓", message));
    }

    pub fn finish_error(&self) {
        self.progress_bar.abandon_with_message("failed");
    }
}

/// Run `future` under a spinner, closing it according to the outcome
pub async fn with_spinner<T, E, F>(message: &str, done: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let progress = StepProgress::start(message);
    let result = future.await;
    match &result {
        Ok(_) => progress.finish_success(done),
        Err(_) => progress.finish_error(),
    }
    result
}
