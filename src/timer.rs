use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Roughly 30 years.
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A cancelable, re-armable one-shot delay for use inside `select!` loops.
///
/// Arming replaces any previous deadline. `fired` never resolves while
/// disarmed, and disarms itself once it does resolve. Dropping the `fired`
/// future early leaves the deadline untouched.
#[derive(Debug, Default)]
pub struct DelayedTask {
    deadline: Option<Instant>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays past the clock's range are clamped to [`FAR_FUTURE`] from now.
    pub fn arm(&mut self, after: Duration) {
        let now = Instant::now();
        self.deadline = Some(now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE));
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub async fn fired(&mut self) {
        match self.deadline {
            Some(at) => {
                sleep_until(at).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rearming_pushes_the_deadline_out() {
        let mut task = DelayedTask::new();
        let start = Instant::now();
        task.arm(Duration::from_secs(3));
        tokio::time::advance(Duration::from_secs(2)).await;
        task.arm(Duration::from_secs(3));
        task.fired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(!task.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_fires() {
        let mut task = DelayedTask::new();
        task.arm(Duration::from_millis(10));
        task.cancel();
        let res = tokio::time::timeout(Duration::from_secs(60), task.fired()).await;
        assert!(res.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn huge_delay_is_clamped_instead_of_overflowing() {
        let mut task = DelayedTask::new();
        task.arm(Duration::MAX);
        assert!(task.is_armed());

        let fired = tokio::time::timeout(Duration::from_secs(86_400), task.fired()).await;
        assert!(fired.is_err());
        assert!(task.is_armed());
    }
}
