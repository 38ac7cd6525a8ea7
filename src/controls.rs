use std::time::Duration;

use tracing::trace;

use crate::timer::DelayedTask;

/// Auto-hide for the on-screen playback controls.
#[derive(Debug)]
pub struct ControlsVisibility {
    visible: bool,
    hide_after: Duration,
    timer: DelayedTask,
}

impl ControlsVisibility {
    /// Controls start visible with the countdown already running.
    pub fn new(hide_after: Duration) -> Self {
        let mut controls = Self {
            visible: true,
            hide_after,
            timer: DelayedTask::new(),
        };
        controls.timer.arm(hide_after);
        controls
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn on_activity(&mut self) {
        if !self.visible {
            trace!("controls shown");
        }
        self.visible = true;
        self.timer.arm(self.hide_after);
    }

    /// Resolves when the countdown expires and the controls have been hidden.
    pub async fn wait_hide(&mut self) {
        self.timer.fired().await;
        self.visible = false;
        trace!("controls hidden after inactivity");
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }
}
