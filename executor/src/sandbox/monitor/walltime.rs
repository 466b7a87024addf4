use tokio::time::*;

use super::*;

pub type WallTime = Duration;

/// Armed at construction, right before the process is spawned
pub struct Monitor {
    dur: Duration,
    start: Instant,
}

impl Monitor {
    pub fn new(dur: Duration) -> Self {
        Self {
            dur,
            start: Instant::now(),
        }
    }
}

impl super::Monitor for Monitor {
    type Resource = WallTime;

    async fn wait_exhaust(&mut self) -> MonitorKind {
        sleep_until(self.start + self.dur).await;
        MonitorKind::Walltime
    }
    fn poll_exhaust(&mut self) -> Option<MonitorKind> {
        if Instant::now() < self.start + self.dur {
            return None;
        }
        Some(MonitorKind::Walltime)
    }
    fn stat(&self) -> Self::Resource {
        self.start.elapsed()
    }
}
