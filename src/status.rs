//! Operator-facing presence string.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    DoNotDisturb,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::DoNotDisturb => "dnd",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub activity: String,
    pub status: PresenceStatus,
}

/// Tracks run start and whether the process is in a degraded state.
#[derive(Debug)]
pub struct StatusBoard {
    started: Instant,
    degraded: bool,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            degraded: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn archiving(&self, message_count: usize) -> Presence {
        Presence {
            activity: format!("Archiving Messages ({})", message_count),
            status: PresenceStatus::Online,
        }
    }

    /// Steady-state presence. Once an error has been reported the board
    /// stays degraded until the process restarts.
    pub fn steady(&self) -> Presence {
        if self.degraded {
            return self.error_presence();
        }
        Presence {
            activity: format!("Channel Archive ({})", format_elapsed(self.elapsed())),
            status: PresenceStatus::Online,
        }
    }

    pub fn error(&mut self) -> Presence {
        self.degraded = true;
        self.error_presence()
    }

    fn error_presence(&self) -> Presence {
        Presence {
            activity: format!("Error Occurred ({})", format_elapsed(self.elapsed())),
            status: PresenceStatus::DoNotDisturb,
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
