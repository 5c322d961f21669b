use crate::core::models::TrackedImage;
use crate::core::settings::PollingSettings;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Polling,
}

/// Decides whether the snapshot still needs a background poll.
pub fn evaluate(items: &[TrackedImage]) -> PollState {
    if items.iter().any(|item| !item.status.is_terminal()) {
        PollState::Polling
    } else {
        PollState::Idle
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_interval: Duration,
    pub backoff: bool,
}

impl PollConfig {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: false,
        }
    }
}

impl From<&PollingSettings> for PollConfig {
    fn from(settings: &PollingSettings) -> Self {
        if !settings.backoff {
            return Self::fixed(settings.interval());
        }
        Self {
            interval: settings.interval(),
            max_interval: settings.max_interval(),
            backoff: settings.backoff,
        }
    }
}
