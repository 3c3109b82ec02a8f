//! Change events, periodic snapshots, Kafka topic changes and the agent heartbeat

pub mod agent_info;
pub mod backup;
pub mod change;
pub mod kafka;

pub use agent_info::run_agent_info_loop;
pub use backup::BackupScheduler;
pub use change::{forward_change_events, ChangeDetector};
pub use kafka::{KafkaCollector, KafkaTopicLister, TopicLister};

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Interval whose first tick fires one period from now. Late ticks are
/// delayed rather than bunched.
pub(crate) fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
