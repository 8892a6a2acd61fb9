pub mod api;
pub mod bubble;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod fanout;
pub mod history;
pub mod lifecycle;
pub mod metrics;
pub mod seeder;
pub mod store;

// Re-export commonly used types for easier testing
pub use crate::bubble::{Bubble, BubbleInput, BubbleKind, CoordMode};
pub use crate::config::{BubbleConfig, Config, SeedConfig};
pub use crate::cooldown::CooldownGuard;
pub use crate::error::SubmitError;
pub use crate::fanout::{Command, Hub, ServerEvent};
pub use crate::history::{HeatPoint, HistoryLog, Stats, StatsCounters};
pub use crate::lifecycle::{BubbleService, Origin};
pub use crate::store::EphemeralStore;
