use thiserror::Error;

/// Outcome of a rejected or failed bubble submission.
///
/// The first three variants are validation rejections surfaced to the
/// originating viewer only, never broadcast. `Storage` is the primary-write
/// failure; viewers see it as a generic submission failure while the detail
/// stays in the logs. Storage failures in later bookkeeping (history,
/// counters) are logged and swallowed instead of raised, and malformed
/// persisted entries are skipped during bulk reads — neither produces a
/// variant here. Nothing in this taxonomy is fatal to the process.
#[derive(Error, Debug, PartialEq)]
pub enum SubmitError {
    #[error("name, text and coordinates are required")]
    MissingFields,

    #[error("on cooldown for {remaining_seconds}s")]
    OnCooldown { remaining_seconds: u64 },

    #[error("coordinates out of range")]
    InvalidCoordinates,

    #[error("storage unavailable: {0}")]
    Storage(String),
}
