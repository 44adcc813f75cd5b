//! Shared utility modules — no feature gating.
pub mod constants;
pub mod timeout;
