//! Stealth/fingerprint layer — spec.md §4.4, §4.5: Fingerprint Generator
//! (FG), Stealth Injector (SI), and the in-page Activity Tracker Script
//! (ATS) whose snapshot feeds the Tab-Follow Scheduler.

pub mod activity;
pub mod fingerprint;
pub mod injector;
pub mod platform;

pub use fingerprint::Fingerprint;
pub use platform::Platform;
