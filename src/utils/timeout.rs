//! Tick-budget constants for browser operations.

use std::time::Duration;

/// Single in-flight tab-follow tick budget (spec.md §5): on overrun the tick
/// is abandoned and the session's last state is kept.
pub const TAB_FOLLOW_TICK_BUDGET: Duration = Duration::from_millis(1_500);
