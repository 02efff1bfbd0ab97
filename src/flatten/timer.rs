//! Fallback timer helpers
//!
//! The fallback timer is the only timeout in the lifecycle. It starts when an
//! entity becomes COMPRESSED, restarts on renewed contact and otherwise only
//! ever counts down.

use crate::core::config::ConfigSource;
use crate::core::types::TICKS_PER_SECOND;

/// Value stored when the fallback is switched off (0 configured seconds)
pub const FALLBACK_DISABLED: i32 = -1;

/// Fresh countdown from the configured timeout
pub fn initialize_timer(fallback_timeout_seconds: i32) -> i32 {
    if fallback_timeout_seconds <= 0 {
        return FALLBACK_DISABLED;
    }
    fallback_timeout_seconds.saturating_mul(TICKS_PER_SECOND)
}

/// Restart the countdown from whatever the configuration says right now
pub fn reset_timer(config: &dyn ConfigSource) -> i32 {
    initialize_timer(config.current().fallback_timeout_seconds)
}

/// One tick of countdown, floored at zero
pub fn tick(current: i32) -> i32 {
    if current <= 0 {
        0
    } else {
        current - 1
    }
}
