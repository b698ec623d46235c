use chrono::{DateTime, Utc};

pub const DEFAULT_COOLDOWN_DAYS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameChangeStatus {
    pub can_change: bool,
    pub days_remaining: i64,
}

/// Whole days elapsed since the last change decide; partial days do not count.
pub fn can_change_display_name(
    last_change: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_days: i64,
) -> NameChangeStatus {
    let Some(last) = last_change else {
        return NameChangeStatus {
            can_change: true,
            days_remaining: 0,
        };
    };
    // A change stamped in the future (clock skew) counts as made just now.
    let elapsed = (now - last).num_days().max(0);
    if elapsed >= cooldown_days {
        NameChangeStatus {
            can_change: true,
            days_remaining: 0,
        }
    } else {
        NameChangeStatus {
            can_change: false,
            days_remaining: cooldown_days - elapsed,
        }
    }
}
