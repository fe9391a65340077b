//! Small display helpers

use chrono::{DateTime, Utc};

/// Short username from an email address
pub fn short_name(email: &str) -> &str {
    email
        .split('@')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("User")
}

/// Human-readable presence age for the member list
pub fn presence_age(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - last_seen).num_seconds();

    if diff < 10 {
        "Active now".to_string()
    } else if diff < 60 {
        format!("Active {}s ago", diff)
    } else if diff < 3600 {
        format!("Active {}m ago", diff / 60)
    } else {
        format!("Active {}h ago", diff / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("alice@example.com"), "alice");
        assert_eq!(short_name("bare"), "bare");
        assert_eq!(short_name(""), "User");
    }

    #[test]
    fn test_presence_age_buckets() {
        let now = Utc::now();
        assert_eq!(presence_age(now - Duration::seconds(3), now), "Active now");
        assert_eq!(
            presence_age(now - Duration::seconds(42), now),
            "Active 42s ago"
        );
        assert_eq!(
            presence_age(now - Duration::seconds(150), now),
            "Active 2m ago"
        );
        assert_eq!(
            presence_age(now - Duration::seconds(7500), now),
            "Active 2h ago"
        );
    }

    #[test]
    fn test_presence_age_tolerates_clock_skew() {
        let now = Utc::now();
        // A heartbeat stamped slightly in the future still reads as active
        assert_eq!(presence_age(now + Duration::seconds(5), now), "Active now");
    }
}
