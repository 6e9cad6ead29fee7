/// Parses `HH:MM` into minutes since midnight. Returns `None` on anything
/// malformed; callers are expected to validate input upstream.
pub fn time_to_minutes(value: &str) -> Option<u32> {
    let (hour_str, minute_str) = value.split_once(':')?;
    let hours = hour_str.parse::<u32>().ok()?;
    let minutes = minute_str.parse::<u32>().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Formats minutes since midnight as zero-padded `HH:MM`. Inputs are expected
/// in `[0, 1440)`; wraparound is the caller's responsibility.
pub fn minutes_to_time(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
