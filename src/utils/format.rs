/// Kilometres with two decimals, as shown on the walk summary card.
pub fn format_distance_km(meters: f64) -> String {
    format!("{:.2}", meters.max(0.0) / 1000.0)
}

/// Kilometres with one decimal, as shown in profile totals.
pub fn format_distance_km_short(meters: f64) -> String {
    format!("{:.1}", meters.max(0.0) / 1000.0)
}

/// `MM:SS`; minutes keep growing past 59 rather than rolling into hours.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Profile total walking time: `1h 2m`, or just `45m` under an hour.
/// Seconds are dropped.
pub fn format_total_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = seconds % 3600 / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
