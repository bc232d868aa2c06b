//! Display formatting shared by the screens

use chrono::{DateTime, Utc};

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human readable size in binary units, two decimals above bytes: `"2.40 MB"`.
pub fn format_file_size(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, SIZE_UNITS[unit])
    }
}

/// Size label for an optional column
pub fn format_optional_size(bytes: Option<i64>) -> String {
    bytes.map(format_file_size).unwrap_or_else(|| "-".to_string())
}

/// Publish status label
pub fn status_label(is_published: bool) -> &'static str {
    if is_published {
        "Pubblicato"
    } else {
        "Nascosto"
    }
}

/// `m:ss`, or `h:mm:ss` from one hour up
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// `dd/mm/yyyy`
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Watched share of a video, 0..=100
pub fn progress_percent(progress_seconds: i64, duration_seconds: Option<i32>) -> u8 {
    match duration_seconds {
        Some(duration) if duration > 0 => {
            let percent = progress_seconds.max(0) as f64 * 100.0 / duration as f64;
            percent.min(100.0).round() as u8
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.00 KB");
        assert_eq!(format_file_size(2_516_582), "2.40 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_optional_size(None), "-");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3_725), "1:02:05");
    }

    #[test]
    fn labels_and_dates() {
        assert_eq!(status_label(true), "Pubblicato");
        assert_eq!(status_label(false), "Nascosto");
        let date = Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap();
        assert_eq!(format_date(&date), "07/03/2026");
    }

    #[test]
    fn percent_is_capped() {
        assert_eq!(progress_percent(150, Some(300)), 50);
        assert_eq!(progress_percent(400, Some(300)), 100);
        assert_eq!(progress_percent(10, None), 0);
    }
}
