use chrono::{DateTime, Local, NaiveDate, Utc};

/// Format a phone number for display.
/// Kenyan mobile numbers in local (07XX...) or international (2547XX...)
/// form are normalized to `+254 7XX XXX XXX`.
pub fn format_phone(phone: &str) -> String {
    match normalize_msisdn(phone) {
        Some(msisdn) => format!(
            "+{} {} {} {}",
            &msisdn[0..3],
            &msisdn[3..6],
            &msisdn[6..9],
            &msisdn[9..12]
        ),
        None => phone.to_string(), // Return original if can't format
    }
}

/// Phone number in the 12-digit `2547XXXXXXXX` form mobile-money
/// requests expect, or `None` if the input is not a mobile number.
pub fn normalize_msisdn(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    let national = match digits.len() {
        12 if digits.starts_with("254") => &digits[3..],
        10 if digits.starts_with('0') => &digits[1..],
        9 => &digits[..],
        _ => return None,
    };
    if national.starts_with('7') || national.starts_with('1') {
        Some(format!("254{}", national))
    } else {
        None
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: &Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Timestamp in the operator's local time zone.
pub fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

/// Compact duration such as `1h 25m` or `40m`.
pub fn format_duration(duration: chrono::Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    if minutes < 60 {
        format!("{}m", minutes)
    } else {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_phone() {
        assert_eq!(format_phone("0712345678"), "+254 712 345 678");
        assert_eq!(format_phone("254712345678"), "+254 712 345 678");
        assert_eq!(format_phone("+254 712-345-678"), "+254 712 345 678");
        assert_eq!(format_phone("0110345678"), "+254 110 345 678");
        assert_eq!(format_phone("123"), "123"); // Too short, return as-is
    }

    #[test]
    fn test_normalize_msisdn() {
        assert_eq!(normalize_msisdn("0712 345 678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_msisdn("0201234567"), None); // landline
        assert_eq!(normalize_msisdn(""), None);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::minutes(40)), "40m");
        assert_eq!(format_duration(chrono::Duration::minutes(85)), "1h 25m");
        assert_eq!(format_duration(chrono::Duration::minutes(-5)), "0m");
    }
}
