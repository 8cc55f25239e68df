//! Duration strings.

use std::time::Duration;

/// Parse a duration such as `"30s"`, `"5m"`, `"1h30m"` or `"250ms"`.
///
/// A bare integer is read as seconds. Units may be chained; each segment
/// must be a whole number followed by `ms`, `s`, `m`, `h` or `d`. Totals
/// past `u64::MAX` milliseconds are rejected.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total_millis: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("Invalid duration: {s}"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("Invalid number in duration: {s}"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let scale: u64 = match &rest[..unit_len] {
            "ms" => 1,
            "s" => 1000,
            "m" => 60 * 1000,
            "h" => 60 * 60 * 1000,
            "d" => 24 * 60 * 60 * 1000,
            "" => return Err(format!("Missing unit in duration: {s}")),
            unit => return Err(format!("Unknown unit: {unit}")),
        };
        rest = &rest[unit_len..];
        total_millis = value
            .checked_mul(scale)
            .and_then(|millis| total_millis.checked_add(millis))
            .ok_or_else(|| format!("Duration out of range: {s}"))?;
    }

    Ok(Duration::from_millis(total_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn test_bare_integer_is_seconds() {
        assert_eq!(parse_duration("3600").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 0 ").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_compound() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1m30s500ms").unwrap(), Duration::from_millis(90_500));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn test_rejects_overflow() {
        let err = parse_duration("9999999999999h").unwrap_err();
        assert!(err.starts_with("Duration out of range"), "{err}");
        assert!(parse_duration("99999999999999999999ms").is_err());
        assert!(parse_duration(&format!("{}ms1ms", u64::MAX)).is_err());
        assert_eq!(
            parse_duration(&format!("{}ms", u64::MAX)).unwrap(),
            Duration::from_millis(u64::MAX)
        );
    }
}
