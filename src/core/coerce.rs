//! Typed coercion of dynamically-typed settings values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use config::{Value, ValueKind};
use std::time::Duration;

use super::store::Table;

/// Conversion from a stored [`Value`] into a concrete type.
///
/// Coercion is lenient: a string `"8080"` coerces to an integer and `"yes"`
/// to `true`. A `None` result means the value cannot represent the type;
/// accessors then fall back to [`Default::default`].
pub trait Coerce: Sized {
    /// Attempt to coerce `value` into `Self`.
    fn coerce(value: Value) -> Option<Self>;
}

impl Coerce for String {
    fn coerce(value: Value) -> Option<Self> {
        value.into_string().ok()
    }
}

impl Coerce for i64 {
    fn coerce(value: Value) -> Option<Self> {
        value.into_int().ok()
    }
}

impl Coerce for f64 {
    fn coerce(value: Value) -> Option<Self> {
        value.into_float().ok()
    }
}

impl Coerce for bool {
    fn coerce(value: Value) -> Option<Self> {
        value.into_bool().ok()
    }
}

impl Coerce for Vec<String> {
    fn coerce(value: Value) -> Option<Self> {
        match value.kind {
            ValueKind::Array(items) => items
                .into_iter()
                .map(|item| item.into_string().ok())
                .collect(),
            ValueKind::String(s) => Some(s.split_whitespace().map(str::to_string).collect()),
            _ => None,
        }
    }
}

impl Coerce for Table {
    fn coerce(value: Value) -> Option<Self> {
        value.into_table().ok()
    }
}

impl Coerce for Duration {
    fn coerce(value: Value) -> Option<Self> {
        match value.kind {
            ValueKind::I64(n) => u64::try_from(n).ok().map(Duration::from_nanos),
            ValueKind::U64(n) => Some(Duration::from_nanos(n)),
            ValueKind::Float(f) if f >= 0.0 && f.is_finite() => {
                Some(Duration::from_nanos(f as u64))
            }
            ValueKind::String(s) => parse_duration(&s),
            _ => None,
        }
    }
}

impl Coerce for DateTime<Utc> {
    fn coerce(value: Value) -> Option<Self> {
        match value.kind {
            ValueKind::I64(secs) => DateTime::from_timestamp(secs, 0),
            ValueKind::U64(secs) => DateTime::from_timestamp(i64::try_from(secs).ok()?, 0),
            ValueKind::String(s) => parse_time(&s),
            _ => None,
        }
    }
}

/// Parse a Go-style duration string such as `300ms`, `1m30s` or `1h2m3.5s`.
///
/// A digit-only string is read as nanoseconds. Negative durations are
/// rejected because [`Duration`] cannot represent them.
pub(crate) fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<u64>().ok().map(Duration::from_nanos);
    }

    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest == "0" {
        return Some(Duration::ZERO);
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_num) = match after_int.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_len = after_num
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map_or(after_num.len(), |(idx, _)| idx);
        let (unit, tail) = after_num.split_at(unit_len);
        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return None,
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        total = total.checked_add(whole.checked_mul(scale)?)?;

        // Digits beyond nanosecond precision cannot contribute.
        let frac_digits = &frac_part[..frac_part.len().min(18)];
        if !frac_digits.is_empty() {
            let numerator: u128 = frac_digits.parse().ok()?;
            let denominator = 10u128.pow(frac_digits.len() as u32);
            total = total.checked_add(numerator * scale / denominator)?;
        }

        rest = tail;
    }

    u64::try_from(total).ok().map(Duration::from_nanos)
}

/// Parse a timestamp in RFC 3339 or one of the common naive layouts (UTC).
pub(crate) fn parse_time(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn string(s: &str) -> Value {
        Value::new(None, ValueKind::String(s.to_string()))
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2us"), Some(Duration::from_micros(2)));
        assert_eq!(parse_duration("2µs"), Some(Duration::from_micros(2)));
        assert_eq!(parse_duration(".5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_bare_integer_is_nanos() {
        assert_eq!(parse_duration("1500"), Some(Duration::from_nanos(1500)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("5 parsecs"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("10"), Some(Duration::from_nanos(10)));
        assert_eq!(parse_duration("10x"), None);
    }

    #[test]
    fn test_parse_time_layouts() {
        let expected = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_time("2023-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_time("2023-01-01 00:00:00"), Some(expected));
        assert_eq!(parse_time("2023-01-01"), Some(expected));
        assert_eq!(
            parse_time("2023-01-01T02:00:00+02:00"),
            Some(expected)
        );
        assert_eq!(parse_time("yesterday"), None);
    }

    #[test]
    fn test_coerce_scalars_from_strings() {
        assert_eq!(i64::coerce(string("8080")), Some(8080));
        assert_eq!(f64::coerce(string("1.5")), Some(1.5));
        assert_eq!(bool::coerce(string("true")), Some(true));
        assert_eq!(i64::coerce(string("eighty")), None);
    }

    #[test]
    fn test_coerce_string_slice() {
        let array = Value::new(
            None,
            ValueKind::Array(vec![string("one"), Value::from(2i64), string("three")]),
        );
        assert_eq!(
            Vec::<String>::coerce(array),
            Some(vec!["one".to_string(), "2".to_string(), "three".to_string()])
        );
        assert_eq!(
            Vec::<String>::coerce(string("a b  c")),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_coerce_time_from_unix_seconds() {
        let ts = DateTime::<Utc>::coerce(Value::from(0i64)).unwrap();
        assert_eq!(ts, DateTime::<Utc>::default());
    }

    proptest! {
        #[test]
        fn prop_compound_durations_sum(h in 0u64..100, m in 0u64..60, s in 0u64..60, ms in 0u64..1000) {
            let text = format!("{h}h{m}m{s}s{ms}ms");
            let expected = Duration::from_secs(h * 3600 + m * 60 + s) + Duration::from_millis(ms);
            prop_assert_eq!(parse_duration(&text), Some(expected));
        }

        #[test]
        fn prop_duration_parser_never_panics(input in "\\PC*") {
            let _ = parse_duration(&input);
        }
    }
}
