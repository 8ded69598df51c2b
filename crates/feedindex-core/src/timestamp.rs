//! Time → score encoding.
//!
//! Scores are milliseconds since the Unix epoch (UTC). They are only ever
//! compared, never decoded back into dates.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Sort key of an index entry.
pub type Score = i64;

/// Anything a caller may pass where a point in time is expected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimeInput {
    /// A concrete instant.
    Instant(DateTime<Utc>),
    /// An already-encoded score, used verbatim.
    Score(Score),
    /// A date string (or an integer score rendered as text).
    Text(String),
    /// No value; resolves to the current time.
    #[default]
    Now,
}

impl From<DateTime<Utc>> for TimeInput {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Instant(t)
    }
}

impl From<NaiveDateTime> for TimeInput {
    fn from(t: NaiveDateTime) -> Self {
        Self::Instant(t.and_utc())
    }
}

impl From<Score> for TimeInput {
    fn from(s: Score) -> Self {
        Self::Score(s)
    }
}

impl From<i32> for TimeInput {
    fn from(s: i32) -> Self {
        Self::Score(Score::from(s))
    }
}

/// Finite values are truncated toward zero; NaN and infinities mean now.
impl From<f64> for TimeInput {
    fn from(v: f64) -> Self {
        float_score(v).map_or(Self::Now, Self::Score)
    }
}

impl From<&str> for TimeInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for TimeInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<TimeInput>> From<Option<T>> for TimeInput {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Now)
    }
}

/// Encode an instant as a score.
pub fn encode(time: &DateTime<Utc>) -> Score {
    time.timestamp_millis()
}

/// Score of the current instant.
pub fn now_score() -> Score {
    encode(&Utc::now())
}

/// Date-times carrying a UTC offset, beyond RFC 3339 / RFC 2822.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M%z",
];

/// Date-times without an offset, read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y%m%dT%H%M%S",
    "%B %d, %Y %H:%M:%S",
    "%d %B %Y %H:%M:%S",
];

/// Bare dates, read as midnight UTC.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%m/%d/%Y",
];

/// Best-effort conversion to an instant. Never fails: unparseable text and
/// non-time inputs fall back to now (UTC).
pub fn parse_best_effort(input: &TimeInput) -> DateTime<Utc> {
    match input {
        TimeInput::Instant(t) => *t,
        TimeInput::Text(s) => parse_text(s.trim()).unwrap_or_else(Utc::now),
        TimeInput::Score(_) | TimeInput::Now => Utc::now(),
    }
}

fn parse_text(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Some(t.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

fn float_score(v: f64) -> Option<Score> {
    v.is_finite().then(|| v.trunc() as Score)
}

/// Integer text, or decimal text truncated toward zero.
fn parse_number(s: &str) -> Option<Score> {
    s.parse::<Score>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(float_score))
}

/// Resolve any time-ish input to a score.
///
/// Raw scores and numeric text are used directly (decimals truncated toward
/// zero); everything else goes through [`parse_best_effort`]. An all-digit
/// string such as `"20240301"` is therefore a score, not a date.
pub fn resolve_score(input: &TimeInput) -> Score {
    match input {
        TimeInput::Score(s) => *s,
        TimeInput::Text(s) => {
            parse_number(s.trim()).unwrap_or_else(|| encode(&parse_best_effort(input)))
        }
        other => encode(&parse_best_effort(other)),
    }
}
