//! Time periods with absolute or now-relative bounds
//!
//! A [`TimePeriod`] is a half-open interval `[start, end)` whose bounds are
//! either fixed instants or signed offsets from "now". Relative bounds are
//! resolved lazily, every time the period is compared, so the same relative
//! period can resolve to different instants over time. Once a period is handed
//! to a storage tier it is [`anchored`](TimePeriod::anchored) to absolute
//! instants and never drifts again.
//!
//! Every period also carries a validity window (`first_allowed`,
//! `last_allowed`). The defaults span from 1869-01-01 up to twenty years and
//! five days past the current moment.
//!
//! All resolved instants are harmonised to whole minutes.

use crate::storage::error::{StorageError, StorageResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Earliest moment allowed by default (first digitised station records)
pub const DEFAULT_FIRST_ALLOWED: (i32, u32, u32) = (1869, 1, 1);

/// Default distance between "now" and the last moment allowed, in days
pub const DEFAULT_LAST_ALLOWED_DAYS: i64 = 20 * 365 + 5;

const DISPLAY_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Truncate an instant to whole minutes
fn harmonize(instant: DateTime<Utc>) -> DateTime<Utc> {
    let secs = instant.timestamp();
    let floored = secs - secs.rem_euclid(60);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(instant)
}

/// One bound of a period: a fixed instant or an offset from evaluation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeBound {
    Absolute(DateTime<Utc>),
    Relative(Duration),
}

impl TimeBound {
    /// Fixed instant, truncated to the minute
    pub fn absolute(instant: DateTime<Utc>) -> Self {
        TimeBound::Absolute(harmonize(instant))
    }

    /// Offset from "now", truncated to whole minutes
    pub fn relative(offset: Duration) -> Self {
        TimeBound::Relative(Duration::minutes(offset.num_minutes()))
    }

    /// The current moment
    pub fn now() -> Self {
        TimeBound::Relative(Duration::zero())
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self, TimeBound::Absolute(_))
    }

    /// Resolve against the given "now"
    pub fn resolve_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeBound::Absolute(instant) => *instant,
            TimeBound::Relative(offset) => {
                let base = harmonize(now);
                base.checked_add_signed(*offset).unwrap_or(if *offset > Duration::zero() {
                    DateTime::<Utc>::MAX_UTC
                } else {
                    DateTime::<Utc>::MIN_UTC
                })
            }
        }
    }

    /// Resolve against the system clock
    pub fn resolve(&self) -> DateTime<Utc> {
        self.resolve_at(Utc::now())
    }

    /// Parse a bound from text
    ///
    /// Accepted forms:
    /// - `now`
    /// - signed or unsigned offsets: `-7d`, `+12h`, `30m`, `2w`, `1y`
    ///   (`m` = minutes, `y` = 365 days)
    /// - `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM`, `YYYY-MM-DD HH:MM`, RFC 3339
    pub fn parse(s: &str) -> StorageResult<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("now") {
            return Ok(Self::now());
        }

        if let Some(offset) = parse_offset(s) {
            return offset.map(Self::relative);
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::absolute(dt.with_timezone(&Utc)));
        }

        for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self::absolute(Utc.from_utc_datetime(&naive)));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self::absolute(Utc.from_utc_datetime(&naive)));
            }
        }

        Err(StorageError::InvalidPeriod(format!(
            "cannot parse time bound '{}'. Use: now, -7d, +12h, 2024-01-31, 2024-01-31T06:00 or RFC 3339",
            s
        )))
    }
}

/// `None` when `s` is not shaped like an offset at all
fn parse_offset(s: &str) -> Option<StorageResult<Duration>> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => (1, s),
    };

    let unit = rest.chars().last()?;
    if !unit.is_ascii_alphabetic() {
        return None;
    }
    let amount: i64 = rest[..rest.len() - unit.len_utf8()].parse().ok()?;
    let amount = amount.checked_mul(sign);

    let offset = match unit.to_ascii_lowercase() {
        'm' => amount.and_then(Duration::try_minutes),
        'h' => amount.and_then(Duration::try_hours),
        'd' => amount.and_then(Duration::try_days),
        'w' => amount.and_then(Duration::try_weeks),
        'y' => amount
            .and_then(|a| a.checked_mul(365))
            .and_then(Duration::try_days),
        _ => return None,
    };
    Some(offset.ok_or_else(|| {
        StorageError::InvalidPeriod(format!("offset '{}' is out of range", s))
    }))
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBound::Absolute(instant) => write!(f, "{}", instant.format(DISPLAY_FORMAT)),
            TimeBound::Relative(offset) if *offset == Duration::zero() => write!(f, "now"),
            TimeBound::Relative(offset) => {
                let minutes = offset.num_minutes();
                let sign = if minutes < 0 { '-' } else { '+' };
                write!(f, "{}{}m", sign, minutes.abs())
            }
        }
    }
}

impl From<TimeBound> for String {
    fn from(bound: TimeBound) -> Self {
        match bound {
            // Full RFC 3339 keeps the value lossless through serialization
            TimeBound::Absolute(instant) => instant.to_rfc3339(),
            relative => relative.to_string(),
        }
    }
}

impl TryFrom<String> for TimeBound {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TimeBound::parse(&value)
    }
}

impl From<DateTime<Utc>> for TimeBound {
    fn from(instant: DateTime<Utc>) -> Self {
        TimeBound::absolute(instant)
    }
}

impl From<Duration> for TimeBound {
    fn from(offset: Duration) -> Self {
        TimeBound::relative(offset)
    }
}

/// A half-open time interval `[start, end)` with a validity window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimePeriod {
    start: TimeBound,
    end: TimeBound,
    first_allowed: TimeBound,
    last_allowed: TimeBound,
}

impl TimePeriod {
    /// Default validity window bounds
    pub fn default_window() -> (TimeBound, TimeBound) {
        let (y, m, d) = DEFAULT_FIRST_ALLOWED;
        let first = Utc
            .with_ymd_and_hms(y, m, d, 0, 0, 0)
            .single()
            .map(TimeBound::Absolute)
            .unwrap_or(TimeBound::Absolute(DateTime::<Utc>::MIN_UTC));
        let last = TimeBound::Relative(Duration::days(DEFAULT_LAST_ALLOWED_DAYS));
        (first, last)
    }

    /// The whole default validity window as a period
    pub fn default_validity_window() -> Self {
        let (first, last) = Self::default_window();
        Self {
            start: first,
            end: last,
            first_allowed: first,
            last_allowed: last,
        }
    }

    /// Create a period inside the default validity window
    pub fn new(start: impl Into<TimeBound>, end: impl Into<TimeBound>) -> StorageResult<Self> {
        let (first, last) = Self::default_window();
        Self::with_window(start, end, first, last)
    }

    /// Create a period with an explicit validity window
    pub fn with_window(
        start: impl Into<TimeBound>,
        end: impl Into<TimeBound>,
        first_allowed: impl Into<TimeBound>,
        last_allowed: impl Into<TimeBound>,
    ) -> StorageResult<Self> {
        let period = Self {
            start: start.into(),
            end: end.into(),
            first_allowed: first_allowed.into(),
            last_allowed: last_allowed.into(),
        };
        period.validate_at(Utc::now())?;
        Ok(period)
    }

    /// Create an absolute period inside the default validity window
    pub fn absolute(start: DateTime<Utc>, end: DateTime<Utc>) -> StorageResult<Self> {
        Self::new(TimeBound::absolute(start), TimeBound::absolute(end))
    }

    /// Parse both bounds with [`TimeBound::parse`]
    pub fn parse(start: &str, end: &str) -> StorageResult<Self> {
        Self::new(TimeBound::parse(start)?, TimeBound::parse(end)?)
    }

    /// Check the period invariants against a given "now"
    pub fn validate_at(&self, now: DateTime<Utc>) -> StorageResult<()> {
        let (start, end) = self.resolve_at(now);
        let first = self.first_allowed.resolve_at(now);
        let last = self.last_allowed.resolve_at(now);

        if start >= end {
            return Err(StorageError::InvalidPeriod(format!(
                "start ({}) must lie before end ({})",
                start.format(DISPLAY_FORMAT),
                end.format(DISPLAY_FORMAT)
            )));
        }
        if !(first <= start && start < last) {
            return Err(StorageError::InvalidPeriod(format!(
                "start ({}) must lie within [{}, {})",
                start.format(DISPLAY_FORMAT),
                first.format(DISPLAY_FORMAT),
                last.format(DISPLAY_FORMAT)
            )));
        }
        if !(first < end && end <= last) {
            return Err(StorageError::InvalidPeriod(format!(
                "end ({}) must lie within ({}, {}]",
                end.format(DISPLAY_FORMAT),
                first.format(DISPLAY_FORMAT),
                last.format(DISPLAY_FORMAT)
            )));
        }
        Ok(())
    }

    /// Whether the period still satisfies its invariants right now
    ///
    /// Relative periods can drift out of their window as time passes.
    pub fn is_valid(&self) -> bool {
        self.validate_at(Utc::now()).is_ok()
    }

    /// Internal constructor for derived periods; callers guarantee validity
    fn derived(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: TimeBound::Absolute(start),
            end: TimeBound::Absolute(end),
            first_allowed: self.first_allowed,
            last_allowed: self.last_allowed,
        }
    }

    /// Sub-period of `self` with absolute bounds; `None` if empty or outside `self`
    pub fn slice(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        let (own_start, own_end) = self.resolve();
        let start = harmonize(start).max(own_start);
        let end = harmonize(end).min(own_end);
        (start < end).then(|| self.derived(start, end))
    }

    /// Resolved `(start, end)` at a given "now"
    pub fn resolve_at(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start.resolve_at(now), self.end.resolve_at(now))
    }

    /// Resolved `(start, end)` at the current moment
    pub fn resolve(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.resolve_at(Utc::now())
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start.resolve()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end.resolve()
    }

    pub fn start_millis(&self) -> i64 {
        self.start().timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end().timestamp_millis()
    }

    pub fn first_allowed(&self) -> DateTime<Utc> {
        self.first_allowed.resolve()
    }

    pub fn last_allowed(&self) -> DateTime<Utc> {
        self.last_allowed.resolve()
    }

    /// The bounds as given at construction, possibly relative
    pub fn original_bounds(&self) -> (TimeBound, TimeBound) {
        (self.start, self.end)
    }

    pub fn is_absolute(&self) -> bool {
        self.start.is_absolute() && self.end.is_absolute()
    }

    /// Freeze relative bounds against `now`; the window is kept as is
    pub fn anchored(&self, now: DateTime<Utc>) -> Self {
        let (start, end) = self.resolve_at(now);
        self.derived(start, end)
    }

    pub fn duration(&self) -> Duration {
        let (start, end) = self.resolve();
        end - start
    }

    /// Same resolved start and end, ignoring windows and bound kinds
    pub fn same_span(&self, other: &TimePeriod) -> bool {
        let now = Utc::now();
        self.resolve_at(now) == other.resolve_at(now)
    }

    /// Check whether an instant lies in `[start, end)`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let (start, end) = self.resolve();
        start <= instant && instant < end
    }

    /// Check whether `other` lies entirely inside this period
    pub fn contains_period(&self, other: &TimePeriod) -> bool {
        let now = Utc::now();
        let (start, end) = self.resolve_at(now);
        let (other_start, other_end) = other.resolve_at(now);
        start <= other_start && other_end <= end
    }

    /// True when the periods share at least one instant
    pub fn overlaps(&self, other: &TimePeriod) -> bool {
        self.overlap(other).is_some()
    }

    /// True when the periods overlap or touch end-to-start
    pub fn touches(&self, other: &TimePeriod) -> bool {
        let now = Utc::now();
        let (start, end) = self.resolve_at(now);
        let (other_start, other_end) = other.resolve_at(now);
        start.max(other_start) <= end.min(other_end)
    }

    /// Intersection of two periods, `None` when it would be empty
    pub fn overlap(&self, other: &TimePeriod) -> Option<TimePeriod> {
        let now = Utc::now();
        let (start, end) = self.resolve_at(now);
        let (other_start, other_end) = other.resolve_at(now);

        let lo = start.max(other_start);
        let hi = end.min(other_end);
        (lo < hi).then(|| self.derived(lo, hi))
    }

    /// Join two overlapping or adjacent periods
    ///
    /// Disjoint periods have no single-interval union; callers needing a set
    /// union keep a list of periods instead.
    pub fn union(&self, other: &TimePeriod) -> StorageResult<TimePeriod> {
        let now = Utc::now();
        let (start, end) = self.resolve_at(now);
        let (other_start, other_end) = other.resolve_at(now);

        if start.max(other_start) > end.min(other_end) {
            return Err(StorageError::DisjointPeriods(
                self.to_string(),
                other.to_string(),
            ));
        }

        let (first_allowed, last_allowed) = if self.first_allowed == other.first_allowed
            && self.last_allowed == other.last_allowed
        {
            (self.first_allowed, self.last_allowed)
        } else {
            (
                TimeBound::Absolute(
                    self.first_allowed
                        .resolve_at(now)
                        .min(other.first_allowed.resolve_at(now)),
                ),
                TimeBound::Absolute(
                    self.last_allowed
                        .resolve_at(now)
                        .max(other.last_allowed.resolve_at(now)),
                ),
            )
        };

        Ok(TimePeriod {
            start: TimeBound::Absolute(start.min(other_start)),
            end: TimeBound::Absolute(end.max(other_end)),
            first_allowed,
            last_allowed,
        })
    }

    /// Subtract `other` from this period
    ///
    /// Returns `self` (anchored) when disjoint, one piece when `other` covers
    /// an edge, two pieces when `other` punches a hole, nothing when `other`
    /// covers everything.
    pub fn difference(&self, other: &TimePeriod) -> Vec<TimePeriod> {
        let now = Utc::now();
        let (start, end) = self.resolve_at(now);
        let (other_start, other_end) = other.resolve_at(now);

        if other_end <= start || other_start >= end {
            return vec![self.derived(start, end)];
        }

        let mut pieces = Vec::with_capacity(2);
        if start < other_start {
            pieces.push(self.derived(start, other_start));
        }
        if other_end < end {
            pieces.push(self.derived(other_end, end));
        }
        pieces
    }

    /// Subtract a list of periods, returning the ordered remainders
    pub fn difference_all<'a>(
        &self,
        others: impl IntoIterator<Item = &'a TimePeriod>,
    ) -> Vec<TimePeriod> {
        let mut remaining = vec![*self];
        for other in others {
            remaining = remaining
                .iter()
                .flat_map(|piece| piece.difference(other))
                .collect();
            if remaining.is_empty() {
                break;
            }
        }
        remaining.sort_by_key(|p| p.start());
        remaining
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.resolve();
        write!(
            f,
            "[{} - {})",
            start.format(DISPLAY_FORMAT),
            end.format(DISPLAY_FORMAT)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(start: &str, end: &str) -> TimePeriod {
        TimePeriod::parse(start, end).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        TimeBound::parse(s).unwrap().resolve()
    }

    #[test]
    fn test_huge_offsets_are_invalid() {
        for text in ["9999999999999999d", "-99999999999999999y", "+9223372036854775807w"] {
            assert!(
                matches!(TimeBound::parse(text), Err(StorageError::InvalidPeriod(_))),
                "{} should be rejected",
                text
            );
        }
        // still in range: a thousand years back
        assert!(TimeBound::parse("-1000y").is_ok());

        let decoded: Result<TimeBound, _> = serde_json::from_str("\"99999999999999999y\"");
        assert!(decoded.is_err());
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!(TimeBound::parse("now").unwrap(), TimeBound::now());
        assert_eq!(
            TimeBound::parse("-7d").unwrap(),
            TimeBound::Relative(Duration::days(-7))
        );
        assert_eq!(
            TimeBound::parse("+12h").unwrap(),
            TimeBound::Relative(Duration::hours(12))
        );
        assert_eq!(
            TimeBound::parse("30m").unwrap(),
            TimeBound::Relative(Duration::minutes(30))
        );
        assert_eq!(
            TimeBound::parse("2022-01-01").unwrap(),
            TimeBound::Absolute(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            TimeBound::parse("2022-01-01T06:30").unwrap(),
            TimeBound::Absolute(Utc.with_ymd_and_hms(2022, 1, 1, 6, 30, 0).unwrap())
        );
        assert!(TimeBound::parse("yesterday-ish").is_err());
    }

    #[test]
    fn test_bounds_harmonized_to_minutes() {
        let bound = TimeBound::parse("2022-01-01T06:30:45+00:00").unwrap();
        assert_eq!(
            bound.resolve(),
            Utc.with_ymd_and_hms(2022, 1, 1, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_bound_string_roundtrip() {
        for text in ["2022-03-04T05:06:00+00:00", "-90m", "+2d", "now"] {
            let bound = TimeBound::parse(text).unwrap();
            let back = TimeBound::try_from(String::from(bound)).unwrap();
            assert_eq!(bound, back);
        }
    }

    #[test]
    fn test_invalid_periods_rejected() {
        // start after end
        assert!(matches!(
            TimePeriod::parse("2022-12-31", "2022-01-01"),
            Err(StorageError::InvalidPeriod(_))
        ));
        // zero width
        assert!(TimePeriod::parse("2022-01-01", "2022-01-01").is_err());
        // before the first allowed moment
        assert!(TimePeriod::parse("1850-01-01", "1870-01-01").is_err());
        // beyond the last allowed moment
        assert!(TimePeriod::parse("2022-01-01", "+30y").is_err());
        // explicit window
        assert!(TimePeriod::with_window(
            TimeBound::parse("2019-01-01").unwrap(),
            TimeBound::parse("2019-06-01").unwrap(),
            TimeBound::parse("2020-01-01").unwrap(),
            TimeBound::parse("2024-01-01").unwrap(),
        )
        .is_err());
    }

    #[test]
    fn test_relative_period_resolution() {
        let period = TimePeriod::parse("-2d", "now").unwrap();
        assert!(!period.is_absolute());
        assert_eq!(period.duration(), Duration::days(2));

        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap();
        let (start, end) = period.resolve_at(now);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 4, 29, 12, 0, 0).unwrap());

        let anchored = period.anchored(now);
        assert!(anchored.is_absolute());
        assert_eq!(anchored.start(), start);
        assert_eq!(anchored.end(), end);
    }

    #[test]
    fn test_overlap() {
        let a = p("2022-01-01", "2022-12-31");
        let b = p("2022-06-01", "2022-06-30");
        assert_eq!(a.overlap(&b), Some(b));

        let c = p("2022-01-01", "2022-03-01");
        let d = p("2022-02-01", "2022-04-01");
        assert_eq!(c.overlap(&d), Some(p("2022-02-01", "2022-03-01")));

        // adjacent periods do not overlap
        let e = p("2022-03-01", "2022-04-01");
        assert_eq!(c.overlap(&e), None);
        assert!(c.touches(&e));
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let pairs = [
            (p("2022-01-01", "2022-06-01"), p("2022-03-01", "2022-09-01")),
            (p("2022-01-01", "2022-02-01"), p("2022-05-01", "2022-06-01")),
            (p("2022-01-01", "2023-01-01"), p("2022-05-01", "2022-06-01")),
        ];
        for (a, b) in pairs {
            assert_eq!(a.overlap(&b), b.overlap(&a));
        }
    }

    #[test]
    fn test_union() {
        let a = p("2022-01-01", "2022-06-30");
        let b = p("2022-06-01", "2022-12-31");
        let joined = a.union(&b).unwrap();
        assert_eq!(joined, p("2022-01-01", "2022-12-31"));
        assert!(joined.contains_period(&a));
        assert!(joined.contains_period(&b));

        // adjacent is allowed
        let c = p("2022-12-31", "2023-02-01");
        assert_eq!(b.union(&c).unwrap(), p("2022-06-01", "2023-02-01"));

        // disjoint is not
        let d = p("2023-06-01", "2023-07-01");
        assert!(matches!(
            a.union(&d),
            Err(StorageError::DisjointPeriods(_, _))
        ));
    }

    #[test]
    fn test_difference_cases() {
        let a = p("2022-01-01", "2022-12-31");

        // disjoint: unchanged
        let outside = p("2023-01-01", "2023-02-01");
        assert_eq!(a.difference(&outside), vec![a]);

        // edge: one trimmed piece
        let edge = p("2021-06-01", "2022-03-01");
        assert_eq!(a.difference(&edge), vec![p("2022-03-01", "2022-12-31")]);

        // interior: a hole
        let hole = p("2022-06-01", "2022-07-01");
        assert_eq!(
            a.difference(&hole),
            vec![p("2022-01-01", "2022-06-01"), p("2022-07-01", "2022-12-31")]
        );

        // fully covered: nothing left
        let cover = p("2021-01-01", "2023-06-01");
        assert!(a.difference(&cover).is_empty());
    }

    #[test]
    fn test_difference_then_union_reconstructs() {
        let a = p("2022-01-01", "2022-12-31");
        let b = p("2022-04-01", "2022-05-01");

        let common = a.overlap(&b).unwrap();
        let mut rebuilt = common;
        for piece in a.difference(&b) {
            rebuilt = rebuilt.union(&piece).unwrap();
        }
        assert!(rebuilt.same_span(&a));
    }

    #[test]
    fn test_difference_all() {
        let a = p("2022-01-01", "2022-12-31");
        let holes = [p("2022-02-01", "2022-03-01"), p("2022-06-01", "2022-07-01")];
        assert_eq!(
            a.difference_all(holes.iter()),
            vec![
                p("2022-01-01", "2022-02-01"),
                p("2022-03-01", "2022-06-01"),
                p("2022-07-01", "2022-12-31"),
            ]
        );
    }

    #[test]
    fn test_contains() {
        let period = p("2022-01-01", "2022-12-31");
        assert!(period.contains(at("2022-01-01")));
        assert!(period.contains(at("2022-06-01")));
        assert!(!period.contains(at("2022-12-31")));
        assert!(period.contains_period(&p("2022-06-01", "2022-06-30")));
        assert!(!period.contains_period(&p("2022-06-01", "2023-06-30")));
    }

    #[test]
    fn test_slice() {
        let period = p("2022-01-01", "2022-12-31");
        let sliced = period.slice(at("2021-01-01"), at("2022-02-01")).unwrap();
        assert_eq!(sliced, p("2022-01-01", "2022-02-01"));
        assert!(period.slice(at("2023-01-01"), at("2023-02-01")).is_none());
    }

    #[test]
    fn test_display() {
        let period = p("2022-01-01", "2022-12-31");
        assert_eq!(period.to_string(), "[2022-01-01T00:00 - 2022-12-31T00:00)");
    }

    #[test]
    fn test_period_serde_roundtrip() {
        let period = p("2022-01-01", "2022-12-31");
        let json = serde_json::to_string(&period).unwrap();
        let restored: TimePeriod = serde_json::from_str(&json).unwrap();
        assert_eq!(period, restored);
    }
}
