//! Business-hours descriptors.
//!
//! Two grammars are accepted:
//!
//! * free text, e.g. `"Mon-Fri: 8:00 AM - 5:00 PM ET"`, `"Saturday 9am to 1pm"`,
//!   or `"24/7"`;
//! * compact codes, e.g. `"M_F_8_17"` or `"S_S_24"`.
//!
//! Minutes are interpreted in the local wall-clock time of the evaluating
//! environment. The timezone label is carried for display only and is never
//! used to shift the window.
//!
//! # Compact day codes
//!
//! | code | start of range | end of range |
//! |------|----------------|--------------|
//! | `M`, `MO` | Monday | Monday |
//! | `T`, `TU` | Tuesday | Tuesday |
//! | `W`, `WE` | Wednesday | Wednesday |
//! | `R`, `TH` | Thursday | Thursday |
//! | `F`, `FR` | Friday | Friday |
//! | `S` | Sunday | Saturday |
//! | `U`, `SU` | Sunday | Sunday |
//! | `SA` | Saturday | Saturday |
//!
//! Weeks run Sunday through Saturday. A range whose start falls after its
//! end in that order would wrap the week and is rejected.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use regex::Regex;
use serde::{Serialize, Serializer};
use tracing::debug;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Days of the week in display order.
pub const WEEK: [Weekday; 7] = [
	Weekday::Sun,
	Weekday::Mon,
	Weekday::Tue,
	Weekday::Wed,
	Weekday::Thu,
	Weekday::Fri,
	Weekday::Sat,
];

static COMPACT_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^(?P<d1>[A-Za-z]{1,2})_(?P<d2>[A-Za-z]{1,2})_(?P<h1>\d{1,2})(?:_(?P<h2>\d{1,2}))?$").expect("COMPACT_RE should compile"));

static FREE_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r"(?ix)^
		(?P<d1>[a-z]+)\.?
		(?:\s*(?:-|–|—|to|through|thru)\s*(?P<d2>[a-z]+)\.?)?
		\s*[:,]?\s*
		(?P<h1>\d{1,2})(?::(?P<m1>\d{2}))?\s*(?P<ap1>[ap])\.?\s*m\.?
		\s*(?:-|–|—|to)\s*
		(?P<h2>\d{1,2})(?::(?P<m2>\d{2}))?\s*(?P<ap2>[ap])\.?\s*m\.?
		(?:\s+(?P<tz>[a-z]{1,5}))?
		$",
	)
	.expect("FREE_TEXT_RE should compile")
});

static ALWAYS_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)^(?:24\s*/\s*7|24\s*x\s*7|24\s*hours(?:\s*,?\s*7\s*days(?:\s*a\s*week)?)?)$").expect("ALWAYS_OPEN_RE should compile")
});

/// Set of weekdays.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DaySet(u8);

impl DaySet {
	pub const EMPTY: DaySet = DaySet(0);
	pub const ALL: DaySet = DaySet(0b111_1111);

	fn bit(day: Weekday) -> u8 {
		1 << day.num_days_from_sunday()
	}

	/// Inclusive range in Sunday-first order; `None` when it would wrap.
	pub fn range(start: Weekday, end: Weekday) -> Option<Self> {
		let (from, to) = (start.num_days_from_sunday(), end.num_days_from_sunday());
		if from > to {
			return None;
		}
		Some(WEEK[from as usize..=to as usize].iter().copied().collect())
	}

	pub fn insert(&mut self, day: Weekday) {
		self.0 |= Self::bit(day);
	}

	pub fn contains(self, day: Weekday) -> bool {
		self.0 & Self::bit(day) != 0
	}

	pub fn len(self) -> usize {
		self.0.count_ones() as usize
	}

	pub fn is_empty(self) -> bool {
		self.0 == 0
	}

	/// Days in Sunday-first order.
	pub fn iter(self) -> impl Iterator<Item = Weekday> {
		WEEK.into_iter().filter(move |day| self.contains(*day))
	}
}

impl FromIterator<Weekday> for DaySet {
	fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
		let mut set = DaySet::EMPTY;
		for day in iter {
			set.insert(day);
		}
		set
	}
}

impl fmt::Debug for DaySet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.iter()).finish()
	}
}

impl Serialize for DaySet {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_seq(self.iter().map(day_name))
	}
}

/// Which end of a compact day range a code occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEnd {
	Start,
	End,
}

/// Resolves a compact day code. `S` depends on its position.
pub fn day_code(code: &str, position: RangeEnd) -> Option<Weekday> {
	match code.to_ascii_uppercase().as_str() {
		"M" | "MO" => Some(Weekday::Mon),
		"T" | "TU" => Some(Weekday::Tue),
		"W" | "WE" => Some(Weekday::Wed),
		"R" | "TH" => Some(Weekday::Thu),
		"F" | "FR" => Some(Weekday::Fri),
		"U" | "SU" => Some(Weekday::Sun),
		"SA" => Some(Weekday::Sat),
		"S" => Some(match position {
			RangeEnd::Start => Weekday::Sun,
			RangeEnd::End => Weekday::Sat,
		}),
		_ => None,
	}
}

/// Full English name of a weekday.
pub fn day_name(day: Weekday) -> &'static str {
	match day {
		Weekday::Mon => "Monday",
		Weekday::Tue => "Tuesday",
		Weekday::Wed => "Wednesday",
		Weekday::Thu => "Thursday",
		Weekday::Fri => "Friday",
		Weekday::Sat => "Saturday",
		Weekday::Sun => "Sunday",
	}
}

/// Resolves a free-text day name: a full name, an unambiguous prefix of at
/// least two letters, or a common abbreviation.
fn parse_day_name(name: &str) -> Option<Weekday> {
	let lower = name.to_ascii_lowercase();
	if lower == "weds" {
		return Some(Weekday::Wed);
	}
	if lower.len() < 2 {
		return None;
	}
	let mut matches = WEEK.into_iter().filter(|day| day_name(*day).to_ascii_lowercase().starts_with(&lower));
	let first = matches.next()?;
	if matches.next().is_some() {
		return None;
	}
	Some(first)
}

/// Normalized weekday + time-of-day window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessHoursSpec {
	days_of_week: DaySet,
	start_minute: u16,
	end_minute: u16,
	timezone_label: String,
	is_24x7: bool,
}

impl BusinessHoursSpec {
	/// A same-day window on `days`. `None` unless `start < end < 1440` and
	/// at least one day is given.
	pub fn window(days: DaySet, start_minute: u16, end_minute: u16, timezone_label: impl Into<String>) -> Option<Self> {
		if days.is_empty() || start_minute >= end_minute || end_minute >= MINUTES_PER_DAY {
			return None;
		}
		Some(Self {
			days_of_week: days,
			start_minute,
			end_minute,
			timezone_label: timezone_label.into(),
			is_24x7: false,
		})
	}

	pub fn always_open(timezone_label: impl Into<String>) -> Self {
		Self {
			days_of_week: DaySet::ALL,
			start_minute: 0,
			end_minute: 0,
			timezone_label: timezone_label.into(),
			is_24x7: true,
		}
	}

	/// Parses either grammar. Returns `None` on empty or unrecognized input.
	pub fn parse(raw: &str) -> Option<Self> {
		let trimmed = raw.trim();
		if trimmed.is_empty() {
			return None;
		}

		let parsed = if COMPACT_RE.is_match(trimmed) {
			parse_compact(trimmed)
		} else if ALWAYS_OPEN_RE.is_match(trimmed) {
			Some(Self::always_open(""))
		} else {
			parse_free_text(trimmed)
		};

		if parsed.is_none() {
			debug!(target = "mchat.hours", raw = %trimmed, "unrecognized business hours descriptor");
		}
		parsed
	}

	/// True when `now` (local wall-clock) falls inside the window.
	pub fn is_open(&self, now: NaiveDateTime) -> bool {
		if self.is_24x7 {
			return true;
		}
		let minute = (now.hour() * 60 + now.minute()) as u16;
		self.days_of_week.contains(now.weekday()) && self.start_minute <= minute && minute < self.end_minute
	}

	/// Human-readable rendering in Sunday-first day order, e.g.
	/// `"Monday - Friday, 8 AM - 5 PM ET"`.
	pub fn describe(&self) -> String {
		if self.is_24x7 {
			return "24 hours, 7 days a week".to_string();
		}
		let mut out = format!(
			"{}, {} - {}",
			describe_days(self.days_of_week),
			format_minute(self.start_minute),
			format_minute(self.end_minute)
		);
		if !self.timezone_label.is_empty() {
			out.push(' ');
			out.push_str(&self.timezone_label);
		}
		out
	}

	pub fn days_of_week(&self) -> DaySet {
		self.days_of_week
	}

	pub fn start_minute(&self) -> u16 {
		self.start_minute
	}

	pub fn end_minute(&self) -> u16 {
		self.end_minute
	}

	pub fn timezone_label(&self) -> &str {
		&self.timezone_label
	}

	pub fn is_24x7(&self) -> bool {
		self.is_24x7
	}
}

impl fmt::Display for BusinessHoursSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.describe())
	}
}

fn parse_compact(raw: &str) -> Option<BusinessHoursSpec> {
	let caps = COMPACT_RE.captures(raw)?;
	let start = day_code(&caps["d1"], RangeEnd::Start)?;
	let end = day_code(&caps["d2"], RangeEnd::End)?;
	let days = DaySet::range(start, end)?;
	let first: u16 = caps["h1"].parse().ok()?;

	let Some(second) = caps.name("h2") else {
		// `<D>_<D>_24` is the 24x7 marker; the day codes are only validated.
		return (first == 24).then(|| BusinessHoursSpec::always_open(""));
	};
	let second: u16 = second.as_str().parse().ok()?;
	if first > 23 || second > 23 {
		return None;
	}
	BusinessHoursSpec::window(days, first * 60, second * 60, "")
}

fn parse_free_text(raw: &str) -> Option<BusinessHoursSpec> {
	let caps = FREE_TEXT_RE.captures(raw)?;
	let start_day = parse_day_name(&caps["d1"])?;
	let end_day = match caps.name("d2") {
		Some(name) => parse_day_name(name.as_str())?,
		None => start_day,
	};
	let days = DaySet::range(start_day, end_day)?;

	let start = clock_to_minutes(&caps["h1"], caps.name("m1").map(|m| m.as_str()), &caps["ap1"])?;
	let end = clock_to_minutes(&caps["h2"], caps.name("m2").map(|m| m.as_str()), &caps["ap2"])?;
	let timezone = caps.name("tz").map(|tz| tz.as_str().to_ascii_uppercase()).unwrap_or_default();

	BusinessHoursSpec::window(days, start, end, timezone)
}

/// Converts a 12-hour clock reading to minutes since midnight.
fn clock_to_minutes(hour: &str, minute: Option<&str>, meridiem: &str) -> Option<u16> {
	let hour: u16 = hour.parse().ok()?;
	let minute: u16 = minute.map(str::parse::<u16>).transpose().ok()?.unwrap_or(0);
	if !(1..=12).contains(&hour) || minute >= 60 {
		return None;
	}
	let pm = meridiem.eq_ignore_ascii_case("p");
	Some((hour % 12 + if pm { 12 } else { 0 }) * 60 + minute)
}

fn format_minute(minute: u16) -> String {
	let (hour, mins) = (minute / 60, minute % 60);
	let (display_hour, suffix) = match hour {
		0 => (12, "AM"),
		1..=11 => (hour, "AM"),
		12 => (12, "PM"),
		_ => (hour - 12, "PM"),
	};
	if mins == 0 {
		format!("{display_hour} {suffix}")
	} else {
		format!("{display_hour}:{mins:02} {suffix}")
	}
}

fn describe_days(days: DaySet) -> String {
	let mut runs: Vec<(Weekday, Weekday)> = Vec::new();
	for day in days.iter() {
		match runs.last_mut() {
			Some((_, end)) if end.succ() == day => *end = day,
			_ => runs.push((day, day)),
		}
	}
	let mut parts = Vec::new();
	for (start, end) in runs {
		// Only runs of three or more days collapse into a range.
		if end.num_days_from_sunday() - start.num_days_from_sunday() >= 2 {
			parts.push(format!("{} - {}", day_name(start), day_name(end)));
		} else {
			let mut day = start;
			loop {
				parts.push(day_name(day).to_string());
				if day == end {
					break;
				}
				day = day.succ();
			}
		}
	}
	parts.join(", ")
}
