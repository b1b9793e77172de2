use std::sync::OnceLock;

use regex::Regex;
use time::{Date, Month};

const DATE_PATTERN: &str =
	r"\b(?:(\d{4})[-./](\d{1,2})[-./](\d{1,2})|(\d{1,2})[-./](\d{1,2})[-./](\d{4}))\b";
const ID_PATTERN: &str = r"\b[\p{L}\d][\p{L}\d\-]{4,}[\p{L}\d]\b";

/// Dates found in free text, as ISO `YYYY-MM-DD`, deduplicated in order of appearance.
///
/// Day-first forms (`01.02.1980`, `01/02/1980`) and year-first forms (`1980-02-01`) are read.
/// Impossible calendar dates are skipped.
pub fn extract_dates(text: &str) -> Vec<String> {
	let Some(re) = compiled(&DATE_RE, DATE_PATTERN) else {
		return Vec::new();
	};
	let mut out = Vec::new();

	for caps in re.captures_iter(text) {
		let parts = if let (Some(y), Some(m), Some(d)) = (caps.get(1), caps.get(2), caps.get(3)) {
			(y.as_str(), m.as_str(), d.as_str())
		} else if let (Some(d), Some(m), Some(y)) = (caps.get(4), caps.get(5), caps.get(6)) {
			(y.as_str(), m.as_str(), d.as_str())
		} else {
			continue;
		};

		if let Some(date) = iso_date(parts.0, parts.1, parts.2)
			&& !out.contains(&date)
		{
			out.push(date);
		}
	}

	out
}

/// Normalizes a stored date of birth to ISO form, if it parses.
pub fn normalize_date(raw: &str) -> Option<String> {
	extract_dates(raw).into_iter().next()
}

/// Identifier-like tokens (passport, tax, registry numbers) normalized by [`normalize_id`].
///
/// A token qualifies when it carries at least one digit and six or more alphanumerics.
pub fn extract_ids(text: &str) -> Vec<String> {
	let Some(re) = compiled(&ID_RE, ID_PATTERN) else {
		return Vec::new();
	};
	let dates = extract_dates(text);
	let mut out = Vec::new();

	for found in re.find_iter(text) {
		let id = normalize_id(found.as_str());

		if id.chars().count() < 6 || !id.chars().any(|ch| ch.is_ascii_digit()) {
			continue;
		}
		if dates.iter().any(|date| date.replace('-', "") == id) {
			continue;
		}
		if !out.contains(&id) {
			out.push(id);
		}
	}

	out
}

/// Uppercases and strips separators so `ab-12 34 56` and `AB123456` compare equal.
pub fn normalize_id(raw: &str) -> String {
	raw.chars().filter(|ch| ch.is_alphanumeric()).flat_map(char::to_uppercase).collect()
}

static DATE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static ID_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn compiled(slot: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
	slot.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn iso_date(year: &str, month: &str, day: &str) -> Option<String> {
	let year: i32 = year.parse().ok()?;
	let month: u8 = month.parse().ok()?;
	let day: u8 = day.parse().ok()?;
	let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;

	Some(format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day()))
}

#[cfg(test)]
mod tests {
	use super::{extract_dates, extract_ids, normalize_date, normalize_id};

	#[test]
	fn reads_day_first_and_year_first_dates() {
		let dates = extract_dates("born 01.02.1980, renewed 2020-12-31 and 31/12/2020");

		assert_eq!(dates, vec!["1980-02-01", "2020-12-31"]);
	}

	#[test]
	fn skips_impossible_dates() {
		assert!(extract_dates("31.02.1980").is_empty());
		assert_eq!(normalize_date("1975-7-4"), Some("1975-07-04".to_string()));
	}

	#[test]
	fn extracts_ids_with_digits() {
		let ids = extract_ids("passport AB-123456, invoice 42, name Petrov");

		assert_eq!(ids, vec!["AB123456"]);
	}

	#[test]
	fn dates_are_not_ids() {
		assert!(extract_ids("1980-02-01").is_empty());
	}

	#[test]
	fn normalizes_ids() {
		assert_eq!(normalize_id("ab-12 34 56"), "AB123456");
	}
}
