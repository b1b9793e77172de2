use serde::{Deserialize, Serialize};
use unicode_script::{Script, UnicodeScript};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
	Ru,
	Uk,
	En,
}
impl Language {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ru => "ru",
			Self::Uk => "uk",
			Self::En => "en",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"ru" | "rus" | "russian" => Some(Self::Ru),
			"uk" | "ukr" | "ua" | "ukrainian" => Some(Self::Uk),
			"en" | "eng" | "english" => Some(Self::En),
			_ => None,
		}
	}
}

/// Guesses the language of a screened text.
///
/// Letters unique to Ukrainian settle it outright. Otherwise the dominant script decides between
/// Latin and Cyrillic, and `whatlang` breaks the Cyrillic tie only when it is reliable.
pub fn detect(input: &str) -> Option<Language> {
	let mut latin = 0usize;
	let mut cyrillic = 0usize;

	for ch in input.chars() {
		if matches!(ch, 'і' | 'ї' | 'є' | 'ґ' | 'І' | 'Ї' | 'Є' | 'Ґ') {
			return Some(Language::Uk);
		}

		match ch.script() {
			Script::Latin => latin += 1,
			Script::Cyrillic => cyrillic += 1,
			_ => {},
		}
	}

	if latin == 0 && cyrillic == 0 {
		return None;
	}
	if latin > cyrillic {
		return Some(Language::En);
	}

	match whatlang::detect(input) {
		Some(info) if info.is_reliable() && info.lang() == whatlang::Lang::Ukr => Some(Language::Uk),
		_ => Some(Language::Ru),
	}
}

#[cfg(test)]
mod tests {
	use super::{Language, detect};

	#[test]
	fn ukrainian_letters_win() {
		assert_eq!(detect("Олександр Ковальчук, місто Київ"), Some(Language::Uk));
	}

	#[test]
	fn cyrillic_defaults_to_russian() {
		assert_eq!(detect("Иван Петров"), Some(Language::Ru));
	}

	#[test]
	fn latin_is_english() {
		assert_eq!(detect("Payment to John Smith"), Some(Language::En));
	}

	#[test]
	fn digits_only_is_unknown() {
		assert_eq!(detect("12345 / 678"), None);
	}

	#[test]
	fn parses_aliases() {
		assert_eq!(Language::parse("UA"), Some(Language::Uk));
		assert_eq!(Language::parse("english"), Some(Language::En));
		assert_eq!(Language::parse("de"), None);
	}
}
