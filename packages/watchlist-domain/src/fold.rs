use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};
use unicode_script::{Script, UnicodeScript};

/// Case- and diacritic-folds a name so that index and query sides compare equal.
///
/// Latin diacritics are stripped. Cyrillic keeps its letters except for the diaeresis
/// (`ё` -> `е`, `ї` -> `і`), since the breve in `й` and `ў` is distinctive. Apostrophes vanish,
/// other punctuation becomes a space, and whitespace collapses to single spaces.
pub fn fold(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	let mut base_script = Script::Common;

	for ch in input.nfkc().flat_map(char::to_lowercase).nfd() {
		if is_zero_width(ch) || (ch.is_control() && !ch.is_whitespace()) {
			continue;
		}
		if is_combining_mark(ch) {
			if keeps_mark(base_script, ch) {
				out.push(ch);
			}

			continue;
		}
		if is_apostrophe(ch) {
			continue;
		}

		base_script = ch.script();

		if ch.is_alphanumeric() || ch == '-' {
			out.push(ch);
		} else {
			out.push(' ');
		}
	}

	let recomposed: String = out.as_str().nfc().collect();

	recomposed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when `a` and `b` fold to the same name.
pub fn same_name(a: &str, b: &str) -> bool {
	let left = fold(a);

	!left.is_empty() && left == fold(b)
}

fn keeps_mark(base_script: Script, mark: char) -> bool {
	base_script == Script::Cyrillic && mark != '\u{0308}'
}

fn is_apostrophe(ch: char) -> bool {
	matches!(ch, '\'' | '\u{2019}' | '\u{02BC}' | '`' | '\u{00B4}')
}

fn is_zero_width(ch: char) -> bool {
	matches!(
		ch,
		'\u{00AD}' // soft hyphen
			| '\u{034F}' // combining grapheme joiner
			| '\u{200B}' // zero width space
			| '\u{200C}' // zero width non-joiner
			| '\u{200D}' // zero width joiner
			| '\u{2060}' // word joiner
			| '\u{FEFF}' // zero width no-break space
	)
}

#[cfg(test)]
mod tests {
	use super::{fold, same_name};

	#[test]
	fn lowercases_and_collapses_whitespace() {
		assert_eq!(fold("  ИВАН   Петров "), "иван петров");
	}

	#[test]
	fn strips_latin_diacritics() {
		assert_eq!(fold("José Müller-Łukasz"), "jose muller-łukasz");
		assert_eq!(fold("Ãçé"), "ace");
	}

	#[test]
	fn folds_cyrillic_diaeresis_but_keeps_breve() {
		assert_eq!(fold("Пётр Андрей"), "петр андрей");
		assert_eq!(fold("Їжак"), "іжак");
	}

	#[test]
	fn drops_apostrophes_and_zero_width_chars() {
		assert_eq!(fold("Мар'яна"), "маряна");
		assert_eq!(fold("ива\u{200B}н"), "иван");
	}

	#[test]
	fn punctuation_becomes_space() {
		assert_eq!(fold("Petrov, Ivan."), "petrov ivan");
	}

	#[test]
	fn fullwidth_latin_is_normalized() {
		assert_eq!(fold("ＩＶＡＮ"), "ivan");
	}

	#[test]
	fn same_name_ignores_case_and_marks() {
		assert!(same_name("IVAN PÉTROV", "ivan petrov"));
		assert!(!same_name("", ""));
	}
}
