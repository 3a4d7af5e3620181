use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Symbols stripped from search keywords. Commas, periods, colons and
/// hyphens are kept because catalog names lean on them ("Op. 93", "M. Ward").
pub const SYMBOLS: &str = r##"!"#$%&'()*+/;<=>?@[\]^_`{|}~"##;

static SYMBOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("[{}]", regex::escape(SYMBOLS))).unwrap()
});

static WHITESPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// Canonicalize a free-text keyword using a single space as delimiter.
///
/// `"Björk"` becomes `"Bjork"`, `"Sallie Ford & The Sound Outside"` becomes
/// `"Sallie Ford The Sound Outside"`.
pub fn normalize(text: &str) -> String {
    normalize_with(text, ' ')
}

/// Canonicalize a keyword: drop combining diacritics, replace symbols with
/// `delimiter`, collapse whitespace runs and trim the delimiter from both ends.
///
/// Decomposition runs first so that removing a mark can never leave a fresh
/// whitespace run behind; this keeps the function idempotent.
pub fn normalize_with(text: &str, delimiter: char) -> String {
    let stripped: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();

    let mut buf = [0u8; 4];
    let delim: &str = delimiter.encode_utf8(&mut buf);

    let replaced = SYMBOL_RE.replace_all(&stripped, delim);
    let collapsed = WHITESPACE_RUN_RE.replace_all(&replaced, delim);
    collapsed.trim_matches(delimiter).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(normalize("Björk"), "Bjork");
        assert_eq!(normalize("Málaga"), "Malaga");
        assert_eq!(normalize("Dvořák"), "Dvorak");
    }

    #[test]
    fn test_replaces_symbols() {
        assert_eq!(normalize("Sallie Ford & The Sound Outside"), "Sallie Ford The Sound Outside");
        assert_eq!(normalize("Walkin' After Midnight"), "Walkin After Midnight");
        assert_eq!(normalize("(Live) [Remaster]"), "Live Remaster");
    }

    #[test]
    fn test_keeps_punctuation_catalogs_use() {
        assert_eq!(normalize("M. Ward"), "M. Ward");
        assert_eq!(normalize("Rimsky-Korsakov"), "Rimsky-Korsakov");
        assert_eq!(
            normalize("Symphony No.8 in F-major, Op.93: II. Allegro scherzando"),
            "Symphony No.8 in F-major, Op.93: II. Allegro scherzando"
        );
    }

    #[test]
    fn test_collapses_and_trims_whitespace() {
        assert_eq!(normalize("  Mazzy    Star  "), "Mazzy Star");
        assert_eq!(normalize("a\t\tb"), "a b");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("&&&"), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_custom_delimiter() {
        assert_eq!(normalize_with("Mazzy Star & Hope", '-'), "Mazzy Star - Hope");
        assert_eq!(normalize_with("a&b", '_'), "a_b");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Björk",
            "  Sallie Ford & The Sound Outside ",
            "a \u{0301} b",
            "é&&  ü",
            "\t(x)\t",
            "Beethoven: The Complete Symphonies",
            "",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_output_has_no_symbols() {
        let out = normalize(&format!("{SYMBOLS} Interpol"));
        assert!(!out.chars().any(|c| SYMBOLS.contains(c)));
        assert_eq!(out, "Interpol");
    }
}
