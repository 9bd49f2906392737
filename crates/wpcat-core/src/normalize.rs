//! Title normalization.
//!
//! Classifiers echo titles back with altered quoting, whitespace and entity
//! encoding. Matching their answers to posts goes through [`normalize_title`]
//! on both sides.

/// Canonical form of a title used only as a matching key.
///
/// Decodes `&amp;`, straightens typographic quotes, collapses whitespace runs,
/// trims and lowercases.
///
/// Lowercasing happens first and `&amp;` is decoded to a fixed point, so the
/// result is stable under a second application (`&AMP;amp;` included).
pub fn normalize_title(title: &str) -> String {
    let mut decoded = title.to_lowercase();
    while decoded.contains("&amp;") {
        decoded = decoded.replace("&amp;", "&");
    }

    let straightened: String = decoded
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            other => other,
        })
        .collect();

    straightened.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_title("  Hello   World "), "hello world");
    }

    #[test]
    fn test_normalize_entity() {
        assert_eq!(normalize_title("Salt &amp; Pepper"), "salt & pepper");
        assert_eq!(
            normalize_title("Salt &amp; Pepper"),
            normalize_title("Salt & Pepper")
        );
    }

    #[test]
    fn test_normalize_quote_variants() {
        let curly = "Caf&amp;eacute; \u{201C}Life\u{201D}";
        let straight = "Caf&eacute;   \"Life\"";
        assert_eq!(normalize_title(curly), normalize_title(straight));

        assert_eq!(
            normalize_title("Don\u{2019}t Stop"),
            normalize_title("don't stop")
        );
    }

    #[test]
    fn test_normalize_mixed_whitespace() {
        assert_eq!(normalize_title("a\t\tb\n c"), "a b c");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "",
            "   ",
            "Plain",
            "Caf&amp;amp; \u{201C}Life\u{201D}",
            "Tom &amp; Jerry\u{2019}s  \u{201E}Big\u{201F} Day",
            "\u{2018}quoted\u{2019}\n\tline",
            "MIXED case &AMP; Stuff",
        ];
        for s in samples {
            let once = normalize_title(s);
            assert_eq!(normalize_title(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_normalize_keeps_distinct_titles_distinct() {
        assert_ne!(normalize_title("Part 1"), normalize_title("Part 2"));
        assert_ne!(normalize_title("news"), normalize_title("new s"));
    }
}
