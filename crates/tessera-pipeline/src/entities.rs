//! HTML entity decoding for text operations.

/// Decode named and numeric HTML character references.
///
/// Named references use the full HTML5 table, so `K&ouml;ln` and
/// `&euro;5` come out as `Köln` and `€5`. Anything unrecognized is left
/// as written.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_named_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("&lt;b&gt;"), "<b>");
        assert_eq!(decode_entities("&quot;hi&quot;"), "\"hi\"");
    }

    #[test]
    fn non_ascii_named_entities() {
        assert_eq!(decode_entities("K&ouml;ln"), "Köln");
        assert_eq!(decode_entities("Stra&szlig;e"), "Straße");
        assert_eq!(decode_entities("&euro;5"), "€5");
        assert_eq!(decode_entities("&copy; 2024"), "© 2024");
        assert_eq!(decode_entities("a&nbsp;b"), "a\u{a0}b");
    }

    #[test]
    fn numeric_entities() {
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("caf&#233;"), "café");
    }

    #[test]
    fn unknown_entities_pass_through() {
        assert_eq!(decode_entities("a &bogus; b"), "a &bogus; b");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
    }

    #[test]
    fn decoding_is_single_pass() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }
}
