//! HTML entity handling.
//!
//! Storage markup is XHTML but routinely carries HTML named entities that an
//! XML reader rejects. They are replaced with their characters before parsing;
//! the five XML entities are left for the reader.

use std::sync::LazyLock;

use regex::Regex;

static ENTITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&([a-zA-Z][a-zA-Z0-9]*);").expect("invalid entity regex"));

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("nbsp", "\u{00a0}"),
    ("ensp", "\u{2002}"),
    ("emsp", "\u{2003}"),
    ("thinsp", "\u{2009}"),
    ("zwj", "\u{200d}"),
    ("zwnj", "\u{200c}"),
    ("mdash", "\u{2014}"),
    ("ndash", "\u{2013}"),
    ("hellip", "\u{2026}"),
    ("bull", "\u{2022}"),
    ("middot", "\u{00b7}"),
    ("ldquo", "\u{201c}"),
    ("rdquo", "\u{201d}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("laquo", "\u{00ab}"),
    ("raquo", "\u{00bb}"),
    ("rarr", "\u{2192}"),
    ("larr", "\u{2190}"),
    ("harr", "\u{2194}"),
    ("uarr", "\u{2191}"),
    ("darr", "\u{2193}"),
    ("rArr", "\u{21d2}"),
    ("lArr", "\u{21d0}"),
    ("le", "\u{2264}"),
    ("ge", "\u{2265}"),
    ("ne", "\u{2260}"),
    ("asymp", "\u{2248}"),
    ("plusmn", "\u{00b1}"),
    ("times", "\u{00d7}"),
    ("divide", "\u{00f7}"),
    ("minus", "\u{2212}"),
    ("infin", "\u{221e}"),
    ("sum", "\u{2211}"),
    ("micro", "\u{00b5}"),
    ("deg", "\u{00b0}"),
    ("sup2", "\u{00b2}"),
    ("sup3", "\u{00b3}"),
    ("frac12", "\u{00bd}"),
    ("frac14", "\u{00bc}"),
    ("frac34", "\u{00be}"),
    ("copy", "\u{00a9}"),
    ("reg", "\u{00ae}"),
    ("trade", "\u{2122}"),
    ("sect", "\u{00a7}"),
    ("para", "\u{00b6}"),
    ("dagger", "\u{2020}"),
    ("euro", "\u{20ac}"),
    ("pound", "\u{00a3}"),
    ("yen", "\u{00a5}"),
    ("cent", "\u{00a2}"),
    ("iexcl", "\u{00a1}"),
    ("iquest", "\u{00bf}"),
    ("auml", "\u{00e4}"),
    ("ouml", "\u{00f6}"),
    ("uuml", "\u{00fc}"),
    ("Auml", "\u{00c4}"),
    ("Ouml", "\u{00d6}"),
    ("Uuml", "\u{00dc}"),
    ("szlig", "\u{00df}"),
    ("eacute", "\u{00e9}"),
    ("egrave", "\u{00e8}"),
    ("agrave", "\u{00e0}"),
    ("ccedil", "\u{00e7}"),
    ("ntilde", "\u{00f1}"),
    ("check", "\u{2713}"),
    ("cross", "\u{2717}"),
];

/// Replace HTML named entities with the characters they denote.
///
/// XML entities (`amp`, `lt`, `gt`, `quot`, `apos`) and unknown names are
/// left untouched.
pub(crate) fn convert_html_entities(html: &str) -> String {
    if !html.contains('&') {
        return html.to_owned();
    }
    ENTITY_PATTERN
        .replace_all(html, |caps: &regex::Captures| {
            lookup(&caps[1]).map_or_else(|| caps[0].to_owned(), str::to_owned)
        })
        .into_owned()
}

/// Decode an entity reference reported by the XML reader.
///
/// Unknown names are kept literally so no text is lost.
pub(crate) fn decode_entity(entity: &str) -> String {
    match entity {
        "lt" => "<".to_owned(),
        "gt" => ">".to_owned(),
        "amp" => "&".to_owned(),
        "apos" => "'".to_owned(),
        "quot" => "\"".to_owned(),
        s if s.starts_with('#') => {
            let code = if let Some(hex) = s.strip_prefix("#x").or_else(|| s.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                s[1..].parse::<u32>().ok()
            };
            code.and_then(char::from_u32)
                .map_or_else(|| format!("&{entity};"), |c| c.to_string())
        }
        other => lookup(other).map_or_else(|| format!("&{entity};"), str::to_owned),
    }
}

fn lookup(name: &str) -> Option<&'static str> {
    NAMED_ENTITIES
        .iter()
        .find(|(entity, _)| *entity == name)
        .map(|(_, ch)| *ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_entities_replaced() {
        assert_eq!(
            convert_html_entities("a&nbsp;b&mdash;c&rarr;d"),
            "a\u{a0}b\u{2014}c\u{2192}d"
        );
    }

    #[test]
    fn test_xml_entities_preserved() {
        assert_eq!(
            convert_html_entities("&lt;tag&gt; &amp; &quot;"),
            "&lt;tag&gt; &amp; &quot;"
        );
    }

    #[test]
    fn test_unknown_entity_preserved() {
        assert_eq!(convert_html_entities("&bogus;"), "&bogus;");
        assert_eq!(decode_entity("bogus"), "&bogus;");
    }

    #[test]
    fn test_numeric_references() {
        assert_eq!(decode_entity("#65"), "A");
        assert_eq!(decode_entity("#x41"), "A");
        assert_eq!(decode_entity("#xZZ"), "&#xZZ;");
    }
}
