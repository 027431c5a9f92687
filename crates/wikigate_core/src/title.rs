use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::Serialize;

/// Characters MediaWiki refuses in page titles.
/// See <https://meta.wikimedia.org/wiki/Help:Page_name#Restrictions>.
pub const ILLEGAL_TITLE_CHARS: &[char] = &['#', '<', '>', '[', ']', '|', '{', '}'];

// Form-style escaping: only ASCII alphanumerics and `_ . - ~` stay literal.
const URI_ESCAPE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

const ENCODED_COLON: &str = "%3A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleParts<'a> {
    pub title: &'a str,
    pub namespace: Option<&'a str>,
    pub name: &'a str,
    pub legal: bool,
    pub base: &'a str,
    pub parent: Option<&'a str>,
    pub subpage: &'a str,
    pub uri: String,
}

/// Root page of a wiki-form title, namespace included.
///
/// `"Namespace:Foo/Bar/Baz"` -> `"Namespace:Foo"`; titles without a `/` are
/// returned unchanged.
pub fn base_name(title: &str) -> &str {
    title.split('/').next().unwrap_or(title)
}

/// Parent path of a subpage, split on the last `/` only.
///
/// `"Namespace:Foo/Bar/Baz"` -> `Some("Namespace:Foo/Bar")`; `None` when the
/// title has no `/`.
pub fn path_to_subpage(title: &str) -> Option<&str> {
    title.rsplit_once('/').map(|(parent, _)| parent)
}

/// Leaf segment of a wiki-form title, or the whole title when there is no
/// hierarchy above it.
///
/// A trailing `/` yields an empty leaf (`"Foo/"` -> `""`), so the parent path,
/// a `/` and the leaf always rebuild the title.
pub fn subpage(title: &str) -> &str {
    title.rsplit_once('/').map_or(title, |(_, leaf)| leaf)
}

/// Convert a URL-form page name (`"getting_there_%26_away"`) into wiki
/// display form (`"Getting there & away"`).
///
/// Underscores become spaces, illegal title characters are dropped and the
/// first character is uppercased. Malformed escapes are kept as-is and
/// invalid UTF-8 is replaced, so this never fails.
pub fn uri_to_wiki(uri: &str) -> String {
    let spaced = unescape(uri).replace('_', " ");
    upcase_first(&strip_illegal_chars(&spaced))
}

/// Convert a wiki-form page name (`"Getting there & away"`) into URL form
/// (`"Getting_there_%26_away"`) without mangling `/` or `:`.
///
/// Each `/` segment is decoded before it is encoded, so already-encoded input
/// is normalized rather than double-escaped. Empty segments are preserved.
pub fn wiki_to_uri(wiki: impl fmt::Display) -> String {
    let wiki = wiki.to_string();
    wiki.split('/')
        .map(|segment| escape(&unescape(segment).replace(' ', "_")))
        .collect::<Vec<_>>()
        .join("/")
        .replace(ENCODED_COLON, ":")
}

/// Uppercase the first character using the full Unicode case mapping.
/// A single character may expand, e.g. `ß` becomes `SS`.
pub fn upcase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn strip_illegal_chars(text: &str) -> String {
    text.chars()
        .filter(|ch| !ILLEGAL_TITLE_CHARS.contains(ch))
        .collect()
}

pub fn is_legal_title(title: &str) -> bool {
    !title.contains(ILLEGAL_TITLE_CHARS)
}

/// Namespace prefix of a title (`"Talk"` for `"Talk:Foo/Bar"`).
///
/// Only a non-empty prefix before the first `:` that starts with an uppercase
/// letter and does not cross a subpage boundary counts.
pub fn namespace(title: &str) -> Option<&str> {
    let (prefix, _) = title.split_once(':')?;
    if prefix.is_empty() || prefix.contains('/') {
        return None;
    }
    prefix
        .chars()
        .next()
        .filter(|first| first.is_uppercase())
        .map(|_| prefix)
}

pub fn title_without_namespace(title: &str) -> &str {
    match namespace(title) {
        Some(prefix) => &title[prefix.len() + 1..],
        None => title,
    }
}

pub fn decompose(title: &str) -> TitleParts<'_> {
    TitleParts {
        title,
        namespace: namespace(title),
        name: title_without_namespace(title),
        legal: is_legal_title(title),
        base: base_name(title),
        parent: path_to_subpage(title),
        subpage: subpage(title),
        uri: wiki_to_uri(title),
    }
}

// `+` is a space in form encoding; `%2B` still decodes to a literal plus.
fn unescape(value: &str) -> String {
    let plus_as_space = value.replace('+', " ");
    percent_decode_str(&plus_as_space)
        .decode_utf8_lossy()
        .into_owned()
}

fn escape(value: &str) -> String {
    utf8_percent_encode(value, URI_ESCAPE_SET).to_string()
}
