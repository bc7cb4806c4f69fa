//! `{NAME}` placeholder substitution.
//!
//! A placeholder is an identifier (`[A-Za-z_][A-Za-z0-9_]*`) wrapped in braces. Anything
//! else, including shell variables such as `$HOME` or `${1}`-style positional forms,
//! is copied verbatim.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid");
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid");
}

/// Replace every well-formed placeholder in `text` with the value returned by `lookup`.
///
/// Keys for which `lookup` returns `None` resolve to the empty string.
pub fn substitute<'v, F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'v str>,
{
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_default().to_owned()
        })
        .into_owned()
}

/// Names referenced by the placeholders in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .collect()
}

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}
