//! Per-locale message templates with positional placeholders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A message translated into several locales.
///
/// Serialized as a plain map from locale code to template:
///
/// ```json
/// { "en": "You have been banned for %1.", "de": "Du wurdest für %1 gesperrt." }
/// ```
///
/// Templates may contain `%1`, `%2`, ... which [`format`](Self::format)
/// replaces with positional arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// A text with a single template under `locale`.
    pub fn single(locale: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new().with(locale, template)
    }

    /// Adds or replaces the template for `locale`.
    pub fn with(mut self, locale: impl Into<String>, template: impl Into<String>) -> Self {
        self.0.insert(locale.into(), template.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Template for `locale`, else for `default_locale`.
    pub fn resolve(&self, locale: Option<&str>, default_locale: &str) -> Option<&str> {
        locale
            .and_then(|code| self.0.get(code))
            .or_else(|| self.0.get(default_locale))
            .map(String::as_str)
    }

    /// Resolves the template and substitutes `%N` with `args[N - 1]`.
    ///
    /// Placeholders with no matching argument are left as written.
    pub fn format(&self, locale: Option<&str>, default_locale: &str, args: &[&str]) -> Option<String> {
        self.resolve(locale, default_locale)
            .map(|template| substitute(template, args))
    }
}

fn substitute(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut end = start + 1;
        while let Some(&(i, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = i + d.len_utf8();
            chars.next();
        }
        let digits = &template[start + 1..end];
        match digits.parse::<usize>() {
            Ok(n) if n >= 1 && n <= args.len() => out.push_str(args[n - 1]),
            _ => out.push_str(&template[start..end]),
        }
    }
    out
}
