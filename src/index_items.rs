//! Flattens applications into the `(handle, string)` pairs the host matches against.

use crate::model::AppHandle;
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Either `[A-Z0-9]?[a-z]+` or a run of `[A-Z0-9]` not followed by `[a-z]`.
/// The trailing condition is applied in [`camel_case_split`].
static CAMEL_CASE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?<word>[A-Z0-9]?[a-z]+)|(?<caps>[A-Z0-9]+)").ok());

#[derive(Debug, Clone)]
pub struct IndexItem {
    pub app: AppHandle,
    pub string: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemOptions {
    pub split_camel_case: bool,
    pub use_acronyms: bool,
}

pub fn build_index_items(apps: &[AppHandle], options: ItemOptions) -> Vec<IndexItem> {
    let mut items = Vec::new();

    for app in apps {
        for name in &app.names {
            items.push(IndexItem {
                app: app.clone(),
                string: name.clone(),
            });

            if !options.split_camel_case && !options.use_acronyms {
                continue;
            }

            let words = camel_case_split(&strip_diacritics(name));

            if options.split_camel_case {
                let joined = words.join(" ");
                if !joined.is_empty() {
                    items.push(IndexItem {
                        app: app.clone(),
                        string: joined,
                    });
                }
            }

            if options.use_acronyms {
                let acronym: String = words.iter().filter_map(|w| w.chars().next()).collect();
                if acronym.chars().count() > 1 {
                    items.push(IndexItem {
                        app: app.clone(),
                        string: acronym,
                    });
                }
            }
        }
    }

    items
}

/// NFD form without combining diacritical marks (U+0300..U+036F).
pub fn strip_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !('\u{0300}'..='\u{036f}').contains(c)).collect()
}

pub fn camel_case_split(s: &str) -> Vec<String> {
    let Some(regex) = CAMEL_CASE.as_ref() else {
        return vec![s.to_string()];
    };
    let mut words = Vec::new();
    let mut pos = 0;

    while let Some(caps) = regex.captures_at(s, pos) {
        let Some(m) = caps.get(0) else { break };
        let mut end = m.end();

        // A capitals run gives back its last letter when lowercase follows ("HTMLParser").
        if caps.name("caps").is_some()
            && m.len() > 1
            && s[end..].starts_with(|c: char| c.is_ascii_lowercase())
        {
            end -= 1;
        }

        words.push(s[m.start()..end].to_string());
        pos = end;
    }

    words
}
