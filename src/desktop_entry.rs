//! Grouped key/value reader for freedesktop desktop-entry files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const DESKTOP_ENTRY_GROUP: &str = "Desktop Entry";

#[derive(Debug, Default)]
pub struct DesktopEntryFile {
    groups: HashMap<String, HashMap<String, String>>,
}

impl DesktopEntryFile {
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut groups: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].to_string();
                groups.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let Some(group) = &current else { continue };
            if let Some((key, value)) = line.split_once('=') {
                // First occurrence wins
                groups
                    .entry(group.clone())
                    .or_default()
                    .entry(key.trim().to_string())
                    .or_insert_with(|| value.trim_start().to_string());
            }
        }

        Self { groups }
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Undecoded value.
    pub fn raw(&self, group: &str, key: &str) -> Option<&str> {
        self.groups.get(group)?.get(key).map(String::as_str)
    }

    pub fn string(&self, group: &str, key: &str) -> Option<String> {
        self.raw(group, key).map(unescape)
    }

    pub fn locale_string(&self, group: &str, key: &str, locale: &Locale) -> Option<String> {
        locale
            .lookup_keys(key)
            .iter()
            .find_map(|k| self.raw(group, k))
            .map(unescape)
    }

    pub fn boolean(&self, group: &str, key: &str) -> Option<bool> {
        match self.raw(group, key)?.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    pub fn list(&self, group: &str, key: &str) -> Option<Vec<String>> {
        self.raw(group, key).map(split_list)
    }

    pub fn locale_list(&self, group: &str, key: &str, locale: &Locale) -> Option<Vec<String>> {
        locale
            .lookup_keys(key)
            .iter()
            .find_map(|k| self.raw(group, k))
            .map(split_list)
    }
}

/// Decodes the `\s \n \t \r \\` escapes of string values. Unknown escapes are kept as-is.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Splits a `;` separated list, honouring `\;`, dropping empty items.
fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(';') => current.push(';'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            ';' => {
                let item = unescape(current.trim());
                if !item.is_empty() {
                    items.push(item);
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let item = unescape(current.trim());
    if !item.is_empty() {
        items.push(item);
    }
    items
}

/// Message locale as `lang_COUNTRY@MODIFIER`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locale {
    lang: Option<String>,
    country: Option<String>,
    modifier: Option<String>,
}

impl Locale {
    /// Reads `LC_ALL`, `LC_MESSAGES` and `LANG`, in that order.
    pub fn from_env() -> Self {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.is_empty())
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        let (rest, modifier) = match value.split_once('@') {
            Some((r, m)) => (r, Some(m.to_string())),
            None => (value, None),
        };
        let rest = rest.split('.').next().unwrap_or_default();
        if rest.is_empty() || rest == "C" || rest == "POSIX" {
            return Self::default();
        }
        let (lang, country) = match rest.split_once('_') {
            Some((l, c)) => (l.to_string(), Some(c.to_string())),
            None => (rest.to_string(), None),
        };
        Self {
            lang: Some(lang),
            country,
            modifier,
        }
    }

    /// Keys to try, most specific first, ending with the bare key.
    pub fn lookup_keys(&self, key: &str) -> Vec<String> {
        let mut keys = Vec::with_capacity(5);
        if let Some(lang) = &self.lang {
            match (&self.country, &self.modifier) {
                (Some(c), Some(m)) => {
                    keys.push(format!("{key}[{lang}_{c}@{m}]"));
                    keys.push(format!("{key}[{lang}_{c}]"));
                    keys.push(format!("{key}[{lang}@{m}]"));
                }
                (Some(c), None) => keys.push(format!("{key}[{lang}_{c}]")),
                (None, Some(m)) => keys.push(format!("{key}[{lang}@{m}]")),
                (None, None) => {}
            }
            keys.push(format!("{key}[{lang}]"));
        }
        keys.push(key.to_string());
        keys
    }

    pub fn language(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# comment
[Desktop Entry]
Type=Application
Name=Files
Name[de]=Dateien
Name[de_AT]=Dateien (AT)
Comment=Browse\\sthe file system
Keywords=folder;manager;explore\\;disk;
NoDisplay=false
Name=Ignored duplicate

[Desktop Action new-window]
Name=New Window
Exec=nautilus --new-window
";

    #[test]
    fn reads_groups_and_first_key_wins() {
        let file = DesktopEntryFile::parse(SAMPLE);
        assert!(file.has_group(DESKTOP_ENTRY_GROUP));
        assert!(file.has_group("Desktop Action new-window"));
        assert_eq!(file.string(DESKTOP_ENTRY_GROUP, "Name").as_deref(), Some("Files"));
        assert_eq!(
            file.string("Desktop Action new-window", "Exec").as_deref(),
            Some("nautilus --new-window")
        );
        assert_eq!(file.boolean(DESKTOP_ENTRY_GROUP, "NoDisplay"), Some(false));
        assert_eq!(file.boolean(DESKTOP_ENTRY_GROUP, "Terminal"), None);
    }

    #[test]
    fn decodes_string_escapes() {
        let file = DesktopEntryFile::parse(SAMPLE);
        assert_eq!(
            file.string(DESKTOP_ENTRY_GROUP, "Comment").as_deref(),
            Some("Browse the file system")
        );
        assert_eq!(unescape(r"a\\b\tc\q"), "a\\b\tc\\q");
    }

    #[test]
    fn lists_honour_escaped_separators() {
        let file = DesktopEntryFile::parse(SAMPLE);
        assert_eq!(
            file.list(DESKTOP_ENTRY_GROUP, "Keywords").unwrap(),
            vec!["folder", "manager", "explore;disk"]
        );
    }

    #[test]
    fn locale_strings_prefer_the_most_specific_key() {
        let file = DesktopEntryFile::parse(SAMPLE);
        let at = Locale::parse("de_AT.UTF-8");
        let ch = Locale::parse("de_CH.UTF-8");
        let fr = Locale::parse("fr_FR");
        assert_eq!(file.locale_string(DESKTOP_ENTRY_GROUP, "Name", &at).as_deref(), Some("Dateien (AT)"));
        assert_eq!(file.locale_string(DESKTOP_ENTRY_GROUP, "Name", &ch).as_deref(), Some("Dateien"));
        assert_eq!(file.locale_string(DESKTOP_ENTRY_GROUP, "Name", &fr).as_deref(), Some("Files"));
    }

    #[test]
    fn locale_parsing_strips_encoding_and_keeps_modifier() {
        let locale = Locale::parse("sr_RS.UTF-8@latin");
        assert_eq!(
            locale.lookup_keys("Name"),
            vec!["Name[sr_RS@latin]", "Name[sr_RS]", "Name[sr@latin]", "Name[sr]", "Name"]
        );
        assert_eq!(Locale::parse("C.UTF-8"), Locale::default());
        assert_eq!(Locale::default().lookup_keys("Name"), vec!["Name"]);
    }
}
