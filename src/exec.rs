//! `Exec` value handling: argv tokenization and field-code expansion.

use crate::error::ExecError;
use crate::model::IconSpec;
use std::path::Path;
use url::Url;

pub const COMMAND_PREFIX_VAR: &str = "ALBERT_APPLICATIONS_COMMAND_PREFIX";

/// Splits an `Exec` value into argv tokens.
///
/// Whitespace separates tokens unless it is inside double quotes. Within quotes only
/// `\"`, `` \` ``, `\$` and `\\` are valid escapes. Outside quotes a backslash makes
/// the next character literal.
pub fn split_exec(s: &str) -> Result<Vec<String>, ExecError> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
            }
            '"' => loop {
                match chars.next() {
                    None => return Err(ExecError::UnterminatedQuote),
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        None => return Err(ExecError::TrailingBackslash),
                        Some(e @ ('"' | '`' | '$' | '\\')) => token.push(e),
                        Some(e) => return Err(ExecError::InvalidQuotedEscape(e)),
                    },
                    Some(other) => token.push(other),
                }
            },
            '\\' => match chars.next() {
                None => return Err(ExecError::TrailingBackslash),
                Some(e) => token.push(e),
            },
            _ => token.push(c),
        }
    }

    if !token.is_empty() {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Record data field codes can refer to.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    pub name: &'a str,
    pub icon: Option<&'a IconSpec>,
    pub source_path: &'a Path,
}

/// Expands XDG field codes. Tokens without codes pass through unchanged.
pub fn expand_field_codes(exec: &[String], url: Option<&str>, ctx: &FieldContext<'_>) -> Vec<String> {
    let mut out = Vec::with_capacity(exec.len());
    for token in exec {
        match token.as_str() {
            "%%" => out.push("%".to_string()),
            "%f" | "%F" => {
                if let Some(path) = url.and_then(local_path) {
                    out.push(path);
                }
            }
            "%u" | "%U" => {
                if let Some(url) = url {
                    out.push(url.to_string());
                }
            }
            "%i" => {
                if let Some(icon) = ctx.icon {
                    out.push("--icon".to_string());
                    out.push(icon.to_arg());
                }
            }
            "%c" => out.push(ctx.name.to_string()),
            "%k" => out.push(ctx.source_path.to_string_lossy().into_owned()),
            "%v" | "%m" | "%d" | "%D" | "%n" | "%N" => {} // deprecated
            _ => out.push(token.clone()),
        }
    }
    out
}

/// Local filesystem path for a `file:` URL or a plain absolute path.
fn local_path(url: &str) -> Option<String> {
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "file" => parsed
            .to_file_path()
            .ok()
            .map(|p| p.to_string_lossy().into_owned()),
        Ok(_) => None,
        Err(_) if Path::new(url).is_absolute() => Some(url.to_string()),
        Err(_) => None,
    }
}

pub fn parse_command_prefix(value: &str) -> Vec<String> {
    value
        .split(';')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens from `ALBERT_APPLICATIONS_COMMAND_PREFIX`, read at launch time.
pub fn command_prefix() -> Vec<String> {
    std::env::var(COMMAND_PREFIX_VAR)
        .map(|v| parse_command_prefix(&v))
        .unwrap_or_default()
}

/// Expanded commandline with `prefix` prepended.
pub fn build_commandline(
    exec: &[String],
    url: Option<&str>,
    ctx: &FieldContext<'_>,
    prefix: &[String],
) -> Vec<String> {
    let mut commandline = prefix.to_vec();
    commandline.extend(expand_field_codes(exec, url, ctx));
    commandline
}
