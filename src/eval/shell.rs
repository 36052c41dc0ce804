//! POSIX shell argument quoting.

use once_cell::sync::Lazy;
use regex::Regex;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_@%+=:,./-]").expect("Invalid shell-escape regex"));

/// Quotes a single argument so a POSIX shell reads it back verbatim.
///
/// Strings made only of safe characters are returned as-is; anything else
/// is wrapped in single quotes with embedded single quotes spliced out.
pub fn shell_escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    if !UNSAFE_CHARS.is_match(arg) {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', r#"'"'"'"#))
}

/// Escapes each argument and joins them with single spaces.
pub fn escape_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| shell_escape(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
