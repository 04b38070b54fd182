//! Filename sanitization, URL validation, and path-safety checks
//!
//! Pure helpers with no I/O. Everything that touches user-controlled names
//! or externally-sourced text goes through here before it reaches the
//! filesystem or the display.

use path_absolutize::Absolutize;
use std::path::Path;
use url::Url;

/// Windows reserved device names. A bare stem matching one of these gets a
/// leading underscore so the file can actually be created.
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Fallback name when sanitization strips everything away.
const EMPTY_PLACEHOLDER: &str = "download";

fn is_illegal_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') || (c as u32) < 0x20
}

/// Sanitize a filename so it is safe on common filesystems.
///
/// Replaces illegal characters with `_`, strips leading/trailing dots and
/// spaces, escapes reserved device names, substitutes a placeholder for an
/// empty result, and truncates to `max_length` preserving the extension.
pub fn sanitize_filename(raw: &str, max_length: usize) -> String {
    let mut sanitized: String = raw
        .chars()
        .map(|c| if is_illegal_char(c) { '_' } else { c })
        .collect();

    sanitized = sanitized
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string();

    // Reserved names are matched on the stem, case-insensitively
    let stem = sanitized
        .rsplit_once('.')
        .map(|(name, _)| name)
        .unwrap_or(&sanitized)
        .to_lowercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        sanitized.insert(0, '_');
    }

    if sanitized.is_empty() {
        sanitized = EMPTY_PLACEHOLDER.to_string();
    }

    if sanitized.chars().count() > max_length {
        sanitized = truncate_preserving_extension(&sanitized, max_length);
    }

    sanitized
}

/// Truncate a name to `max_length` characters, keeping `.ext` intact when
/// one exists and there is room for it.
fn truncate_preserving_extension(name: &str, max_length: usize) -> String {
    if let Some((stem, ext)) = name.rsplit_once('.') {
        let reserved = ext.chars().count() + 1;
        if reserved < max_length {
            let keep = max_length - reserved;
            let truncated: String = stem.chars().take(keep).collect();
            return format!("{}.{}", truncated, ext);
        }
    }
    name.chars().take(max_length).collect()
}

/// Syntactic URL validation: non-empty, http(s) scheme, parseable with a
/// non-empty host. No network access.
pub fn validate_url(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return false;
    }
    match Url::parse(trimmed) {
        Ok(parsed) => parsed.host_str().map_or(false, |h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Check that `target` resolves to a path equal to or nested under `base`.
///
/// Both sides are absolutized (`.`/`..` collapsed) before comparison, so
/// traversal components and absolute-path escapes are caught even when the
/// paths do not exist yet.
pub fn is_safe_path(base: &Path, target: &Path) -> bool {
    let base = match base.absolutize() {
        Ok(p) => p.into_owned(),
        Err(_) => return false,
    };
    let target = match target.absolutize() {
        Ok(p) => p.into_owned(),
        Err(_) => return false,
    };
    target.starts_with(&base)
}

/// Strip ANSI escape sequences and other control characters from
/// externally-sourced text before it reaches the user.
pub fn strip_control_sequences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                // CSI sequence: ESC [ params final-byte
                Some('[') => {
                    chars.next();
                    for f in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&f) {
                            break;
                        }
                    }
                }
                // OSC sequence: ESC ] payload, terminated by BEL or ESC \
                Some(']') => {
                    chars.next();
                    while let Some(f) = chars.next() {
                        if f == '\u{7}' {
                            break;
                        }
                        if f == '\u{1b}' {
                            if chars.peek() == Some(&'\\') {
                                chars.next();
                            }
                            break;
                        }
                    }
                }
                // Other ESC sequences are a single following char
                _ => {
                    chars.next();
                }
            }
        } else if c == '\n' || c == '\t' {
            out.push(' ');
        } else if !c.is_control() {
            out.push(c);
        }
    }
    out.trim().to_string()
}
