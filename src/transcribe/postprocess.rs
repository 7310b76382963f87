//! Deterministic cleanup of VLM-generated HTML.
//!
//! Models sometimes ignore "no fences, no wrapper" in the prompt. These rules
//! undo the common quirks without touching content:
//!
//! 1. Strip code fences (```` ```html ````, bare ```` ``` ````)
//! 2. Normalise line endings (CRLF → LF)
//! 3. Unwrap a full `<html>`/`<body>` document down to its body
//! 4. Trim trailing whitespace per line
//! 5. Collapse 3+ blank lines down to 2
//! 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 7. Trim the whole output
//!
//! Fences go first so the wrapper rule sees clean input.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every rule in order. May return an empty string.
pub fn clean_markup(input: &str) -> String {
    let s = strip_fences(input);
    let s = normalise_line_endings(&s);
    let s = unwrap_document(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip code fences ────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:html|HTML|markdown)?[ \t]*\r?\n?").expect("valid regex"));

fn strip_fences(input: &str) -> String {
    RE_FENCE.replace_all(input, "").into_owned()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Unwrap full documents ────────────────────────────────────────

static RE_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body\s*>").expect("valid regex"));

static RE_DOC_SHELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!doctype[^>]*>|</?html[^>]*>|<head[^>]*>.*?</head\s*>").expect("valid regex")
});

fn unwrap_document(input: &str) -> String {
    if let Some(caps) = RE_BODY.captures(input) {
        return caps[1].to_string();
    }
    RE_DOC_SHELL.replace_all(input, "").into_owned()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Rule 6: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}
