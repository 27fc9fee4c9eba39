use crate::error::WaymarkError;
use crate::matcher::{Context, Matcher};
use crate::request::HttpRequest;
use serde::Deserialize;

/// Matches the request path against an ordered set of literal/wildcard
/// patterns. Comparisons are ASCII case-insensitive and anchored at both
/// ends unless a `*` at an end relaxes them.
///
/// Patterns without `%` operate on the normalized (percent-decoded) path.
/// Patterns containing `%` operate on the raw path, where `%XX` matches
/// only that escape sequence and `%*` is a wildcard that, unlike `*`, will
/// cross an encoded slash.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct MatchPath {
    patterns: Vec<String>,
    strip_trailing_dots: bool,
}

impl From<Vec<String>> for MatchPath {
    fn from(patterns: Vec<String>) -> Self {
        Self {
            patterns,
            strip_trailing_dots: false,
        }
    }
}

impl Matcher for MatchPath {
    fn provision(&mut self, ctx: &Context) -> Result<(), WaymarkError> {
        for pattern in &mut self.patterns {
            *pattern = pattern.to_ascii_lowercase();
        }
        self.strip_trailing_dots = ctx.strip_trailing_dots;
        Ok(())
    }

    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        let raw = req.parts().raw_path().to_ascii_lowercase();
        let normalized = req.parts().normalized_path().to_ascii_lowercase();

        for pattern in &self.patterns {
            let pattern = req
                .replacer()
                .replace_all(pattern, "")
                .to_ascii_lowercase();
            if pattern.is_empty() {
                continue;
            }
            let pattern = collapse_stars(&pattern);

            if match_pattern(&pattern, &raw, &normalized) {
                return Ok(true);
            }
            if self.strip_trailing_dots {
                let raw_stripped = raw.trim_end_matches(['.', ' ']);
                let normalized_stripped = normalized.trim_end_matches(['.', ' ']);
                if (raw_stripped.len() != raw.len()
                    || normalized_stripped.len() != normalized.len())
                    && match_pattern(&pattern, raw_stripped, normalized_stripped)
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn match_pattern(pattern: &str, raw: &str, normalized: &str) -> bool {
    // a lone wildcard matches every request
    if pattern == "*" {
        return true;
    }

    if pattern.contains('%') {
        let path = slash_merged(pattern, raw);
        return escape_glob(pattern.as_bytes(), path.as_bytes());
    }

    let path = slash_merged(pattern, normalized);
    let path = path.as_ref();
    let stars = pattern.matches('*').count();
    if stars == 0 {
        return path == pattern;
    }
    if stars == 2 && pattern.starts_with('*') && pattern.ends_with('*') {
        return path.contains(&pattern[1..pattern.len() - 1]);
    }
    if stars == 1 {
        if let Some(suffix) = pattern.strip_prefix('*') {
            return path.ends_with(suffix);
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            return path.starts_with(prefix);
        }
        // single interior wildcard: prefix and suffix around any run
        let (prefix, suffix) = pattern.split_once('*').unwrap();
        return path.len() >= prefix.len() + suffix.len()
            && path.starts_with(prefix)
            && path.ends_with(suffix);
    }
    // several wildcards: segmented glob, `*` stays within one segment
    glob_match(pattern.as_bytes(), path.as_bytes())
}

/// Repeated slashes in the request path collapse unless the pattern asks
/// for them literally.
fn slash_merged<'a>(pattern: &str, path: &'a str) -> std::borrow::Cow<'a, str> {
    if pattern.contains("//") || !path.contains("//") {
        return std::borrow::Cow::Borrowed(path);
    }
    let mut merged = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        merged.push(c);
    }
    std::borrow::Cow::Owned(merged)
}

/// `**` and longer runs behave exactly like `*`.
fn collapse_stars(pattern: &str) -> String {
    if !pattern.contains("**") {
        return pattern.to_string();
    }
    let mut out = String::with_capacity(pattern.len());
    let mut prev_star = false;
    for c in pattern.chars() {
        if c == '*' && prev_star {
            continue;
        }
        prev_star = c == '*';
        out.push(c);
    }
    out
}

/// Iterative backtracking glob over bytes; `*` matches any run that stays
/// within one path segment.
fn glob_match(pattern: &[u8], path: &[u8]) -> bool {
    let (mut pi, mut si) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while si < path.len() {
        if pi < pattern.len() && pattern[pi] == b'*' {
            star = Some((pi, si));
            pi += 1;
        } else if pi < pattern.len() && pattern[pi] == path[si] {
            pi += 1;
            si += 1;
        } else if let Some((star_pi, star_si)) = star {
            if path[star_si] == b'/' {
                return false;
            }
            star = Some((star_pi, star_si + 1));
            pi = star_pi + 1;
            si = star_si + 1;
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == b'*' {
        pi += 1;
    }
    pi == pattern.len()
}

/// Lock-step comparison of an escape-bearing pattern against the raw path.
/// A literal pattern byte also matches its percent-escaped form, so a
/// pattern `/` accepts a raw `%2F` while a pattern `%2F` accepts only the
/// escape sequence.
fn escape_glob(pattern: &[u8], raw: &[u8]) -> bool {
    if pattern.is_empty() {
        return raw.is_empty();
    }
    if pattern[0] == b'%' && pattern.len() >= 2 && pattern[1] == b'*' {
        return wildcard_run(&pattern[2..], raw, true);
    }
    if pattern[0] == b'*' {
        return wildcard_run(&pattern[1..], raw, false);
    }
    if let Some(expected) = escape_at(pattern, 0) {
        // pattern escape sequence: raw must carry the same sequence
        return escape_at(raw, 0) == Some(expected)
            && raw[1..3].eq_ignore_ascii_case(&pattern[1..3])
            && escape_glob(&pattern[3..], &raw[3..]);
    }
    if !raw.is_empty() && raw[0] == pattern[0] && raw[0] != b'%' {
        return escape_glob(&pattern[1..], &raw[1..]);
    }
    if escape_at(raw, 0) == Some(pattern[0]) {
        return escape_glob(&pattern[1..], &raw[3..]);
    }
    false
}

/// Advance a raw-space wildcard one unit at a time (a byte or a whole
/// escape sequence), trying the pattern remainder at each stop. Wildcards
/// never cross a literal slash; only `%*` crosses an encoded one.
fn wildcard_run(rest: &[u8], raw: &[u8], cross_encoded_slash: bool) -> bool {
    let mut i = 0;
    loop {
        if escape_glob(rest, &raw[i..]) {
            return true;
        }
        if i >= raw.len() {
            return false;
        }
        if let Some(decoded) = escape_at(raw, i) {
            if decoded == b'/' && !cross_encoded_slash {
                return false;
            }
            i += 3;
        } else {
            if raw[i] == b'/' {
                return false;
            }
            i += 1;
        }
    }
}

/// Decode the escape sequence at `i`, if one starts there.
fn escape_at(bytes: &[u8], i: usize) -> Option<u8> {
    if bytes.len() < i + 3 || bytes[i] != b'%' {
        return None;
    }
    let hi = (bytes[i + 1] as char).to_digit(16)?;
    let lo = (bytes[i + 2] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
