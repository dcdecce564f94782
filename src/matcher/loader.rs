use std::path::Path;

use crate::error::{ForwarderError, Result};
use crate::matcher::mix::MixMatcher;

/// Parses a rule file into `matcher`. Grammar: one rule per line,
/// `#`-to-end-of-line comments, blank lines ignored, each rule is
/// `[type:]pattern [value]`. `value` defaults to the empty string when
/// omitted, which is enough for boolean membership matchers (block/allow
/// lists); callers needing a richer value type parse the column
/// themselves with `parse_lines`.
pub fn load_into(matcher: &mut MixMatcher<String>, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ForwarderError::ConfigInvalid(format!("reading {}: {e}", path.display())))?;
    let mut count = 0;
    for (lineno, raw) in contents.lines().enumerate() {
        match parse_line(raw) {
            Some((rule, value)) => {
                matcher.add(rule, value.to_string()).map_err(|e| {
                    ForwarderError::ConfigInvalid(format!(
                        "{}:{}: invalid pattern: {e}",
                        path.display(),
                        lineno + 1
                    ))
                })?;
                count += 1;
            }
            None => continue,
        }
    }
    Ok(count)
}

/// Strips a `#` comment and surrounding whitespace, splitting the rule
/// pattern from an optional trailing value column. Returns `None` for
/// blank/comment-only lines.
fn parse_line(raw: &str) -> Option<(&str, &str)> {
    let without_comment = match raw.find('#') {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let trimmed = without_comment.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.split_once(char::is_whitespace) {
        Some((rule, value)) => Some((rule.trim(), value.trim())),
        None => Some((trimmed, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_and_blank_lines() {
        assert_eq!(parse_line("# a comment"), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("domain:example.com"), Some(("domain:example.com", "")));
        assert_eq!(
            parse_line("domain:example.com  block # trailing"),
            Some(("domain:example.com", "block"))
        );
    }

    #[test]
    fn load_into_populates_matcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.txt");
        std::fs::write(
            &path,
            "# ad blockers\ndomain:ads.example.com\nfull:exact.example.com allow\n",
        )
        .unwrap();

        let mut matcher = MixMatcher::new();
        let loaded = load_into(&mut matcher, &path).unwrap();
        assert_eq!(loaded, 2);
        assert!(matcher.matches("sub.ads.example.com").is_some());
        assert_eq!(matcher.matches("exact.example.com"), Some(&"allow".to_string()));
    }
}
