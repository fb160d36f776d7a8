//! Exact-identifier-match grammar (§4.4 channel 1): recognizes "Article N",
//! "Article N-M", "Article N(k)" in the corpus's convention and turns them
//! into a regex fragment `find_by_identifier_pattern` can match against.

use std::sync::OnceLock;

use regex::Regex;

fn query_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\barticle\s+(\d+)(?:\s*[-–]\s*(\d+))?(?:\((\w+)\))?")
            .expect("static pattern is valid")
    })
}

/// A parsed "Article N[-M][(k)]" reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierToken {
    pub start: String,
    pub end: Option<String>,
    pub sub: Option<String>,
}

impl IdentifierToken {
    /// The regex fragment used against `find_by_identifier_pattern`, which
    /// matches against a provision's `id`/`provision_number`.
    pub fn as_identifier_regex(&self) -> String {
        let mut pattern = format!(r"Art(?:icle)?\.?\s*{}", regex::escape(&self.start));
        if let Some(end) = &self.end {
            pattern.push_str(&format!(r"\s*[-–]\s*{}", regex::escape(end)));
        }
        if let Some(sub) = &self.sub {
            pattern.push_str(&format!(r"\({}\)", regex::escape(sub)));
        }
        pattern
    }

    /// Whether a provision's identifier/number contains this token,
    /// matched loosely against the parsed numeric/sub-item parts rather
    /// than the full regex (§4.4: "keep only hits whose identifier
    /// contains the parsed token").
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        let needle = match (&self.end, &self.sub) {
            (Some(end), _) => format!("{}-{}", self.start, end),
            (None, Some(sub)) => format!("{}({})", self.start, sub),
            (None, None) => self.start.clone(),
        };
        identifier.contains(&needle) || identifier.contains(&self.start)
    }
}

/// Parses the first "Article N[-M][(k)]" reference in `query`, if any.
pub fn parse(query: &str) -> Option<IdentifierToken> {
    let caps = query_pattern().captures(query)?;
    Some(IdentifierToken {
        start: caps.get(1)?.as_str().to_string(),
        end: caps.get(2).map(|m| m.as_str().to_string()),
        sub: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_article_reference() {
        let token = parse("what does Article 17 say about zoning?").unwrap();
        assert_eq!(token.start, "17");
        assert!(token.end.is_none());
        assert!(token.sub.is_none());
    }

    #[test]
    fn parses_range_reference() {
        let token = parse("compare Article 5-9").unwrap();
        assert_eq!(token.start, "5");
        assert_eq!(token.end.as_deref(), Some("9"));
    }

    #[test]
    fn parses_sub_provision_reference() {
        let token = parse("Article 17(2) exceptions").unwrap();
        assert_eq!(token.start, "17");
        assert_eq!(token.sub.as_deref(), Some("2"));
    }

    #[test]
    fn returns_none_when_no_article_reference() {
        assert!(parse("what is the penalty for late filing?").is_none());
    }

    #[test]
    fn matches_identifier_checks_substring() {
        let token = parse("Article 17(2)").unwrap();
        assert!(token.matches_identifier("Statute/Art.17(2)"));
        assert!(!token.matches_identifier("Statute/Art.18(2)"));
    }
}
