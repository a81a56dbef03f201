use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// A URL split around the numeric chapter index it carries.
///
/// `prefix + number + suffix` always rebuilds the URL the pattern was
/// detected from. `width` is non-zero only when the original digits were
/// zero-padded, so `chapter-007` steps to `chapter-008` and `chapter-9`
/// steps to `chapter-10`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterPattern {
    pub rule: &'static str,
    pub prefix: String,
    pub number: u64,
    pub suffix: String,
    pub width: usize,
}

impl ChapterPattern {
    pub fn url(&self) -> String {
        self.url_for(self.number)
    }

    pub fn url_for(&self, number: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            number,
            self.suffix,
            width = self.width
        )
    }
}

struct PatternRule {
    name: &'static str,
    regex: Regex,
}

impl PatternRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        let regex = Regex::new(pattern).expect("chapter pattern rule must compile");
        Self { name, regex }
    }

    fn detect(&self, url: &str) -> Option<ChapterPattern> {
        let caps = self.regex.captures(url)?;
        let prefix = caps.get(1)?.as_str();
        let digits = caps.get(2)?.as_str();
        let suffix = caps.get(3).map_or("", |m| m.as_str());

        // The split must land in the path, never in the scheme or host.
        if prefix.len() <= path_offset(url) {
            return None;
        }

        let number = digits.parse::<u64>().ok()?;
        let width = if digits.len() > 1 && digits.starts_with('0') {
            digits.len()
        } else {
            0
        };

        Some(ChapterPattern {
            rule: self.name,
            prefix: prefix.to_owned(),
            number,
            suffix: suffix.to_owned(),
            width,
        })
    }
}

fn path_offset(url: &str) -> usize {
    let Some(scheme_end) = url.find("://") else {
        return 0;
    };
    let authority_start = scheme_end + "://".len();
    url[authority_start..]
        .find('/')
        .map_or(url.len(), |i| authority_start + i)
}

// Order is significant: the first matching rule wins even when a later one
// would also match.
static RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        PatternRule::new("chapter-slug", r"(?i)^(.+/chapter-)(\d+)(.*)$"),
        PatternRule::new("page-prefix", r"(?i)^(.+/p)(\d+)(.*)$"),
        PatternRule::new("numeric-page", r"(?i)^(.+/)(\d+)(\.html?(?:[?#].*)?)$"),
        PatternRule::new("numeric-segment", r"^(.+/)(\d+)(/?(?:[?#].*)?)$"),
    ]
});

pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|rule| rule.name).collect()
}

pub fn detect(url: &str) -> Option<ChapterPattern> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    RULES.iter().find_map(|rule| rule.detect(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chapter_slug() {
        let url = "https://site.example/book/chapter-12.html";
        let pattern = detect(url).expect("pattern");
        assert_eq!(pattern.rule, "chapter-slug");
        assert_eq!(pattern.prefix, "https://site.example/book/chapter-");
        assert_eq!(pattern.number, 12);
        assert_eq!(pattern.suffix, ".html");
        assert_eq!(pattern.url(), url);
    }

    #[test]
    fn detects_page_prefix_case_insensitively() {
        let pattern = detect("https://site.example/read/P7.html").expect("pattern");
        assert_eq!(pattern.rule, "page-prefix");
        assert_eq!(pattern.number, 7);

        let pattern = detect("https://site.example/read/p7").expect("pattern");
        assert_eq!(pattern.rule, "page-prefix");
        assert_eq!(pattern.prefix, "https://site.example/read/p");
        assert_eq!(pattern.suffix, "");
    }

    #[test]
    fn detects_numeric_page_with_htm_and_html() {
        for url in [
            "https://site.example/novel/42.html",
            "https://site.example/novel/42.htm",
            "https://site.example/novel/42.HTML",
        ] {
            let pattern = detect(url).expect("pattern");
            assert_eq!(pattern.rule, "numeric-page");
            assert_eq!(pattern.number, 42);
            assert_eq!(pattern.url(), url);
        }
    }

    #[test]
    fn detects_numeric_segment_with_trailing_slash() {
        let pattern = detect("https://site.example/novel/42/").expect("pattern");
        assert_eq!(pattern.rule, "numeric-segment");
        assert_eq!(pattern.prefix, "https://site.example/novel/");
        assert_eq!(pattern.suffix, "/");
    }

    #[test]
    fn round_trips_every_rule() {
        for url in [
            "https://a.example/x/chapter-3-part-2.html?ref=toc",
            "https://a.example/x/Chapter-0",
            "https://a.example/x/P12-3.html",
            "http://a.example/1/2/3.htm",
            "https://a.example:8080/novel/99",
            "https://a.example/x/chapter-007.html",
        ] {
            let pattern = detect(url).unwrap_or_else(|| panic!("no pattern for {url}"));
            assert_eq!(pattern.url(), url, "round trip for rule {}", pattern.rule);
        }
    }

    #[test]
    fn earlier_rule_wins_over_later_match() {
        // numeric-page would split on `12`; page-prefix is listed first.
        let url = "https://site.example/read/P3/12.html";
        for _ in 0..3 {
            let pattern = detect(url).expect("pattern");
            assert_eq!(pattern.rule, "page-prefix");
            assert_eq!(pattern.number, 3);
            assert_eq!(pattern.suffix, "/12.html");
        }
    }

    #[test]
    fn chapter_slug_beats_page_prefix() {
        let pattern = detect("https://site.example/p1/chapter-5").expect("pattern");
        assert_eq!(pattern.rule, "chapter-slug");
        assert_eq!(pattern.number, 5);
    }

    #[test]
    fn no_digits_means_no_pattern() {
        assert_eq!(detect("https://site.example/static/page"), None);
        assert_eq!(detect("   "), None);
        assert_eq!(detect("http://localhost:8080"), None);
    }

    #[test]
    fn markers_in_the_host_are_ignored() {
        assert_eq!(detect("https://p2p.example/story/intro"), None);
        assert_eq!(detect("http://10"), None);
    }

    #[test]
    fn oversized_digit_run_does_not_match() {
        assert_eq!(
            detect("https://site.example/chapter-99999999999999999999999"),
            None
        );
    }

    #[test]
    fn keeps_zero_padding_width() {
        let pattern = detect("https://site.example/chapter-007.html").expect("pattern");
        assert_eq!(pattern.width, 3);
        assert_eq!(
            pattern.url_for(8),
            "https://site.example/chapter-008.html"
        );

        let pattern = detect("https://site.example/chapter-10.html").expect("pattern");
        assert_eq!(pattern.width, 0);
        assert_eq!(pattern.url_for(9), "https://site.example/chapter-9.html");
    }

    #[test]
    fn rule_names_are_ordered() {
        assert_eq!(
            rule_names(),
            vec!["chapter-slug", "page-prefix", "numeric-page", "numeric-segment"]
        );
    }
}
