//! Keyword triage engine — rule matching over post titles and bodies.
//!
//! Pure decision logic, no I/O:
//! - Blacklist veto runs first and is absolute
//! - Each rule scans its in-scope locations with its match mode
//! - Results come back ranked by rule priority (stable on ties)
//!
//! An invalid regex keyword skips that keyword (logged), never the
//! whole match pass.

use regex::RegexBuilder;
use tracing::{debug, warn};

/// How a rule's keywords are matched against text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Case-insensitive substring containment.
    Exact,
    /// Case-insensitive match anchored at non-alphanumeric boundaries
    /// (prevents "cat" matching "category").
    WordBoundary,
    /// Keyword compiled as a case-insensitive regex pattern.
    Regex,
}

/// Which parts of a post a rule scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    Title,
    Body,
    Both,
}

impl MatchScope {
    fn includes_title(self) -> bool {
        matches!(self, Self::Title | Self::Both)
    }

    fn includes_body(self) -> bool {
        matches!(self, Self::Body | Self::Both)
    }
}

/// Location where a match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLocation {
    Title,
    Body,
}

impl MatchLocation {
    pub fn label(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Body => "body",
        }
    }
}

/// A keyword matching rule. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub keywords: Vec<String>,
    pub mode: MatchMode,
    pub scope: MatchScope,
    /// Higher priority = more important.
    pub priority: i32,
    /// Response template selected when this rule wins.
    pub template: Option<String>,
}

/// Result of one rule firing against a post.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    /// Matched keywords, deduplicated, in first-match order.
    pub keywords: Vec<String>,
    /// Locations that contributed at least one match.
    pub locations: Vec<MatchLocation>,
    pub priority: i32,
    pub template: Option<String>,
}

/// Keyword matching engine: an ordered rule list plus a blacklist veto.
pub struct KeywordMatcher {
    rules: Vec<KeywordRule>,
    /// Lowercased blacklist terms. Any hit vetoes the whole post.
    blacklist: Vec<String>,
}

impl KeywordMatcher {
    /// Create an empty matcher.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            blacklist: Vec::new(),
        }
    }

    /// Create a matcher with the default rule set and blacklist.
    pub fn with_default_rules() -> Self {
        let mut matcher = Self::new();
        matcher.load_default_rules();
        matcher
    }

    pub fn add_rule(&mut self, rule: KeywordRule) {
        debug!(keywords = rule.keywords.len(), priority = rule.priority, "Added keyword rule");
        self.rules.push(rule);
    }

    pub fn add_blacklist_terms<I, S>(&mut self, terms: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blacklist
            .extend(terms.into_iter().map(|t| t.as_ref().to_lowercase()));
    }

    /// Seed the default rules: regional topics (highest priority),
    /// advice-seeking and technology discussion, plus the blacklist of
    /// topics the bot must never engage with.
    pub fn load_default_rules(&mut self) {
        self.add_rule(KeywordRule {
            keywords: [
                "india", "indian", "delhi", "mumbai", "bangalore", "chennai", "kolkata",
                "bollywood", "cricket", "ipl", "rupee", "diwali", "holi", "monsoon",
                "chai", "biryani",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            mode: MatchMode::WordBoundary,
            scope: MatchScope::Both,
            priority: 3,
            template: Some("india_specific".to_string()),
        });

        self.add_rule(KeywordRule {
            keywords: [
                "advice", "help", "suggestion", "recommend", "opinion",
                "what should i", "how do i", "need help", "confused",
                "career", "job", "interview", "salary",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            mode: MatchMode::WordBoundary,
            scope: MatchScope::Both,
            priority: 2,
            template: Some("helpful_advice".to_string()),
        });

        self.add_rule(KeywordRule {
            keywords: [
                "programming", "coding", "developer", "software", "python",
                "javascript", "rust", "machine learning", "data science",
                "startup", "algorithm", "database", "api",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            mode: MatchMode::WordBoundary,
            scope: MatchScope::Both,
            priority: 2,
            template: Some("tech_discussion".to_string()),
        });

        self.add_blacklist_terms([
            "suicide", "self harm", "drugs", "illegal", "nsfw", "hate",
            "violence", "terrorist",
        ]);
    }

    /// True if the combined text contains any blacklisted term.
    fn hits_blacklist(&self, title: &str, body: &str) -> bool {
        let text = format!("{} {}", title, body).to_lowercase();
        for term in &self.blacklist {
            if text.contains(term.as_str()) {
                debug!(term = %term, "Post vetoed by blacklist term");
                return true;
            }
        }
        false
    }

    /// Match all rules against a post.
    ///
    /// Returns one `RuleMatch` per rule that fired, sorted descending by
    /// priority; equal priorities keep rule-declaration order.
    /// A blacklist hit returns an empty list regardless of rule matches.
    pub fn match_post(&self, title: &str, body: &str) -> Vec<RuleMatch> {
        if self.hits_blacklist(title, body) {
            return Vec::new();
        }

        let mut results = Vec::new();

        for rule in &self.rules {
            let mut keywords = Vec::new();
            let mut locations = Vec::new();

            if rule.scope.includes_title() {
                let hits = match_keywords(&rule.keywords, title, rule.mode);
                if !hits.is_empty() {
                    keywords.extend(hits);
                    locations.push(MatchLocation::Title);
                }
            }
            if rule.scope.includes_body() && !body.is_empty() {
                let hits = match_keywords(&rule.keywords, body, rule.mode);
                if !hits.is_empty() {
                    keywords.extend(hits);
                    locations.push(MatchLocation::Body);
                }
            }

            if !keywords.is_empty() {
                dedup_preserving_order(&mut keywords);
                results.push(RuleMatch {
                    keywords,
                    locations,
                    priority: rule.priority,
                    template: rule.template.clone(),
                });
            }
        }

        // Stable: ties keep rule-declaration order.
        results.sort_by(|a, b| b.priority.cmp(&a.priority));

        if !results.is_empty() {
            debug!(matches = results.len(), "Keyword rules fired");
        }
        results
    }

    /// Decide whether the bot should respond: the best match wins iff its
    /// priority clears the floor. Empty input always declines.
    pub fn should_respond<'a>(
        &self,
        matches: &'a [RuleMatch],
        min_priority: i32,
    ) -> Option<&'a RuleMatch> {
        let best = matches.first()?;
        (best.priority >= min_priority).then_some(best)
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one rule's keywords against one text with the given mode.
fn match_keywords(keywords: &[String], text: &str, mode: MatchMode) -> Vec<String> {
    let mut hits = Vec::new();
    let text_lower = text.to_lowercase();

    for keyword in keywords {
        let matched = match mode {
            MatchMode::Exact => text_lower.contains(&keyword.to_lowercase()),
            MatchMode::WordBoundary => {
                let pattern = format!(r"\b{}\b", regex::escape(keyword));
                match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                    Ok(re) => re.is_match(text),
                    // Escaped literals always compile; treat failure as no match.
                    Err(_) => false,
                }
            }
            MatchMode::Regex => {
                match RegexBuilder::new(keyword).case_insensitive(true).build() {
                    Ok(re) => re.is_match(text),
                    Err(e) => {
                        warn!(pattern = %keyword, error = %e, "Invalid regex keyword, skipping");
                        false
                    }
                }
            }
        };
        if matched {
            hits.push(keyword.clone());
        }
    }
    hits
}

fn dedup_preserving_order(keywords: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    keywords.retain(|k| seen.insert(k.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_rule_matcher(rule: KeywordRule) -> KeywordMatcher {
        let mut matcher = KeywordMatcher::new();
        matcher.add_rule(rule);
        matcher
    }

    fn word_rule(keywords: &[&str], priority: i32, template: Option<&str>) -> KeywordRule {
        KeywordRule {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            mode: MatchMode::WordBoundary,
            scope: MatchScope::Both,
            priority,
            template: template.map(String::from),
        }
    }

    #[test]
    fn exact_mode_matches_substring() {
        let matcher = single_rule_matcher(KeywordRule {
            keywords: vec!["cat".into()],
            mode: MatchMode::Exact,
            scope: MatchScope::Title,
            priority: 1,
            template: None,
        });
        // Substring containment: "category" contains "cat".
        let matches = matcher.match_post("Best category of products", "");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keywords, vec!["cat"]);
    }

    #[test]
    fn word_boundary_rejects_substring() {
        let matcher = single_rule_matcher(word_rule(&["cat"], 1, None));
        assert!(matcher.match_post("Best category of products", "").is_empty());
        assert_eq!(matcher.match_post("My cat is lazy", "").len(), 1);
    }

    #[test]
    fn word_boundary_is_case_insensitive() {
        let matcher = single_rule_matcher(word_rule(&["india"], 3, None));
        let matches = matcher.match_post("Best places to visit in INDIA", "");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn regex_mode_matches_pattern() {
        let matcher = single_rule_matcher(KeywordRule {
            keywords: vec![r"rust\s+(lang|language)".into()],
            mode: MatchMode::Regex,
            scope: MatchScope::Both,
            priority: 2,
            template: None,
        });
        assert_eq!(matcher.match_post("Learning the Rust language", "").len(), 1);
        assert!(matcher.match_post("rustproofing my car", "").is_empty());
    }

    #[test]
    fn invalid_regex_keyword_is_skipped_not_fatal() {
        let matcher = single_rule_matcher(KeywordRule {
            keywords: vec!["[unclosed".into(), "valid".into()],
            mode: MatchMode::Regex,
            scope: MatchScope::Title,
            priority: 1,
            template: None,
        });
        // The broken pattern is skipped; the valid one still fires.
        let matches = matcher.match_post("a valid post", "");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keywords, vec!["valid"]);
    }

    #[test]
    fn blacklist_vetoes_everything() {
        let mut matcher = single_rule_matcher(word_rule(&["india"], 3, None));
        matcher.add_blacklist_terms(["violence"]);
        let matches = matcher.match_post("India news", "a story about violence");
        assert!(matches.is_empty());
    }

    #[test]
    fn blacklist_is_case_insensitive_substring() {
        let mut matcher = single_rule_matcher(word_rule(&["help"], 2, None));
        matcher.add_blacklist_terms(["nsfw"]);
        assert!(matcher.match_post("Need help [NSFW]", "").is_empty());
    }

    #[test]
    fn scope_title_ignores_body() {
        let matcher = single_rule_matcher(KeywordRule {
            keywords: vec!["python".into()],
            mode: MatchMode::WordBoundary,
            scope: MatchScope::Title,
            priority: 1,
            template: None,
        });
        assert!(matcher.match_post("Some title", "I love python").is_empty());
        assert_eq!(matcher.match_post("python question", "").len(), 1);
    }

    #[test]
    fn locations_record_contributing_fields() {
        let matcher = single_rule_matcher(word_rule(&["career"], 2, None));
        let matches = matcher.match_post("career advice", "my career so far");
        assert_eq!(matches[0].locations, vec![MatchLocation::Title, MatchLocation::Body]);
    }

    #[test]
    fn matched_keywords_are_deduplicated() {
        let matcher = single_rule_matcher(word_rule(&["job"], 2, None));
        let matches = matcher.match_post("New job!", "I started the job today");
        assert_eq!(matches[0].keywords, vec!["job"]);
    }

    #[test]
    fn results_sorted_by_priority_descending() {
        let mut matcher = KeywordMatcher::new();
        matcher.add_rule(word_rule(&["help"], 1, Some("low")));
        matcher.add_rule(word_rule(&["india"], 3, Some("high")));
        matcher.add_rule(word_rule(&["python"], 2, Some("mid")));

        let matches = matcher.match_post("help with python in india", "");
        let priorities: Vec<i32> = matches.iter().map(|m| m.priority).collect();
        assert_eq!(priorities, vec![3, 2, 1]);
    }

    #[test]
    fn equal_priorities_keep_declaration_order() {
        let mut matcher = KeywordMatcher::new();
        matcher.add_rule(word_rule(&["alpha"], 2, Some("first")));
        matcher.add_rule(word_rule(&["beta"], 2, Some("second")));

        let matches = matcher.match_post("alpha beta", "");
        assert_eq!(matches[0].template.as_deref(), Some("first"));
        assert_eq!(matches[1].template.as_deref(), Some("second"));
    }

    #[test]
    fn should_respond_requires_min_priority() {
        let matcher = KeywordMatcher::new();
        let matches = vec![RuleMatch {
            keywords: vec!["help".into()],
            locations: vec![MatchLocation::Title],
            priority: 1,
            template: None,
        }];
        assert!(matcher.should_respond(&matches, 2).is_none());
        assert!(matcher.should_respond(&matches, 1).is_some());
    }

    #[test]
    fn should_respond_declines_empty() {
        let matcher = KeywordMatcher::new();
        assert!(matcher.should_respond(&[], 0).is_none());
    }

    #[test]
    fn india_word_boundary_scenario() {
        // rules = [{keywords: ["india"], word-boundary, both, priority 3,
        // template "india_specific"}], minPriority = 2
        let matcher = single_rule_matcher(word_rule(&["india"], 3, Some("india_specific")));
        let matches = matcher.match_post("Best places to visit in India", "");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].priority, 3);
        assert_eq!(matches[0].keywords, vec!["india"]);

        let best = matcher.should_respond(&matches, 2).unwrap();
        assert_eq!(best.template.as_deref(), Some("india_specific"));
    }

    #[test]
    fn default_rules_blacklist_applies() {
        let matcher = KeywordMatcher::with_default_rules();
        assert!(matcher.match_post("india cricket", "").len() >= 1);
        assert!(matcher.match_post("india cricket", "nsfw content").is_empty());
    }

    #[test]
    fn empty_body_skips_body_scan() {
        let matcher = single_rule_matcher(KeywordRule {
            keywords: vec!["x".into()],
            mode: MatchMode::Exact,
            scope: MatchScope::Body,
            priority: 1,
            template: None,
        });
        assert!(matcher.match_post("x marks the spot", "").is_empty());
    }
}
