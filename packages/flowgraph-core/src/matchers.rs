/*
 * Method matchers
 *
 * Source/sink/sanitiser classifiers are declared as glob-style patterns
 * over method names ("com.acme.*", "exec?"). Each pattern is compiled once
 * into an anchored regex at startup and the compiled set is shared across
 * all Runners.
 */

use regex::Regex;

use crate::errors::ConfigError;

/// One compiled glob pattern over method names.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    pattern: String,
    regex: Regex,
}

impl MethodMatcher {
    /// Compile a glob pattern. `*` matches any run of characters, `?` a
    /// single character; everything else is literal.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => translated.push_str(".*"),
                '?' => translated.push('.'),
                c => translated.push_str(&regex::escape(&c.to_string())),
            }
        }
        translated.push('$');

        let regex = Regex::new(&translated).map_err(|e| ConfigError::BadPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// A set of compiled matchers; a name matches if any pattern does.
#[derive(Debug, Clone, Default)]
pub struct MatcherSet {
    matchers: Vec<MethodMatcher>,
}

impl MatcherSet {
    pub fn compile<I, P>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let matchers = patterns
            .into_iter()
            .map(|p| MethodMatcher::compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(name))
    }

    /// The rule pattern that matched, if any.
    pub fn matching_rule(&self, name: &str) -> Option<&str> {
        self.matchers
            .iter()
            .find(|m| m.matches(name))
            .map(|m| m.pattern())
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let m = MethodMatcher::compile("exec").unwrap();

        assert!(m.matches("exec"));
        assert!(!m.matches("executor"));
        assert!(!m.matches("my_exec"));
    }

    #[test]
    fn test_star_pattern() {
        let m = MethodMatcher::compile("com.acme.*").unwrap();

        assert!(m.matches("com.acme.Main"));
        assert!(m.matches("com.acme.util.Strings"));
        assert!(!m.matches("org.acme.Main"));
    }

    #[test]
    fn test_question_mark_pattern() {
        let m = MethodMatcher::compile("sink?").unwrap();

        assert!(m.matches("sink1"));
        assert!(!m.matches("sink"));
        assert!(!m.matches("sink12"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let m = MethodMatcher::compile("a+b").unwrap();

        assert!(m.matches("a+b"));
        assert!(!m.matches("aab"));
    }

    #[test]
    fn test_matcher_set() {
        let set = MatcherSet::compile(["source", "read*"]).unwrap();

        assert!(set.matches("source"));
        assert!(set.matches("readLine"));
        assert!(!set.matches("write"));
        assert_eq!(set.matching_rule("readLine"), Some("read*"));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = MatcherSet::default();

        assert!(set.is_empty());
        assert!(!set.matches("anything"));
    }
}
