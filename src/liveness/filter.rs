//! Exclusion of non-device topics.

/// Predicate deciding whether a subscription pattern matches a topic:
/// `matches(pattern, topic)`.
pub type MatchFn = fn(&str, &str) -> bool;

/// Set of exclusion patterns applied to inbound topics.
///
/// Bridge chatter (`zigbee2mqtt/bridge/#`) and the watchdog's own health
/// topic must not count as device traffic. The health topic is always part
/// of the set, whatever the configured patterns are.
///
/// # Example
///
/// ```
/// use z2m_health::TopicFilter;
///
/// let filter = TopicFilter::new(["zigbee2mqtt/bridge/#"], "zigbee2mqtt/healthz");
///
/// assert_eq!(filter.is_excluded("zigbee2mqtt/bridge/state"), Some("zigbee2mqtt/bridge/#"));
/// assert_eq!(filter.is_excluded("zigbee2mqtt/healthz"), Some("zigbee2mqtt/healthz"));
/// assert_eq!(filter.is_excluded("zigbee2mqtt/kitchen_sensor"), None);
/// ```
#[derive(Debug, Clone)]
pub struct TopicFilter {
    patterns: Vec<String>,
    matcher: MatchFn,
}

impl TopicFilter {
    /// Build a filter from configured patterns plus the health topic.
    ///
    /// Empty and duplicate patterns are dropped; order is preserved.
    pub fn new<I, S>(patterns: I, health_topic: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collected: Vec<String> = Vec::new();
        let all = patterns
            .into_iter()
            .map(Into::into)
            .chain(std::iter::once(health_topic.to_string()));

        for pattern in all {
            let pattern = pattern.trim().to_string();
            if !pattern.is_empty() && !collected.contains(&pattern) {
                collected.push(pattern);
            }
        }

        Self {
            patterns: collected,
            matcher: topic_matches,
        }
    }

    /// Replace the pattern predicate (defaults to [`topic_matches`]).
    pub fn with_matcher(mut self, matcher: MatchFn) -> Self {
        self.matcher = matcher;
        self
    }

    /// Return the first pattern matching `topic`, if any.
    pub fn is_excluded(&self, topic: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| (self.matcher)(pattern, topic))
            .map(String::as_str)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// MQTT subscription matching.
///
/// - `+` matches exactly one level
/// - a trailing `#` matches any number of levels, including the parent
///   level itself (`a/#` matches `a`); anywhere else it matches nothing
/// - topics starting with `$` are never matched by a leading wildcard
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern.is_empty() || topic.is_empty() {
        return false;
    }
    if topic.starts_with('$') && (pattern.starts_with('+') || pattern.starts_with('#')) {
        return false;
    }

    let mut pattern_levels = pattern.split('/').peekable();
    let mut topic_levels = topic.split('/');

    loop {
        let level = pattern_levels.next();
        let last = pattern_levels.peek().is_none();
        match (level, topic_levels.next()) {
            (Some("#"), _) if last => return true,
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
