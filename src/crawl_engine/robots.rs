//! Per-origin robots.txt cache and permission checks.
//!
//! The cache never propagates failures: anything that prevents fetching or
//! parsing a robots.txt resolves to "allow all" and is logged at debug.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use reqwest::Client;
use url::Url;

use super::rate_limiter::extract_origin;

/// Caches one parsed rule set per origin, fetched lazily on first query.
pub struct RobotsCache {
    client: Client,
    fetch_timeout: Duration,
    cache: HashMap<String, RobotsRules>,
}

impl RobotsCache {
    pub fn new(client: Client, fetch_timeout: Duration) -> Self {
        Self {
            client,
            fetch_timeout,
            cache: HashMap::new(),
        }
    }

    /// Whether the given user agent may fetch the URL. The first query for
    /// an origin fetches `scheme://host/robots.txt`; subsequent queries are
    /// answered from the cache.
    pub async fn is_allowed(&mut self, url: &str, user_agent: &str) -> bool {
        let Some(origin) = extract_origin(url) else {
            return true;
        };
        if !self.cache.contains_key(&origin) {
            let rules = self.fetch_rules(&origin).await;
            self.cache.insert(origin.clone(), rules);
        }
        self.cache
            .get(&origin)
            .map(|rules| rules.is_allowed(user_agent, url))
            .unwrap_or(true)
    }

    /// Number of origins with cached rules.
    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_rules(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        let response = match self
            .client
            .get(&robots_url)
            .timeout(self.fetch_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("failed to fetch {robots_url}: {e}, allowing all");
                return RobotsRules::allow_all();
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!("{robots_url} returned {status}, allowing all");
            return RobotsRules::allow_all();
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("failed to read {robots_url}: {e}, allowing all");
                return RobotsRules::allow_all();
            }
        };

        if looks_like_robots(&content_type, &body) {
            RobotsRules::parse(&body)
        } else {
            // Most often an HTML 404 page served with status 200.
            debug!("{robots_url} does not look like robots.txt (content-type: {content_type}), allowing all");
            RobotsRules::allow_all()
        }
    }
}

fn looks_like_robots(content_type: &str, body: &str) -> bool {
    content_type.contains("text/plain")
        || body.trim_start().to_ascii_lowercase().starts_with("user-agent:")
}

#[derive(Debug, Clone, Default)]
struct RuleGroup {
    agents: Vec<String>,
    rules: Vec<PathRule>,
}

#[derive(Debug, Clone)]
struct PathRule {
    allow: bool,
    path: String,
}

/// Parsed robots.txt rules for one origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<RuleGroup>,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt content. Consecutive `User-agent` lines open a
    /// group; `Allow`/`Disallow` lines attach to the current group.
    /// Unknown directives are ignored.
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<RuleGroup> = Vec::new();
        let mut current: Option<RuleGroup> = None;
        let mut last_was_agent = false;

        for line in content.lines() {
            let line = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if !last_was_agent {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(RuleGroup::default());
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                    last_was_agent = true;
                }
                "allow" | "disallow" => {
                    last_was_agent = false;
                    if let Some(group) = current.as_mut() {
                        // An empty Disallow means "allow everything".
                        if !value.is_empty() {
                            group.rules.push(PathRule {
                                allow: directive == "allow",
                                path: value.to_string(),
                            });
                        }
                    }
                }
                _ => {
                    last_was_agent = false;
                }
            }
        }
        if let Some(group) = current.take() {
            groups.push(group);
        }

        Self { groups }
    }

    /// Verdict for a user agent and URL. Longest matching path rule wins;
    /// `Allow` beats `Disallow` on equal length; no matching rule allows.
    pub fn is_allowed(&self, user_agent: &str, url: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        let path = match Url::parse(url) {
            Ok(parsed) => {
                let mut path = parsed.path().to_string();
                if let Some(query) = parsed.query() {
                    path.push('?');
                    path.push_str(query);
                }
                path
            }
            Err(_) => return true,
        };

        let mut best: Option<&PathRule> = None;
        for rule in &group.rules {
            if path.starts_with(&rule.path) {
                let better = match best {
                    None => true,
                    Some(current) => {
                        rule.path.len() > current.path.len()
                            || (rule.path.len() == current.path.len() && rule.allow)
                    }
                };
                if better {
                    best = Some(rule);
                }
            }
        }
        best.map(|rule| rule.allow).unwrap_or(true)
    }

    /// The most specific group for the agent: longest matching agent name,
    /// with `*` as the fallback.
    fn group_for(&self, user_agent: &str) -> Option<&RuleGroup> {
        let token = user_agent
            .split('/')
            .next()
            .unwrap_or(user_agent)
            .to_ascii_lowercase();

        let mut fallback = None;
        let mut best: Option<(usize, &RuleGroup)> = None;
        for group in &self.groups {
            for agent in &group.agents {
                if agent == "*" {
                    fallback.get_or_insert(group);
                } else if token.contains(agent.as_str()) {
                    let better = best.map(|(len, _)| agent.len() > len).unwrap_or(true);
                    if better {
                        best = Some((agent.len(), group));
                    }
                }
            }
        }
        best.map(|(_, group)| group).or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "User-agent: *\nDisallow: /private/\nAllow: /private/public\n";

    #[test]
    fn disallow_prefix_blocks_matching_paths() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(!rules.is_allowed("DocBro/1.0", "https://h/private/x"));
        assert!(rules.is_allowed("DocBro/1.0", "https://h/docs/a"));
    }

    #[test]
    fn longest_match_wins_and_allow_beats_disallow() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(rules.is_allowed("DocBro/1.0", "https://h/private/public/x"));
    }

    #[test]
    fn specific_agent_group_preferred_over_wildcard() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /\n\nUser-agent: docbro\nDisallow: /secret/\n",
        );
        assert!(rules.is_allowed("DocBro/1.0", "https://h/docs"));
        assert!(!rules.is_allowed("DocBro/1.0", "https://h/secret/x"));
        assert!(!rules.is_allowed("OtherBot/2.0", "https://h/docs"));
    }

    #[test]
    fn empty_rules_allow_everything() {
        let rules = RobotsRules::parse("# nothing here\n");
        assert!(rules.is_allowed("DocBro/1.0", "https://h/anything"));
        assert!(RobotsRules::allow_all().is_allowed("DocBro/1.0", "https://h/x"));
    }

    #[test]
    fn empty_disallow_means_allow() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:\n");
        assert!(rules.is_allowed("DocBro/1.0", "https://h/anything"));
    }

    #[test]
    fn html_body_does_not_look_like_robots() {
        assert!(!looks_like_robots(
            "text/html",
            "<html><body>Not found</body></html>"
        ));
        assert!(looks_like_robots("text/plain", "anything"));
        assert!(looks_like_robots("text/html", "User-Agent: *\nDisallow: /"));
    }
}
