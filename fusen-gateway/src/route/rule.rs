use crate::{config::RuleConfig, error::GatewayError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    /// Fixed backend address.
    Host(String),
    /// Registry path whose children are the backend instances.
    Registry(String),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub path: String,
    pub target: RuleTarget,
}

impl Rule {
    pub fn new(path: &str, target: RuleTarget) -> Self {
        Self {
            path: path.to_owned(),
            target,
        }
    }

    /// A trailing `*` matches any url starting with what precedes it, any other
    /// pattern has to equal the url.
    pub fn matches(&self, url: &str) -> bool {
        match self.path.strip_suffix('*') {
            Some(prefix) => url.starts_with(prefix),
            None => self.path == url,
        }
    }
}

impl From<&RuleConfig> for Rule {
    fn from(config: &RuleConfig) -> Self {
        let target = match (&config.host, &config.registry_path) {
            (Some(host), _) => RuleTarget::Host(host.clone()),
            (None, Some(registry_path)) => RuleTarget::Registry(registry_path.clone()),
            (None, None) => RuleTarget::None,
        };
        Self {
            path: config.path.clone(),
            target,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RuleMatcher {
    rules: Vec<Rule>,
}

impl RuleMatcher {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn from_config(rules: &[RuleConfig]) -> Self {
        Self::new(rules.iter().map(Rule::from).collect())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First rule matching `url` in declaration order.
    pub fn match_rule(&self, url: &str) -> Result<Option<&Rule>, GatewayError> {
        if url.is_empty() {
            return Err(GatewayError::EmptyUrl);
        }
        Ok(self.rules.iter().find(|rule| rule.matches(url)))
    }
}

#[cfg(test)]
mod test {
    use super::{Rule, RuleMatcher, RuleTarget};
    use crate::{config::RuleConfig, error::GatewayError};

    #[test]
    fn match_rule() {
        let matcher = RuleMatcher::from_config(&[
            RuleConfig::host("/api/v1/test", "localhost:5001"),
            RuleConfig::host("/api/v2/*", "localhost:5002"),
            RuleConfig::host("/v1/test", "localhost:5003"),
        ]);
        let rule = matcher.match_rule("/v1/test").unwrap().unwrap();
        assert_eq!(rule.target, RuleTarget::Host("localhost:5003".to_owned()));
        let rule = matcher.match_rule("/api/v2/books/1").unwrap().unwrap();
        assert_eq!(rule.path, "/api/v2/*");
        assert!(matcher.match_rule("/v2").unwrap().is_none());
        assert!(matcher.match_rule("/api/v1/test/1").unwrap().is_none());
    }

    #[test]
    fn empty_rules_and_empty_url() {
        let matcher = RuleMatcher::default();
        assert!(matcher.match_rule("/v1/test").unwrap().is_none());
        assert!(matches!(
            matcher.match_rule(""),
            Err(GatewayError::EmptyUrl)
        ));
    }

    #[test]
    fn first_match_wins() {
        let matcher = RuleMatcher::new(vec![
            Rule::new("*", RuleTarget::Host("localhost:5001".to_owned())),
            Rule::new("/v1/*", RuleTarget::Host("localhost:5002".to_owned())),
        ]);
        let rule = matcher.match_rule("/v1/test").unwrap().unwrap();
        assert_eq!(rule.path, "*");
    }

    #[test]
    fn target_from_config() {
        let host_first = RuleConfig {
            path: "/v1/*".to_owned(),
            host: Some("localhost:5001".to_owned()),
            registry_path: Some("/services/test".to_owned()),
        };
        assert_eq!(
            Rule::from(&host_first).target,
            RuleTarget::Host("localhost:5001".to_owned())
        );
        assert_eq!(
            Rule::from(&RuleConfig::registry("/v1/*", "/services/test")).target,
            RuleTarget::Registry("/services/test".to_owned())
        );
        let bare = RuleConfig {
            path: "/v1/*".to_owned(),
            host: None,
            registry_path: None,
        };
        assert_eq!(Rule::from(&bare).target, RuleTarget::None);
    }
}
