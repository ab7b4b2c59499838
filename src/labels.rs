//! Hostname discovery from Traefik router labels.
//!
//! A container declares its public hostnames through labels such as
//!
//! ```text
//! traefik.http.routers.web.rule=Host(`web.local`) || Host("api.local")
//! ```
//!
//! Every `Host(...)` matcher in every router rule contributes its quoted
//! arguments.  Nothing is validated beyond "non-empty after trimming"; a
//! value that does not parse simply contributes nothing.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::HostnameSet;

pub const DEFAULT_ROUTER_KEY: &str = "traefik.http.routers";
pub const DEFAULT_RULE_KEY: &str = ".rule";

/// `Host(<args>)`, not `HostRegexp(` or `HostSNI(`.
fn host_matcher() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bHost\(([^)]*)\)").unwrap())
}

/// A double-quoted or backtick-quoted argument.
fn quoted_arg() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""([^"]*)"|`([^`]*)`"#).unwrap())
}

/// Extracts hostnames from the labels whose key names a router rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelExtractor {
    router_key: String,
    rule_key: String,
}

impl Default for LabelExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTER_KEY, DEFAULT_RULE_KEY)
    }
}

impl LabelExtractor {
    /// `router_key` and `rule_key` are substrings a label key must both
    /// contain to be considered a router rule.
    pub fn new(router_key: impl Into<String>, rule_key: impl Into<String>) -> Self {
        Self {
            router_key: router_key.into(),
            rule_key: rule_key.into(),
        }
    }

    pub fn is_rule_key(&self, key: &str) -> bool {
        key.contains(&self.router_key) && key.contains(&self.rule_key)
    }

    /// Returns every hostname declared by `labels`. Empty when no rule
    /// label matches.
    pub fn extract(&self, labels: &HashMap<String, String>) -> HostnameSet {
        let mut hosts = HostnameSet::new();
        for (key, value) in labels {
            if self.is_rule_key(key) {
                hosts.extend(hosts_in_rule(value));
            }
        }
        hosts
    }
}

/// Extracts hostnames with the default Traefik keys.
pub fn extract_hostnames(labels: &HashMap<String, String>) -> HostnameSet {
    LabelExtractor::default().extract(labels)
}

/// Hostnames named by the `Host(...)` matchers of a single rule value.
///
/// Each quoted argument may itself hold a comma-separated list.
pub fn hosts_in_rule(rule: &str) -> Vec<&str> {
    host_matcher()
        .captures_iter(rule)
        .filter_map(|m| m.get(1))
        .flat_map(|args| quoted_arg().captures_iter(args.as_str()))
        .filter_map(|q| q.get(1).or_else(|| q.get(2)))
        .flat_map(|arg| arg.as_str().split(','))
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn hosts(set: &HostnameSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn no_rule_labels_yields_empty_set() {
        let set = extract_hostnames(&labels(&[
            ("com.docker.compose.service", "web"),
            ("traefik.enable", "true"),
            ("traefik.http.services.web.loadbalancer.server.port", "80"),
        ]));
        assert!(set.is_empty());
        assert!(extract_hostnames(&HashMap::new()).is_empty());
    }

    #[test]
    fn single_host_rule() {
        let set = extract_hostnames(&labels(&[(
            "traefik.http.routers.web.rule",
            r#"Host("a.local")"#,
        )]));
        assert_eq!(hosts(&set), vec!["a.local"]);
    }

    #[test]
    fn or_combined_hosts_are_extracted_independently() {
        let set = extract_hostnames(&labels(&[(
            "traefik.http.routers.web.rule",
            r#"Host("a.local") || Host("b.local")"#,
        )]));
        assert_eq!(hosts(&set), vec!["a.local", "b.local"]);
    }

    #[test]
    fn comma_separated_values_are_split_and_trimmed() {
        let set = extract_hostnames(&labels(&[(
            "traefik.http.routers.web.rule",
            r#"Host("a.local, b.local ,c.local")"#,
        )]));
        assert_eq!(hosts(&set), vec!["a.local", "b.local", "c.local"]);
    }

    #[test]
    fn backtick_and_multi_argument_forms() {
        let set = extract_hostnames(&labels(&[
            ("traefik.http.routers.web.rule", "Host(`web.local`) && PathPrefix(`/api`)"),
            ("traefik.http.routers.alt.rule", "Host(`x.local`, `y.local`)"),
        ]));
        assert_eq!(hosts(&set), vec!["web.local", "x.local", "y.local"]);
    }

    #[test]
    fn other_matchers_and_malformed_values_are_ignored() {
        let set = extract_hostnames(&labels(&[
            ("traefik.http.routers.a.rule", "HostRegexp(`{sub:[a-z]+}.local`)"),
            ("traefik.http.routers.b.rule", r#"Host("unterminated.local)"#),
            ("traefik.http.routers.c.rule", r#"Host("")"#),
            ("traefik.http.routers.d.rule", "PathPrefix(`/`)"),
        ]));
        assert!(set.is_empty());
    }

    #[test]
    fn key_must_name_both_router_and_rule() {
        let set = extract_hostnames(&labels(&[
            ("traefik.http.routers.web.entrypoints", r#"Host("nope.local")"#),
            ("traefik.tcp.routers.db.rule", r#"Host("nope2.local")"#),
            ("traefik.http.routers.web.rule", r#"Host("yes.local")"#),
        ]));
        assert_eq!(hosts(&set), vec!["yes.local"]);
    }

    #[test]
    fn same_host_declared_twice_is_merged() {
        let set = extract_hostnames(&labels(&[
            ("traefik.http.routers.a.rule", r#"Host("dup.local")"#),
            ("traefik.http.routers.b.rule", r#"Host("dup.local") || Host("dup.local")"#),
        ]));
        assert_eq!(hosts(&set), vec!["dup.local"]);
    }

    #[test]
    fn custom_keys() {
        let extractor = LabelExtractor::new("traefik.tcp.routers", ".rule");
        let set = extractor.extract(&labels(&[(
            "traefik.tcp.routers.db.rule",
            "Host(`db.local`)",
        )]));
        assert_eq!(hosts(&set), vec!["db.local"]);
    }
}
