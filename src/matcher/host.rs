use crate::error::WaymarkError;
use crate::matcher::{Context, Matcher};
use crate::request::HttpRequest;
use serde::Deserialize;

/// Matches the request host against an ordered set of patterns.
///
/// Provisioning splits the patterns into three buckets: exact hosts
/// (lowercased, IDNA-mapped, sorted for binary search), wildcard patterns
/// where `*` stands for exactly one DNS label, and placeholder-bearing
/// patterns expanded per request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct MatchHost {
    patterns: Vec<String>,
    exact: Vec<String>,
    wildcards: Vec<String>,
    placeholders: Vec<String>,
}

impl From<Vec<String>> for MatchHost {
    fn from(patterns: Vec<String>) -> Self {
        Self {
            patterns,
            ..Default::default()
        }
    }
}

impl Matcher for MatchHost {
    fn provision(&mut self, _ctx: &Context) -> Result<(), WaymarkError> {
        self.exact.clear();
        self.wildcards.clear();
        self.placeholders.clear();
        for pattern in &self.patterns {
            if pattern.contains('{') {
                self.placeholders.push(pattern.clone());
            } else if pattern.contains('*') {
                self.wildcards.push(ascii_labels(pattern)?);
            } else {
                self.exact.push(host_to_ascii(pattern)?);
            }
        }
        self.exact.sort();
        Ok(())
    }

    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        let host = match host_to_ascii(req.parts().host_no_port()) {
            Ok(host) => host,
            Err(err) => {
                // a garbled inbound host is a non-match, not a failure
                log::debug!("unmatchable request host: {}", err);
                return Ok(false);
            }
        };

        if !self.exact.is_empty() && self.exact.binary_search(&host).is_ok() {
            return Ok(true);
        }

        for pattern in &self.wildcards {
            if wildcard_host_match(pattern, &host) {
                return Ok(true);
            }
        }

        for pattern in &self.placeholders {
            // a missing placeholder key skips the pattern without erroring
            let Ok(expanded) = req.replacer().replace_or_err(pattern) else {
                continue;
            };
            let expanded = expanded.to_ascii_lowercase();
            let matched = if expanded.contains('*') {
                wildcard_host_match(&expanded, &host)
            } else {
                expanded == host
            };
            if matched {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Lowercase an ASCII host, or map a Unicode host to its `xn--` form.
fn host_to_ascii(host: &str) -> Result<String, WaymarkError> {
    if host.is_ascii() {
        return Ok(host.to_ascii_lowercase());
    }
    idna::domain_to_ascii(host).map_err(|err| WaymarkError::InvalidHost(format!("{host}: {err:?}")))
}

/// IDNA-map a wildcard pattern label by label, leaving `*` labels alone.
fn ascii_labels(pattern: &str) -> Result<String, WaymarkError> {
    if pattern.is_ascii() {
        return Ok(pattern.to_ascii_lowercase());
    }
    let labels: Result<Vec<String>, WaymarkError> = pattern
        .split('.')
        .map(|label| {
            if label == "*" {
                Ok("*".to_string())
            } else {
                host_to_ascii(label)
            }
        })
        .collect();
    Ok(labels?.join("."))
}

/// Label-wise comparison; `*` matches exactly one label.
fn wildcard_host_match(pattern: &str, host: &str) -> bool {
    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    let host_labels: Vec<&str> = host.split('.').collect();
    pattern_labels.len() == host_labels.len()
        && pattern_labels
            .iter()
            .zip(&host_labels)
            .all(|(p, h)| *p == "*" || p == h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestParts;
    use http::{HeaderMap, Method};

    fn matched(patterns: &[&str], host: &str) -> bool {
        let mut matcher = MatchHost::from(
            patterns
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<String>>(),
        );
        matcher.provision(&Context::default()).unwrap();
        let parts = RequestParts::new(Method::GET, "/".parse().unwrap(), HeaderMap::new())
            .with_host(host);
        matcher.matches(&HttpRequest::new(parts)).unwrap()
    }

    #[test]
    fn exact_hosts_fold_case() {
        assert!(!matched(&[], "example.com"));
        assert!(matched(&["example.com"], "example.com"));
        assert!(matched(&["EXAMPLE.COM"], "example.com"));
        assert!(matched(&["example.com"], "EXAMPLE.COM"));
        assert!(!matched(&["example.com"], "foo.example.com"));
        assert!(matched(&["foo.example.com"], "foo.example.com"));
        assert!(!matched(&["foo.example.com"], "bar.example.com"));
    }

    #[test]
    fn unicode_patterns_match_punycode_hosts() {
        assert!(matched(&["éxàmplê.com"], "xn--xmpl-0na6cm.com"));
    }

    #[test]
    fn wildcard_matches_exactly_one_label() {
        assert!(!matched(&["*.example.com"], "example.com"));
        assert!(matched(&["*.example.com"], "SUB.EXAMPLE.COM"));
        assert!(matched(&["*.example.com"], "foo.example.com"));
        assert!(!matched(&["*.example.com"], "foo.bar.example.com"));
        assert!(matched(&["*.example.net", "*.*.example.com"], "foo.bar.example.com"));
        assert!(matched(&["*.example.net", "sub.*.example.com"], "sub.foo.example.com"));
        assert!(!matched(&["*.example.net", "sub.*.example.com"], "sub.foo.example.net"));
        assert!(matched(&["www.*.*"], "www.example.com"));
    }

    #[test]
    fn mixed_pattern_lists_try_every_bucket() {
        assert!(matched(&["*.example.com", "example.net"], "example.net"));
        assert!(matched(&["example.net", "*.example.com"], "foo.example.com"));
    }

    #[test]
    fn request_port_is_ignored() {
        assert!(matched(&["example.com"], "example.com:5555"));
    }

    #[test]
    fn placeholder_patterns_expand_at_match_time() {
        std::env::set_var("WAYMARK_HOST_TEST_DOMAIN", "localhost");
        assert!(matched(&["{env.WAYMARK_HOST_TEST_DOMAIN}"], "localhost"));
        // unresolved placeholder is a non-match, not an error
        assert!(!matched(&["{env.WAYMARK_HOST_TEST_UNSET}"], "localhost"));
    }

    #[test]
    fn exact_bucket_is_sorted_for_binary_search() {
        let mut matcher = MatchHost::from(vec![
            "zeta.example.com".to_string(),
            "alpha.example.com".to_string(),
            "mid.example.com".to_string(),
        ]);
        matcher.provision(&Context::default()).unwrap();
        assert!(matcher.exact.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn case_folding_is_symmetric() {
        for (pattern, host) in [("example.com", "example.com"), ("sub.EXAMPLE.com", "SUB.example.COM")] {
            let upper_pattern = pattern.to_uppercase();
            let upper_host = host.to_uppercase();
            assert_eq!(
                matched(&[pattern], host),
                matched(&[upper_pattern.as_str()], upper_host.as_str())
            );
        }
    }
}
