use crate::error::WaymarkError;
use crate::matcher::Matcher;
use crate::request::HttpRequest;
use serde::Deserialize;
use std::collections::HashMap;

/// Matches request headers. Per field the listed value patterns are tried
/// against every value of that header (OR); across fields all must match
/// (AND). A `null` value list asserts the header is absent. The pseudo
/// field `host` reads the request host with any port stripped.
///
/// Value patterns compare case-sensitively and support a `*` at either
/// end, both ends, or alone; placeholders are expanded first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchHeader(pub HashMap<String, Option<Vec<String>>>);

impl Matcher for MatchHeader {
    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        let repl = req.replacer();
        for (field, patterns) in &self.0 {
            let values: Vec<String> = if field.eq_ignore_ascii_case("host") {
                let host = req.parts().host_no_port();
                if host.is_empty() {
                    Vec::new()
                } else {
                    vec![host.to_string()]
                }
            } else {
                req.parts()
                    .headers
                    .get_all(field.as_str())
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .map(String::from)
                    .collect()
            };

            match patterns {
                None => {
                    if !values.is_empty() {
                        return Ok(false);
                    }
                }
                Some(patterns) => {
                    let matched = values.iter().any(|value| {
                        patterns.iter().any(|pattern| {
                            let pattern = repl.replace_all(pattern, "");
                            value_match(&pattern, value)
                        })
                    });
                    if !matched {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

/// Wildcard comparison shared by header value patterns.
pub(crate) fn value_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(middle) = pattern
        .strip_prefix('*')
        .and_then(|rest| rest.strip_suffix('*'))
    {
        return value.contains(middle);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    pattern == value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestParts;
    use http::{HeaderMap, HeaderName, Method};

    fn request(entries: &[(&str, &str)], host: &str) -> HttpRequest {
        let mut headers = HeaderMap::new();
        for (name, value) in entries {
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        let parts = RequestParts::new(Method::GET, "/".parse().unwrap(), headers).with_host(host);
        HttpRequest::new(parts)
    }

    fn matcher(entries: &[(&str, Option<&[&str]>)]) -> MatchHeader {
        MatchHeader(
            entries
                .iter()
                .map(|(field, patterns)| {
                    (
                        field.to_string(),
                        patterns.map(|ps| ps.iter().map(|p| p.to_string()).collect()),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn single_field_value_sets() {
        let m = matcher(&[("Field", Some(&["foo"]))]);
        assert!(m.matches(&request(&[("field", "foo")], "")).unwrap());

        let m = matcher(&[("Field", Some(&["foo", "bar"]))]);
        assert!(m.matches(&request(&[("field", "bar")], "")).unwrap());
        assert!(!m.matches(&request(&[("alakazam", "kapow")], "")).unwrap());
        assert!(!m.matches(&request(&[("field", "kapow")], "")).unwrap());
        assert!(m
            .matches(&request(&[("field", "kapow"), ("field", "foo")], ""))
            .unwrap());
    }

    #[test]
    fn fields_and_together_case_insensitively_named() {
        let m = matcher(&[("Field1", Some(&["foo"])), ("Field2", Some(&["bar"]))]);
        assert!(m
            .matches(&request(&[("field1", "foo"), ("field2", "bar")], ""))
            .unwrap());

        let m = matcher(&[("field1", Some(&["foo"])), ("field2", Some(&["bar"]))]);
        assert!(m
            .matches(&request(&[("field1", "foo"), ("field2", "bar")], ""))
            .unwrap());
        assert!(!m
            .matches(&request(&[("field1", "foo"), ("field2", "kapow")], ""))
            .unwrap());
    }

    #[test]
    fn wildcard_value_patterns() {
        let m = matcher(&[("field1", Some(&["*"]))]);
        assert!(m.matches(&request(&[("field1", "foo")], "")).unwrap());
        assert!(!m.matches(&request(&[("field2", "foo")], "")).unwrap());

        let m = matcher(&[("Field1", Some(&["foo*"]))]);
        assert!(m.matches(&request(&[("field1", "foo")], "")).unwrap());
        assert!(m
            .matches(&request(&[("field1", "asdf"), ("field1", "foobar")], ""))
            .unwrap());

        let m = matcher(&[("Field1", Some(&["*bar"]))]);
        assert!(m
            .matches(&request(&[("field1", "asdf"), ("field1", "foobar")], ""))
            .unwrap());

        let m = matcher(&[("Field1", Some(&["*oba*"]))]);
        assert!(m.matches(&request(&[("field1", "foobar")], "")).unwrap());
    }

    #[test]
    fn host_pseudo_field() {
        let m = matcher(&[("host", Some(&["localhost"]))]);
        assert!(m.matches(&request(&[], "localhost")).unwrap());
        assert!(!m.matches(&request(&[], "remotehost.example")).unwrap());
        assert!(m.matches(&request(&[], "localhost:8080")).unwrap());
    }

    #[test]
    fn null_asserts_absence() {
        let m = matcher(&[("Must-Not-Exist", None)]);
        assert!(m.matches(&request(&[], "")).unwrap());
        assert!(!m
            .matches(&request(&[("must-not-exist", "do not match")], ""))
            .unwrap());
    }

    #[test]
    fn patterns_expand_placeholders() {
        let req = request(&[("foo", "foobar")], "");
        req.replacer().set("a", "foobar");
        assert!(matcher(&[("Foo", Some(&["{a}"]))]).matches(&req).unwrap());

        let req = request(&[("foo", "asdf")], "");
        req.replacer().set("a", "foobar");
        assert!(!matcher(&[("Foo", Some(&["{a}"]))]).matches(&req).unwrap());

        let req = request(&[("foo", "foobar-baz")], "");
        req.replacer().set("a", "foobar");
        assert!(matcher(&[("Foo", Some(&["{a}*"]))]).matches(&req).unwrap());
    }

    #[test]
    fn values_compare_case_sensitively() {
        let m = matcher(&[("Field", Some(&["Foo"]))]);
        assert!(!m.matches(&request(&[("field", "foo")], "")).unwrap());
        assert!(m.matches(&request(&[("field", "Foo")], "")).unwrap());
    }
}
