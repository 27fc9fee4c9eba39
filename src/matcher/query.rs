use crate::error::WaymarkError;
use crate::matcher::Matcher;
use crate::request::HttpRequest;
use serde::Deserialize;
use std::collections::HashMap;

/// Matches URL query parameters. Per key the listed patterns are tried
/// against every value of that parameter (OR); across keys all must match
/// (AND). A key with a `null` value list only asserts presence. The empty
/// pattern `""` matches a parameter with an empty or missing value
/// (`?debug`), and `*` matches any value of a present key.
///
/// The empty matcher matches exactly the empty query. Keys and patterns
/// are placeholder-expanded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchQuery(pub HashMap<String, Option<Vec<String>>>);

impl Matcher for MatchQuery {
    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        let repl = req.replacer();
        let query = req.parts().uri.query().unwrap_or("");
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        if self.0.is_empty() {
            return Ok(pairs.is_empty());
        }

        for (key, patterns) in &self.0 {
            let key = repl.replace_all(key, "");
            let values: Vec<&str> = pairs
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .collect();
            if values.is_empty() {
                return Ok(false);
            }
            if let Some(patterns) = patterns {
                let matched = values.iter().any(|value| {
                    patterns.iter().any(|pattern| {
                        let pattern = repl.replace_all(pattern, "");
                        pattern == "*" || pattern == *value
                    })
                });
                if !matched {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
