use crate::error::WaymarkError;
use crate::matcher::registry::compile_cached_regex;
use crate::matcher::{Context, Matcher};
use crate::replacer::Replacer;
use crate::request::HttpRequest;
use crate::vars::value_to_string;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A named regular expression. On a successful match the capture groups
/// are published to the request's replacer as `http.regexp.<name>.<group>`
/// for the whole match (`0`), every positional group and every named
/// group. Publication overwrites earlier values under the same key, so two
/// expressions sharing a name within one matcher set leave the later
/// match's captures in place.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchRegexp {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub name: String,
    #[serde(skip)]
    compiled: Option<Arc<Regex>>,
}

impl MatchRegexp {
    pub fn new(pattern: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            name: name.into(),
            compiled: None,
        }
    }

    pub fn provision(&mut self) -> Result<(), WaymarkError> {
        self.compiled = Some(compile_cached_regex(&self.pattern)?);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), WaymarkError> {
        if self.compiled.is_none() {
            return Err(WaymarkError::Config(format!(
                "regexp '{}' was not provisioned",
                self.pattern
            )));
        }
        Ok(())
    }

    /// Run the expression against `input`, publishing captures on success.
    pub fn match_and_publish(&self, input: &str, repl: &Replacer) -> bool {
        let Some(regex) = &self.compiled else {
            log::debug!("skipping unprovisioned regexp '{}'", self.pattern);
            return false;
        };
        let Some(captures) = regex.captures(input) else {
            return false;
        };
        if !self.name.is_empty() {
            for i in 0..captures.len() {
                if let Some(group) = captures.get(i) {
                    repl.set(format!("http.regexp.{}.{}", self.name, i), group.as_str());
                }
            }
            for group_name in regex.capture_names().flatten() {
                if let Some(group) = captures.name(group_name) {
                    repl.set(
                        format!("http.regexp.{}.{}", self.name, group_name),
                        group.as_str(),
                    );
                }
            }
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }
}

/// Matches the raw request path against a regular expression, so encoded
/// characters are matched in their literal encoding.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchPathRE(pub MatchRegexp);

impl Matcher for MatchPathRE {
    fn provision(&mut self, _ctx: &Context) -> Result<(), WaymarkError> {
        if self.0.is_empty() {
            return Ok(());
        }
        self.0.provision()
    }

    fn validate(&self) -> Result<(), WaymarkError> {
        if self.0.is_empty() {
            return Ok(());
        }
        self.0.validate()
    }

    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        if self.0.is_empty() {
            return Ok(true);
        }
        Ok(self
            .0
            .match_and_publish(req.parts().raw_path(), req.replacer()))
    }
}

/// Matches header values against regular expressions, field by field. All
/// fields must match; within a field the first matching value wins. The
/// pseudo-field `host` reads the request host with any port stripped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchHeaderRE(pub HashMap<String, MatchRegexp>);

impl Matcher for MatchHeaderRE {
    fn provision(&mut self, _ctx: &Context) -> Result<(), WaymarkError> {
        for regexp in self.0.values_mut() {
            regexp.provision()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), WaymarkError> {
        for regexp in self.0.values() {
            regexp.validate()?;
        }
        Ok(())
    }

    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        let repl = req.replacer();
        for (field, regexp) in &self.0 {
            let matched = if field.eq_ignore_ascii_case("host") {
                regexp.match_and_publish(req.parts().host_no_port(), repl)
            } else {
                req.parts()
                    .headers
                    .get_all(field.as_str())
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .any(|value| regexp.match_and_publish(value, repl))
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Matches values from the request's vars store against regular
/// expressions. A field names a var directly, or is a placeholder that
/// resolves to a var name, or a `{http.vars.*}` placeholder that yields
/// the value itself. Non-string vars are stringified before matching.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MatchVarsRE(pub HashMap<String, MatchRegexp>);

impl Matcher for MatchVarsRE {
    fn provision(&mut self, _ctx: &Context) -> Result<(), WaymarkError> {
        for regexp in self.0.values_mut() {
            regexp.provision()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), WaymarkError> {
        for regexp in self.0.values() {
            regexp.validate()?;
        }
        Ok(())
    }

    fn matches(&self, req: &HttpRequest) -> Result<bool, WaymarkError> {
        let repl = req.replacer();
        for (field, regexp) in &self.0 {
            let input = match req.vars().get(field) {
                Some(value) => value_to_string(&value),
                None => {
                    let expanded = repl.replace_all(field, "");
                    if field.starts_with("{http.vars.") {
                        expanded
                    } else {
                        // the placeholder may have resolved to a var name
                        match req.vars().get(&expanded) {
                            Some(value) => value_to_string(&value),
                            None => expanded,
                        }
                    }
                }
            };
            if !regexp.match_and_publish(&input, repl) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
