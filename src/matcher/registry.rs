use crate::error::WaymarkError;
use crate::matcher::{
    Context, MatchHeader, MatchHeaderRE, MatchHost, MatchNot, MatchPath, MatchPathRE, MatchQuery,
    MatchVarsRE, Matcher, MatcherSet, MatcherSetList,
};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A factory builds an unprovisioned matcher from its raw JSON config.
pub type MatcherFactory =
    Arc<dyn Fn(&Value) -> Result<Box<dyn Matcher>, WaymarkError> + Send + Sync>;

// Global registry of matcher kinds using ArcSwap for lock-free reads
static MATCHER_REGISTRY: Lazy<ArcSwap<HashMap<String, MatcherFactory>>> =
    Lazy::new(|| ArcSwap::from_pointee(builtin_matchers()));

// Global regex compilation cache shared by every regexp matcher
static REGEX_CACHE: OnceLock<DashMap<String, Arc<Regex>>> = OnceLock::new();

pub fn compile_cached_regex(pattern: &str) -> Result<Arc<Regex>, WaymarkError> {
    let cache = REGEX_CACHE.get_or_init(DashMap::new);
    if let Some(cached) = cache.get(pattern) {
        return Ok(cached.clone());
    }
    let compiled = Arc::new(Regex::new(pattern)?);
    cache.insert(pattern.to_string(), compiled.clone());
    Ok(compiled)
}

fn builtin_matchers() -> HashMap<String, MatcherFactory> {
    let mut registry = HashMap::new();
    insert_config_matcher::<MatchHost>(&mut registry, "host");
    insert_config_matcher::<MatchPath>(&mut registry, "path");
    insert_config_matcher::<MatchPathRE>(&mut registry, "path_regexp");
    insert_config_matcher::<MatchHeader>(&mut registry, "header");
    insert_config_matcher::<MatchHeaderRE>(&mut registry, "header_regexp");
    insert_config_matcher::<MatchQuery>(&mut registry, "query");
    insert_config_matcher::<MatchVarsRE>(&mut registry, "vars_regexp");
    registry.insert(
        "not".to_string(),
        Arc::new(|raw: &Value| {
            Ok(Box::new(MatchNot::new(matcher_set_list_from_config(raw)?)) as Box<dyn Matcher>)
        }) as MatcherFactory,
    );
    registry
}

fn insert_config_matcher<M>(registry: &mut HashMap<String, MatcherFactory>, kind: &str)
where
    M: Matcher + DeserializeOwned + 'static,
{
    let name = kind.to_string();
    registry.insert(
        name.clone(),
        Arc::new(move |raw: &Value| {
            let matcher: M = serde_json::from_value(raw.clone())
                .map_err(|err| WaymarkError::Config(format!("matcher '{}': {}", name, err)))?;
            Ok(Box::new(matcher) as Box<dyn Matcher>)
        }),
    );
}

/// Register a matcher kind under `name`. Registering an existing name
/// replaces the previous factory.
pub fn register_matcher<F>(name: &str, factory: F)
where
    F: Fn(&Value) -> Result<Box<dyn Matcher>, WaymarkError> + Send + Sync + 'static,
{
    let name = name.to_string();
    let factory: MatcherFactory = Arc::new(factory);
    // rcu keeps reads lock-free while registration copies the map
    MATCHER_REGISTRY.rcu(move |old| {
        let mut next = (**old).clone();
        if next.insert(name.clone(), factory.clone()).is_some() {
            log::warn!("matcher kind '{}' was re-registered", name);
        }
        next
    });
}

/// Construct a single matcher of the given kind from raw config.
pub fn matcher_from_config(kind: &str, raw: &Value) -> Result<Box<dyn Matcher>, WaymarkError> {
    let registry = MATCHER_REGISTRY.load();
    let factory = registry
        .get(kind)
        .ok_or_else(|| WaymarkError::UnknownMatcher(kind.to_string()))?;
    factory(raw)
}

/// Construct an AND set from one JSON object; each entry is a matcher kind
/// keyed by its registered name, evaluated in declaration order.
pub fn matcher_set_from_config(raw: &Value) -> Result<MatcherSet, WaymarkError> {
    let Value::Object(entries) = raw else {
        return Err(WaymarkError::Config(format!(
            "matcher set must be a JSON object, got: {}",
            raw
        )));
    };
    let mut set = MatcherSet::default();
    for (kind, matcher_config) in entries {
        set.push(matcher_from_config(kind, matcher_config)?);
    }
    Ok(set)
}

/// Construct an OR list from a JSON array of matcher-set objects. A bare
/// object is accepted as a single-set list.
pub fn matcher_set_list_from_config(raw: &Value) -> Result<MatcherSetList, WaymarkError> {
    match raw {
        Value::Array(sets) => {
            let mut list = MatcherSetList::default();
            for set in sets {
                list.push(matcher_set_from_config(set)?);
            }
            Ok(list)
        }
        Value::Object(_) => Ok(MatcherSetList::new(vec![matcher_set_from_config(raw)?])),
        other => Err(WaymarkError::Config(format!(
            "matcher set list must be a JSON array or object, got: {}",
            other
        ))),
    }
}

/// Construct, provision and validate a matcher tree in one step; this is
/// what a config loader calls per route.
pub fn build_matcher_set_list(
    raw: &Value,
    ctx: &Context,
) -> Result<MatcherSetList, WaymarkError> {
    let mut list = matcher_set_list_from_config(raw)?;
    list.provision(ctx)?;
    list.validate()?;
    log::debug!("built matcher tree with {} set(s)", list.len());
    Ok(list)
}
