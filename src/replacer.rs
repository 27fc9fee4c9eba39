use crate::error::WaymarkError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// A value provider answers lookups for the keys of one namespace and
/// returns `None` for everything else.
pub type Provider = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Substitution depth for values that themselves contain placeholders.
const MAX_EXPANSION_DEPTH: usize = 8;

/// Expands `{namespace.key}` placeholders in strings.
///
/// One instance lives per request. Lookups consult the override map first,
/// then the providers in reverse registration order, so request-scoped
/// providers shadow the process-wide defaults.
pub struct Replacer {
    providers: Vec<Provider>,
    overrides: RwLock<HashMap<String, String>>,
}

impl Replacer {
    /// A fresh replacer with the `env.*` and `system.*` providers attached.
    pub fn new() -> Self {
        Self {
            providers: vec![env_provider(), system_provider()],
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Push a provider onto the lookup stack. Later providers win.
    pub fn map(&mut self, provider: Provider) {
        self.providers.push(provider);
    }

    /// Write an override for `key`. Overrides shadow every provider.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.overrides
            .write()
            .unwrap()
            .insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.read().unwrap().get(key) {
            return Some(value.clone());
        }
        self.providers.iter().rev().find_map(|provider| provider(key))
    }

    /// Expand every placeholder in `input`, substituting `empty` for
    /// unresolved keys.
    pub fn replace_all(&self, input: &str, empty: &str) -> String {
        // the non-strict path cannot fail
        self.replace(input, empty, false, 0)
            .unwrap_or_else(|_| input.to_string())
    }

    /// Expand every placeholder in `input`, erroring on the first
    /// unresolved key.
    pub fn replace_or_err(&self, input: &str) -> Result<String, WaymarkError> {
        self.replace(input, "", true, 0)
    }

    fn replace(
        &self,
        input: &str,
        empty: &str,
        strict: bool,
        depth: usize,
    ) -> Result<String, WaymarkError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(open) = rest.find('{') {
            // `\{` produces a literal brace
            if open > 0 && rest.as_bytes()[open - 1] == b'\\' {
                out.push_str(&rest[..open - 1]);
                out.push('{');
                rest = &rest[open + 1..];
                continue;
            }
            out.push_str(&rest[..open]);
            let Some(close) = rest[open + 1..].find('}') else {
                // unterminated placeholder is literal text
                out.push_str(&rest[open..]);
                return Ok(out);
            };
            let key = &rest[open + 1..open + 1 + close];
            rest = &rest[open + 1 + close + 1..];
            match self.get(key) {
                Some(value) => {
                    if depth < MAX_EXPANSION_DEPTH && contains_placeholder(&value) {
                        // re-scan the substituted value once per depth level
                        out.push_str(&self.replace(&value, empty, strict, depth + 1)?);
                    } else {
                        out.push_str(&value);
                    }
                }
                None if strict => {
                    return Err(WaymarkError::UnresolvedPlaceholder(key.to_string()));
                }
                None => out.push_str(empty),
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl Default for Replacer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Replacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replacer")
            .field("providers", &self.providers.len())
            .field("overrides", &self.overrides.read().unwrap().len())
            .finish()
    }
}

fn contains_placeholder(value: &str) -> bool {
    let mut rest = value;
    while let Some(open) = rest.find('{') {
        if open == 0 || rest.as_bytes()[open - 1] != b'\\' {
            return true;
        }
        rest = &rest[open + 1..];
    }
    false
}

fn env_provider() -> Provider {
    Arc::new(|key: &str| {
        let name = key.strip_prefix("env.")?;
        std::env::var(name).ok()
    })
}

fn system_provider() -> Provider {
    Arc::new(|key: &str| match key {
        "system.os" => Some(std::env::consts::OS.to_string()),
        "system.arch" => Some(std::env::consts::ARCH.to_string()),
        "system.wd" => std::env::current_dir()
            .ok()
            .map(|dir| dir.display().to_string()),
        "system.time.unix" => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|elapsed| elapsed.as_secs().to_string()),
        _ => None,
    })
}
