use std::fmt;

#[derive(Debug)]
pub enum WaymarkError {
    Config(String),
    UnknownMatcher(String),
    Regex(regex::Error),
    InvalidHost(String),
    UnresolvedPlaceholder(String),
    Canceled,
    Match(String),
}

impl std::error::Error for WaymarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WaymarkError::Regex(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for WaymarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaymarkError::Config(msg) => write!(f, "Configuration error: {}", msg),
            WaymarkError::UnknownMatcher(kind) => write!(f, "Unknown matcher kind: {}", kind),
            WaymarkError::Regex(err) => write!(f, "Regex error: {}", err),
            WaymarkError::InvalidHost(msg) => write!(f, "Invalid host: {}", msg),
            WaymarkError::UnresolvedPlaceholder(key) => {
                write!(f, "Unresolved placeholder: {{{}}}", key)
            }
            WaymarkError::Canceled => write!(f, "Request canceled"),
            WaymarkError::Match(msg) => write!(f, "Match error: {}", msg),
        }
    }
}

impl From<regex::Error> for WaymarkError {
    fn from(err: regex::Error) -> Self {
        WaymarkError::Regex(err)
    }
}

impl From<String> for WaymarkError {
    fn from(s: String) -> Self {
        WaymarkError::Match(s)
    }
}

impl From<&str> for WaymarkError {
    fn from(s: &str) -> Self {
        WaymarkError::Match(s.to_string())
    }
}
