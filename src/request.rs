use crate::error::WaymarkError;
use crate::replacer::{Provider, Replacer};
use crate::vars::VarsStore;
use http::header::COOKIE;
use http::{HeaderMap, Method, Uri};
use percent_encoding::percent_decode_str;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Immutable snapshot of an inbound request, shared between the matcher
/// tree and the replacer's `http.request.*` provider.
#[derive(Debug)]
pub struct RequestParts {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    scheme: String,
    host: String,
    normalized_path: String,
}

impl RequestParts {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let scheme = uri.scheme_str().unwrap_or("http").to_string();
        let host = uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .or_else(|| {
                headers
                    .get(http::header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .map(String::from)
            })
            .unwrap_or_default();
        let normalized_path = normalize_path(uri.path());
        Self {
            method,
            uri,
            headers,
            remote_addr: None,
            scheme,
            host,
            normalized_path,
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Override the host field, e.g. from an HTTP/1.1 Host header handled
    /// upstream of this crate.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// The request host as received, port included if one was sent.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The request host with any port stripped.
    pub fn host_no_port(&self) -> &str {
        strip_port(&self.host)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The path exactly as received, percent-escapes intact.
    pub fn raw_path(&self) -> &str {
        self.uri.path()
    }

    /// The percent-decoded path with `/./` and `/../` resolved. Leading
    /// double slashes survive; interior slash runs are left alone (slash
    /// merging is a per-pattern concern).
    pub fn normalized_path(&self) -> &str {
        &self.normalized_path
    }
}

/// One request's matching context: the shared snapshot plus the replacer
/// and vars store that live exactly as long as the request.
#[derive(Debug)]
pub struct HttpRequest {
    parts: Arc<RequestParts>,
    repl: Replacer,
    vars: VarsStore,
    deadline: Option<Instant>,
}

impl HttpRequest {
    pub fn new(parts: RequestParts) -> Self {
        let parts = Arc::new(parts);
        let vars = VarsStore::new();
        let mut repl = Replacer::new();
        repl.map(request_provider(Arc::clone(&parts)));
        repl.map(vars_provider(vars.clone()));
        Self {
            parts,
            repl,
            vars,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn parts(&self) -> &RequestParts {
        &self.parts
    }

    pub fn replacer(&self) -> &Replacer {
        &self.repl
    }

    pub fn vars(&self) -> &VarsStore {
        &self.vars
    }

    /// Matchers poll this between leaves so a canceled request stops
    /// matching without preempting regex execution.
    pub fn check_deadline(&self) -> Result<(), WaymarkError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(WaymarkError::Canceled),
            _ => Ok(()),
        }
    }
}

/// Percent-decode and resolve dot segments. `..` never pops past the root
/// and empty segments (doubled slashes) are preserved.
pub(crate) fn normalize_path(path: &str) -> String {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if !last.is_empty()) {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

/// Strip a trailing `:port`, including the bracketed IPv6 form.
pub(crate) fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((inner, _)) = rest.split_once(']') {
            return inner;
        }
    }
    if host.matches(':').count() == 1 {
        if let Some((name, port)) = host.rsplit_once(':') {
            if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
                return name;
            }
        }
    }
    host
}

fn request_provider(parts: Arc<RequestParts>) -> Provider {
    Arc::new(move |key: &str| {
        let key = key.strip_prefix("http.request.")?;
        match key {
            "method" => Some(parts.method.as_str().to_string()),
            "scheme" => Some(parts.scheme().to_string()),
            "host" => Some(parts.host_no_port().to_string()),
            "hostport" => Some(parts.host().to_string()),
            "port" => Some(host_port(&parts)),
            "uri" => Some(
                parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/")
                    .to_string(),
            ),
            "uri.path" => Some(parts.raw_path().to_string()),
            "uri.query" => Some(parts.uri.query().unwrap_or("").to_string()),
            "remote" => parts.remote_addr.map(|addr| addr.to_string()),
            "remote.host" => parts.remote_addr.map(|addr| addr.ip().to_string()),
            "remote.port" => parts.remote_addr.map(|addr| addr.port().to_string()),
            _ => {
                if let Some(name) = key.strip_prefix("header.") {
                    return header_value(&parts.headers, name);
                }
                if let Some(name) = key.strip_prefix("cookie.") {
                    return cookie_value(&parts.headers, name);
                }
                None
            }
        }
    })
}

fn vars_provider(vars: VarsStore) -> Provider {
    Arc::new(move |key: &str| {
        let name = key.strip_prefix("http.vars.")?;
        vars.get_str(name)
    })
}

fn host_port(parts: &RequestParts) -> String {
    if let Some(idx) = parts.host().rfind(':') {
        let port = &parts.host()[idx + 1..];
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            return port.to_string();
        }
    }
    match parts.scheme() {
        "https" => "443",
        _ => "80",
    }
    .to_string()
}

/// All values of a header, comma-joined the way proxies flatten them.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.join(","))
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let Some((key, value)) = pair.trim().split_once('=') else {
            continue;
        };
        if key == name {
            return Some(value.to_string());
        }
    }
    None
}
