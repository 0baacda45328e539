//! Network interception.
//!
//! Every request the application issues goes through [`Network::fetch`]. Rules
//! registered on the session's [`Interceptor`] record matching calls in
//! arrival order and may stub the response, bypassing the [`Backend`].
//!
//! Per-rule state machine:
//!
//! ```text
//! Registered --(request observed)--> HasPendingCalls(n)
//! HasPendingCalls(n) --(await_call consumes / all_calls reads)--> Registered
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::result::{LanecheckError, LanecheckResult};

// =============================================================================
// Request matching
// =============================================================================

/// HTTP methods for request matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// Any method
    #[serde(rename = "*", alias = "ANY")]
    Any,
}

impl HttpMethod {
    /// Parse a method name; `*` and `ANY` map to [`HttpMethod::Any`]
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "*" | "ANY" => Some(Self::Any),
            _ => None,
        }
    }

    /// Convert to string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Any => "*",
        }
    }

    /// Check if this method matches another
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        *self == Self::Any || *other == Self::Any || *self == *other
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pattern for matching request URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlPattern {
    /// Exact URL match
    Exact(String),
    /// Contains substring
    Contains(String),
    /// Regex match
    Regex(String),
    /// Glob pattern; `**` crosses `/`, `*` and `?` do not
    Glob(String),
    /// Match any URL
    Any,
}

impl UrlPattern {
    /// Build the regex behind a `Regex` or `Glob` pattern once
    ///
    /// # Errors
    ///
    /// Returns [`LanecheckError::InvalidUrlPattern`] if the regex does not compile
    pub fn compile(&self) -> LanecheckResult<UrlMatcher> {
        let source = match self {
            Self::Regex(pattern) => Some(pattern.clone()),
            Self::Glob(pattern) => Some(glob_to_regex(pattern)),
            Self::Exact(_) | Self::Contains(_) | Self::Any => None,
        };
        let regex = source
            .map(|source| regex::Regex::new(&source))
            .transpose()
            .map_err(|e| LanecheckError::InvalidUrlPattern {
                pattern: self.to_string(),
                message: e.to_string(),
            })?;
        Ok(UrlMatcher {
            pattern: self.clone(),
            regex,
        })
    }

    /// Check if a URL matches this pattern; an invalid regex matches nothing
    ///
    /// Globs match either the full URL or its path, so `/candidates/*` and
    /// `**/candidates/*` both match `http://host/candidates/7`.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.compile().is_ok_and(|matcher| matcher.matches(url))
    }
}

/// Compiled form of a [`UrlPattern`]
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: UrlPattern,
    regex: Option<regex::Regex>,
}

impl UrlMatcher {
    /// Source pattern
    #[must_use]
    pub const fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    /// Check if a URL matches
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match (&self.pattern, &self.regex) {
            (UrlPattern::Exact(pattern), _) => {
                url == pattern.as_str() || url_path(url) == pattern.as_str()
            }
            (UrlPattern::Contains(pattern), _) => url.contains(pattern.as_str()),
            (UrlPattern::Regex(_), Some(re)) => re.is_match(url),
            (UrlPattern::Glob(_), Some(re)) => re.is_match(url) || re.is_match(url_path(url)),
            (UrlPattern::Regex(_) | UrlPattern::Glob(_), None) => false,
            (UrlPattern::Any, _) => true,
        }
    }
}

impl From<&str> for UrlPattern {
    /// Wildcards make a glob; anything else is a substring match
    fn from(value: &str) -> Self {
        if value == "*" || value == "**" {
            Self::Any
        } else if value.contains(['*', '?']) {
            Self::Glob(value.to_string())
        } else {
            Self::Contains(value.to_string())
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) | Self::Contains(p) | Self::Glob(p) => f.write_str(p),
            Self::Regex(p) => write!(f, "/{p}/"),
            Self::Any => f.write_str("**"),
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    out.push('$');
    out
}

/// Path component of a URL, without scheme, host, or query string
fn url_path(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(i) => {
            let after = &url[i + 3..];
            after.find('/').map_or("/", |p| &after[p..])
        }
        None => url,
    };
    rest.split(['?', '#']).next().unwrap_or(rest)
}

// =============================================================================
// Requests, responses, recorded calls
// =============================================================================

/// Outgoing request issued by the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    /// JSON body
    pub body: Option<Value>,
}

impl HttpRequest {
    /// GET request without a body
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    /// PUT request with a JSON body
    #[must_use]
    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Put,
            url: url.into(),
            body: Some(body),
        }
    }

    /// Path component of the URL
    #[must_use]
    pub fn path(&self) -> &str {
        url_path(&self.url)
    }
}

/// Response delivered to the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body
    pub body: Value,
}

impl HttpResponse {
    /// Response with a status and JSON body
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// JSON error response `{"error": message}`
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::new(status, serde_json::json!({ "error": message }))
    }

    /// 2xx status
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Response that replaces the backend for matching requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body
    #[serde(default)]
    pub body: Value,
}

impl Default for StubResponse {
    fn default() -> Self {
        Self {
            status: 200,
            body: Value::Null,
        }
    }
}

impl StubResponse {
    /// 200 with a JSON body
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// Error response `{"error": message}`
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }),
        }
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

/// A request observed by the interceptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCall {
    /// Session-wide sequence number
    pub seq: u64,
    /// HTTP method
    pub method: HttpMethod,
    /// Request URL
    pub url: String,
    /// Request body
    pub body: Option<Value>,
    /// Status delivered to the application
    pub status: u16,
    /// Whether a stub supplied the response
    pub stubbed: bool,
}

impl RecordedCall {
    /// Top-level keys of a JSON object body, sorted
    #[must_use]
    pub fn body_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match &self.body {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        keys.sort();
        keys
    }

    /// Top-level body field
    #[must_use]
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|b| b.get(key))
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Handle to a rule registered on one session's interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleHandle(usize);

/// Observable state of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// No unread calls
    Registered,
    /// Unread calls waiting to be consumed
    HasPendingCalls(usize),
}

/// A registered matcher with its recorded calls
#[derive(Debug, Clone)]
pub struct InterceptRule {
    method: HttpMethod,
    pattern: UrlPattern,
    stub: Option<StubResponse>,
    alias: Option<String>,
    matcher: Option<UrlMatcher>,
    calls: Vec<RecordedCall>,
    cursor: usize,
}

impl InterceptRule {
    /// Create a recording-only rule
    #[must_use]
    pub fn new(method: HttpMethod, pattern: impl Into<UrlPattern>) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            stub: None,
            alias: None,
            matcher: None,
            calls: Vec::new(),
            cursor: 0,
        }
    }

    /// Replace the backend response for matching calls
    #[must_use]
    pub fn with_stub(mut self, stub: StubResponse) -> Self {
        self.stub = Some(stub);
        self
    }

    /// Name the rule
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Alias, if any
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Human-readable label: `@alias` or `METHOD pattern`
    #[must_use]
    pub fn label(&self) -> String {
        match &self.alias {
            Some(alias) => format!("@{alias}"),
            None => format!("{} {}", self.method, self.pattern),
        }
    }

    /// Check if this rule matches a request
    #[must_use]
    pub fn matches(&self, request: &HttpRequest) -> bool {
        self.method.matches(&request.method)
            && match &self.matcher {
                Some(matcher) => matcher.matches(&request.url),
                None => self.pattern.matches(&request.url),
            }
    }

    /// Calls recorded so far, read or not
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Unread calls
    #[must_use]
    pub fn pending(&self) -> usize {
        self.calls.len() - self.cursor
    }
}

/// Per-session rule registry
#[derive(Debug, Default)]
pub struct Interceptor {
    rules: Vec<InterceptRule>,
}

impl Interceptor {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule; it sees only requests issued from now on
    ///
    /// # Errors
    ///
    /// Returns [`LanecheckError::InvalidUrlPattern`] if the rule's pattern does not compile
    pub fn register(&mut self, mut rule: InterceptRule) -> LanecheckResult<RuleHandle> {
        rule.matcher = Some(rule.pattern.compile()?);
        tracing::debug!(rule = %rule.label(), stubbed = rule.stub.is_some(), "intercept registered");
        self.rules.push(rule);
        Ok(RuleHandle(self.rules.len() - 1))
    }

    /// Number of registered rules
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Look up a rule
    pub fn rule(&self, handle: RuleHandle) -> LanecheckResult<&InterceptRule> {
        self.rules.get(handle.0).ok_or_else(|| LanecheckError::UnknownRule {
            rule: format!("#{}", handle.0),
        })
    }

    fn rule_mut(&mut self, handle: RuleHandle) -> LanecheckResult<&mut InterceptRule> {
        self.rules.get_mut(handle.0).ok_or_else(|| LanecheckError::UnknownRule {
            rule: format!("#{}", handle.0),
        })
    }

    /// Most recently registered rule with this alias
    pub fn resolve_alias(&self, alias: &str) -> LanecheckResult<RuleHandle> {
        let alias = alias.trim_start_matches('@');
        self.rules
            .iter()
            .rposition(|r| r.alias() == Some(alias))
            .map(RuleHandle)
            .ok_or_else(|| LanecheckError::UnknownRule {
                rule: format!("@{alias}"),
            })
    }

    /// Indices of rules matching `request`, in registration order
    fn matching(&self, request: &HttpRequest) -> Vec<usize> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(request))
            .map(|(i, _)| i)
            .collect()
    }

    /// Current state of a rule
    pub fn state(&self, handle: RuleHandle) -> LanecheckResult<RuleState> {
        let pending = self.rule(handle)?.pending();
        Ok(if pending == 0 {
            RuleState::Registered
        } else {
            RuleState::HasPendingCalls(pending)
        })
    }

    /// Consume the oldest unread call
    pub fn take_unread(&mut self, handle: RuleHandle) -> LanecheckResult<Option<RecordedCall>> {
        let rule = self.rule_mut(handle)?;
        let call = rule.calls.get(rule.cursor).cloned();
        if call.is_some() {
            rule.cursor += 1;
        }
        Ok(call)
    }

    /// Snapshot of every call recorded for the rule; marks them read
    pub fn all_calls(&mut self, handle: RuleHandle) -> LanecheckResult<Vec<RecordedCall>> {
        let rule = self.rule_mut(handle)?;
        rule.cursor = rule.calls.len();
        Ok(rule.calls.clone())
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Whatever answers requests the interceptor does not stub
pub trait Backend {
    /// Produce a response for the request
    fn handle(&mut self, request: &HttpRequest) -> HttpResponse;
}

/// Backend that answers every request with 404
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundBackend;

impl Backend for NotFoundBackend {
    fn handle(&mut self, request: &HttpRequest) -> HttpResponse {
        HttpResponse::error(404, &format!("no route for {} {}", request.method, request.path()))
    }
}

/// Session-scoped network: interceptor, backend, and request log
pub struct Network {
    interceptor: Interceptor,
    backend: Box<dyn Backend>,
    log: Vec<RecordedCall>,
    next_seq: u64,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("interceptor", &self.interceptor)
            .field("log", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl Network {
    /// Create a network over a backend
    #[must_use]
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            interceptor: Interceptor::new(),
            backend,
            log: Vec::new(),
            next_seq: 0,
        }
    }

    /// Issue a request
    ///
    /// Every matching rule records the call. The most recently registered
    /// stubbing rule supplies the response; otherwise the backend answers.
    pub fn fetch(&mut self, request: HttpRequest) -> HttpResponse {
        let matching = self.interceptor.matching(&request);
        let stub = matching
            .iter()
            .rev()
            .find_map(|i| self.interceptor.rules[*i].stub.clone());

        let stubbed = stub.is_some();
        let response = match stub {
            Some(stub) => HttpResponse::new(stub.status, stub.body),
            None => self.backend.handle(&request),
        };

        self.next_seq += 1;
        let call = RecordedCall {
            seq: self.next_seq,
            method: request.method,
            url: request.url,
            body: request.body,
            status: response.status,
            stubbed,
        };
        tracing::debug!(
            method = %call.method,
            url = %call.url,
            status = call.status,
            stubbed,
            rules = matching.len(),
            "request"
        );
        for i in matching {
            self.interceptor.rules[i].calls.push(call.clone());
        }
        self.log.push(call);
        response
    }

    /// Rule registry
    #[must_use]
    pub const fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Mutable rule registry
    pub fn interceptor_mut(&mut self) -> &mut Interceptor {
        &mut self.interceptor
    }

    /// Every request issued in this session, intercepted or not
    #[must_use]
    pub fn log(&self) -> &[RecordedCall] {
        &self.log
    }
}
