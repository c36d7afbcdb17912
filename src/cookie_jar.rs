//! A minimal RFC 6265 cookie jar.

use std::time::{Instant, SystemTime};

use cookie::Cookie as ParsedCookie;
use http::HeaderValue;
use parking_lot::Mutex;
use tracing::debug;

struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    secure: bool,
    expires_at: Option<SystemTime>,
    created_at: Instant,
}

impl StoredCookie {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= SystemTime::now())
    }

    fn domain_matches(&self, host: &str) -> bool {
        if self.host_only {
            self.domain.eq_ignore_ascii_case(host)
        } else {
            let host = host.to_ascii_lowercase();
            let domain = self.domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{domain}"))
        }
    }

    fn path_matches(&self, path: &str) -> bool {
        if self.path == path {
            return true;
        }
        if path.starts_with(&self.path) {
            if self.path.ends_with('/') {
                return true;
            }
            if path.as_bytes().get(self.path.len()) == Some(&b'/') {
                return true;
            }
        }
        false
    }
}

/// A thread-safe cookie store shared by every request a [`Session`](crate::session::Session)
/// makes, implementing the domain/path/secure selection rules of RFC 6265
/// (parsing and grammar validation are delegated to the `cookie` crate;
/// selection and storage are this type's own job).
#[derive(Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<StoredCookie>>,
}

impl CookieJar {
    /// An empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and stores every `Set-Cookie` header from a response, scoped
    /// to the host and path of the request that produced it. Malformed
    /// cookies are logged and dropped rather than rejecting the whole
    /// response.
    pub fn ingest<'a>(&self, set_cookie_headers: impl Iterator<Item = &'a HeaderValue>, request_host: &str, request_path: &str) {
        let mut store = self.cookies.lock();
        for header in set_cookie_headers {
            let Ok(raw) = header.to_str() else { continue };
            let Ok(parsed) = ParsedCookie::parse(raw.to_owned()) else {
                debug!(raw, "dropping unparsable Set-Cookie header");
                continue;
            };

            let (domain, host_only) = match parsed.domain() {
                Some(domain) => {
                    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                    let host = request_host.to_ascii_lowercase();
                    if host != domain && !host.ends_with(&format!(".{domain}")) {
                        debug!(domain, request_host, "dropping Set-Cookie whose Domain is not a suffix of the request host");
                        continue;
                    }
                    (domain, false)
                }
                None => (request_host.to_ascii_lowercase(), true),
            };
            let path = parsed
                .path()
                .map(str::to_owned)
                .unwrap_or_else(|| default_path(request_path));
            let expires_at = parsed
                .max_age()
                .map(|age| {
                    let secs = age.whole_seconds().unsigned_abs();
                    SystemTime::now() + std::time::Duration::from_secs(secs)
                })
                .or_else(|| parsed.expires_datetime().map(SystemTime::from));

            let name = parsed.name().to_owned();
            let value = parsed.value().to_owned();
            let secure = parsed.secure().unwrap_or(false);

            store.retain(|c| !(c.name == name && c.domain == domain && c.path == path));

            // A Max-Age=0 or an already-past Expires both mean "delete this
            // cookie", per RFC 6265 5.3 step 3; don't re-insert it.
            if matches!(expires_at, Some(at) if at <= SystemTime::now()) {
                continue;
            }

            store.push(StoredCookie {
                name,
                value,
                domain,
                host_only,
                path,
                secure,
                expires_at,
                created_at: Instant::now(),
            });
        }
    }

    /// Builds the `Cookie` header value to attach to a request to `host`
    /// and `path`, or `None` if no stored cookie applies. Cookies are
    /// ordered by longest matching path first and, among ties, by earliest
    /// creation time, per RFC 6265 5.4.
    pub fn header_value(&self, host: &str, path: &str, secure: bool) -> Option<HeaderValue> {
        let mut store = self.cookies.lock();
        store.retain(|c| !c.is_expired());

        let mut matching: Vec<&StoredCookie> = store
            .iter()
            .filter(|c| c.domain_matches(host) && c.path_matches(path) && (secure || !c.secure))
            .collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.created_at.cmp(&b.created_at)));

        let joined = matching
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }
}

fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => request_path[..idx].to_owned(),
    }
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("len", &self.cookies.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(s: &str) -> HeaderValue {
        HeaderValue::from_str(s).unwrap()
    }

    #[test]
    fn stores_and_returns_a_simple_cookie() {
        let jar = CookieJar::new();
        jar.ingest([&header("session=abc123; Path=/")].into_iter(), "example.com", "/login");
        let value = jar.header_value("example.com", "/dashboard", false).unwrap();
        assert_eq!(value, "session=abc123");
    }

    #[test]
    fn host_only_cookie_does_not_match_subdomain() {
        let jar = CookieJar::new();
        jar.ingest([&header("a=1")].into_iter(), "example.com", "/");
        assert!(jar.header_value("www.example.com", "/", false).is_none());
    }

    #[test]
    fn domain_cookie_matches_subdomains() {
        let jar = CookieJar::new();
        jar.ingest([&header("a=1; Domain=example.com")].into_iter(), "example.com", "/");
        assert!(jar.header_value("www.example.com", "/", false).is_some());
    }

    #[test]
    fn secure_cookie_withheld_from_plaintext_request() {
        let jar = CookieJar::new();
        jar.ingest([&header("a=1; Secure")].into_iter(), "example.com", "/");
        assert!(jar.header_value("example.com", "/", false).is_none());
        assert!(jar.header_value("example.com", "/", true).is_some());
    }

    #[test]
    fn longest_path_sorts_first() {
        let jar = CookieJar::new();
        jar.ingest([&header("short=1; Path=/")].into_iter(), "example.com", "/");
        jar.ingest([&header("long=2; Path=/a/b")].into_iter(), "example.com", "/a/b");
        let value = jar.header_value("example.com", "/a/b/c", false).unwrap();
        assert_eq!(value, "long=2; short=1");
    }

    #[test]
    fn max_age_zero_deletes_existing_cookie() {
        let jar = CookieJar::new();
        jar.ingest([&header("a=1; Path=/")].into_iter(), "example.com", "/");
        assert!(jar.header_value("example.com", "/", false).is_some());
        jar.ingest([&header("a=1; Path=/; Max-Age=0")].into_iter(), "example.com", "/");
        assert!(jar.header_value("example.com", "/", false).is_none());
    }
}
