//! Side-effect free lookups against the pieces of an inbound request.

use std::borrow::Cow;

use axum::http::header::COOKIE;
use axum::http::{Extensions, HeaderMap};
use percent_encoding::percent_decode_str;

/// Identifier returned when the request path does not carry one.
pub const DEFAULT_ID: &str = "0";

/// The authenticated user, inserted into the request extensions by whatever
/// authentication layer runs in front of the media routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Principal { username: username.into() }
    }
}

/// The part of `path` following the first occurrence of `prefix`, or
/// [`DEFAULT_ID`] when the prefix does not occur.
pub fn get_id<'a>(path: &'a str, prefix: &str) -> &'a str {
    match path.find(prefix) {
        Some(pos) => &path[pos + prefix.len()..],
        None => DEFAULT_ID,
    }
}

/// Percent-decodes an identifier taken from the raw request path. `None`
/// when the decoded bytes are not UTF-8.
pub fn decode_id(id: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(id).decode_utf8().ok()
}

/// Drops a trailing `.extension` from an identifier.
pub fn strip(id: &str) -> &str {
    match id.rfind('.') {
        Some(pos) => &id[..pos],
        None => id,
    }
}

/// Looks up `name` in a raw query string, ignoring case in the name. Only
/// non-empty values count.
pub fn get_query_var<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    let query = query.filter(|q| !q.is_empty())?;
    query.split('&').find_map(|pair| {
        let mut parts = pair.split('=');
        let key = parts.next()?;
        let value = parts.next()?;
        (key.eq_ignore_ascii_case(name) && !value.is_empty()).then_some(value)
    })
}

/// Value of cookie `name` from the first `Cookie` header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let raw = headers.get(COOKIE)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.split(';').find_map(|entry| {
        entry
            .trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

/// Username of the authenticated principal, or an empty string.
pub fn user_name(extensions: &Extensions) -> &str {
    extensions
        .get::<Principal>()
        .map(|p| p.username.as_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use axum::http::{Extensions, HeaderMap, HeaderValue};
    use axum::http::header::COOKIE;

    use super::*;

    fn cookies(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_get_id() {
        assert_eq!("42.mp4", get_id("/media/42.mp4", "/media/"));
        assert_eq!("sub/42.mp4", get_id("/play/media/sub/42.mp4", "/media/"));
        assert_eq!("", get_id("/media/", "/media/"));
        assert_eq!("0", get_id("/other/42.mp4", "/media/"));
    }

    #[test]
    fn test_decode_id() {
        assert_eq!(Some("my clip.webm"), decode_id("my%20clip.webm").as_deref());
        assert_eq!(Some("../secret"), decode_id("%2e%2e/secret").as_deref());
        assert_eq!(Some("caf\u{e9}.mp4"), decode_id("caf%C3%A9.mp4").as_deref());
        assert_eq!(Some("42.mp4"), decode_id("42.mp4").as_deref());
        assert_eq!(None, decode_id("bad%FF.mp4"));
    }

    #[test]
    fn test_strip() {
        assert_eq!("42", strip(get_id("/media/42.mp4", "/media/")));
        assert_eq!("archive.tar", strip("archive.tar.gz"));
        assert_eq!("42", strip("42"));
        assert_eq!("", strip(".hidden"));
    }

    #[test]
    fn test_get_query_var() {
        assert_eq!(Some("3"), get_query_var(Some("a=1&b=&C=3"), "c"));
        assert_eq!(Some("1"), get_query_var(Some("a=1&b=&C=3"), "A"));
        assert_eq!(None, get_query_var(Some("a=1&b=&C=3"), "b"));
        assert_eq!(None, get_query_var(Some("a=1&b&C=3"), "b"));
        assert_eq!(None, get_query_var(Some("a=1"), "z"));
        assert_eq!(None, get_query_var(Some(""), "a"));
        assert_eq!(None, get_query_var(None, "a"));
        assert_eq!(Some("2"), get_query_var(Some("x=&x=2"), "x"));
    }

    #[test]
    fn test_get_cookie() {
        let headers = cookies("sid=abc; theme=dark");
        assert_eq!(Some("dark"), get_cookie(&headers, "theme"));
        assert_eq!(Some("abc"), get_cookie(&headers, "sid"));
        assert_eq!(None, get_cookie(&headers, "missing"));
        assert_eq!(None, get_cookie(&headers, "si"));

        let padded = cookies("  a=1 ;b=2  ;  c=  ");
        assert_eq!(Some("2"), get_cookie(&padded, "b"));
        assert_eq!(Some(""), get_cookie(&padded, "c"));

        assert_eq!(None, get_cookie(&HeaderMap::new(), "sid"));
        assert_eq!(None, get_cookie(&cookies(""), "sid"));
    }

    #[test]
    fn test_user_name() {
        let mut extensions = Extensions::new();
        assert_eq!("", user_name(&extensions));
        extensions.insert(Principal::new("alice"));
        assert_eq!("alice", user_name(&extensions));
    }
}
