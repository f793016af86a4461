use std::collections::BTreeMap;
use std::net::SocketAddr;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};

use crate::app::body::{full_body, ResponseBody};

use super::request::{ConnectionDetails, HttpMethod, NeutralRequest};
use super::response::NeutralResponse;

/// Builds a [`ConnectionDetails`] record from the pieces available at
/// accept/request time. `local_addr` and `server_addr` are usually the same
/// value for a non-proxied listener; callers behind a reverse proxy may
/// supply a different `server_addr` derived from forwarded headers.
pub fn connection_details_from_parts(
    scheme: &str,
    version: hyper::Version,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    server_addr: SocketAddr,
    host: &str,
) -> ConnectionDetails {
    ConnectionDetails {
        scheme: scheme.to_string(),
        version: format!("{:?}", version),
        local_addr,
        remote_addr,
        server_addr,
        host: host.to_string(),
        port: server_addr.port(),
    }
}

/// Joins a hyper `HeaderMap` into a `name -> joined value` mapping,
/// comma-joining repeated header names.
pub fn join_headers(headers: &hyper::HeaderMap) -> BTreeMap<String, String> {
    let mut joined: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let value = value.to_str().unwrap_or_default().to_string();
        joined.entry(name.as_str().to_string()).or_default().push(value);
    }
    joined
        .into_iter()
        .map(|(name, values)| (name, values.join(", ")))
        .collect()
}

/// Parses the `Cookie` header into a `name -> raw value` mapping.
pub fn parse_cookies(headers: &hyper::HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for value in headers.get_all(hyper::header::COOKIE) {
        if let Ok(s) = value.to_str() {
            for pair in s.split(';') {
                if let Some((k, v)) = pair.trim().split_once('=') {
                    out.insert(k.trim().to_string(), v.trim().to_string());
                }
            }
        }
    }
    out
}

/// Parses a raw query string into a `name -> first value` mapping.
pub fn parse_query(raw: Option<&str>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(raw) = raw {
        for pair in url::form_urlencoded::parse(raw.as_bytes()) {
            out.entry(pair.0.to_string()).or_insert_with(|| pair.1.to_string());
        }
    }
    out
}

/// Builds a [`NeutralRequest`] from an inbound hyper request, reading the
/// body only for methods that carry one (`spec.md` §3). `scheme`,
/// `local_addr`, `remote_addr` and `server_addr` come from the connection
/// layer, since hyper's `Request` carries neither.
pub async fn neutral_request_from_hyper(
    req: Request<Incoming>,
    scheme: &str,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    server_addr: SocketAddr,
) -> Result<NeutralRequest, hyper::Error> {
    let (parts, body) = req.into_parts();

    let method = HttpMethod::try_from(&parts.method).unwrap_or(HttpMethod::Get);
    let host = parts
        .headers
        .get(hyper::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(&remote_addr.ip().to_string())
        .to_string();

    let connection = connection_details_from_parts(scheme, parts.version, local_addr, remote_addr, server_addr, &host);

    let (body, body_content_type) = if method.reads_body() {
        let collected = body.collect().await?.to_bytes();
        if collected.is_empty() {
            (None, None)
        } else {
            let content_type = parts
                .headers
                .get(hyper::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            (Some(collected.to_vec()), content_type)
        }
    } else {
        (None, None)
    };

    Ok(NeutralRequest {
        connection: (connection.clone(), connection),
        method,
        query: parse_query(parts.uri.query()),
        headers: join_headers(&parts.headers),
        cookies: parse_cookies(&parts.headers),
        body,
        body_content_type,
    })
}

/// Converts a [`NeutralResponse`] into a wire-level hyper response, with
/// headers appended (never replacing any the caller has already set on the
/// builder) and content-type applied last.
pub fn into_hyper_response(
    response: NeutralResponse,
) -> Result<Response<ResponseBody>, hyper::http::Error> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    if let Some(content_type) = &response.content_type {
        builder = builder.header(hyper::header::CONTENT_TYPE, content_type);
    }
    builder.body(full_body(response.body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_keeps_first_value_per_name() {
        let query = parse_query(Some("a=1&a=2&b=3"));
        assert_eq!(query.get("a"), Some(&"1".to_string()));
        assert_eq!(query.get("b"), Some(&"3".to_string()));
    }

    #[test]
    fn parse_query_handles_absent_query() {
        assert!(parse_query(None).is_empty());
    }
}
