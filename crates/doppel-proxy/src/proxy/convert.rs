//! Conversions between hyper messages and the engine's request/response model.

use crate::engine::{UpstreamError, ERROR_HEADER};
use crate::model::{encode_body, Headers, RequestDetails, ResponseDetails};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, HOST};
use hyper::http::request::Parts;
use hyper::{Request, Response, StatusCode, Uri};
use tracing::warn;

/// Connection-scoped headers never copied between hops.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Group header values by lowercase name, preserving value order.
pub fn headers_from_map(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

/// Build the engine's view of an inbound request. Absolute-form URIs (proxy
/// requests) carry scheme and destination; origin-form requests take the
/// destination from the Host header.
pub fn request_details(parts: &Parts, body: &Bytes) -> RequestDetails {
    let uri = &parts.uri;
    let destination = match uri.authority() {
        Some(authority) => authority.as_str().to_string(),
        None => parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };

    let (text, body_mode) = encode_body(body);

    RequestDetails {
        path: uri.path().to_string(),
        method: parts.method.as_str().to_string(),
        destination,
        scheme: uri.scheme_str().unwrap_or("http").to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        body: text,
        body_mode,
        headers: headers_from_map(&parts.headers),
    }
}

/// Absolute URI a request should be forwarded to.
pub fn upstream_uri(details: &RequestDetails) -> Result<Uri, UpstreamError> {
    if details.destination.is_empty() {
        return Err(UpstreamError::InvalidRequest(
            "request has no destination".to_string(),
        ));
    }
    let scheme = if details.scheme.is_empty() {
        "http"
    } else {
        details.scheme.as_str()
    };
    let path = if details.path.is_empty() {
        "/"
    } else {
        details.path.as_str()
    };
    let mut uri = format!("{}://{}{}", scheme, details.destination, path);
    if !details.query.is_empty() {
        uri.push('?');
        uri.push_str(&details.query);
    }
    uri.parse()
        .map_err(|e| UpstreamError::InvalidRequest(format!("{uri}: {e}")))
}

/// Copy end-to-end headers. Host and Content-Length are recomputed by the client.
pub fn copy_forwardable(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if is_hop_by_hop(name.as_str()) || *name == HOST || *name == CONTENT_LENGTH {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

/// Outbound request for the upstream, built from the engine's model.
pub fn upstream_request(details: &RequestDetails) -> Result<Request<Full<Bytes>>, UpstreamError> {
    let uri = upstream_uri(details)?;
    let method = hyper::Method::from_bytes(details.method.as_bytes())
        .map_err(|e| UpstreamError::InvalidRequest(format!("method {:?}: {e}", details.method)))?;

    let mut request = Request::new(Full::new(Bytes::from(details.body_bytes())));
    *request.method_mut() = method;
    *request.uri_mut() = uri;

    let headers = request.headers_mut();
    for (name, values) in &details.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("host") {
            continue;
        }
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!("Dropping invalid request header name {:?}", name);
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    Ok(request)
}

/// Render an engine response for the client.
pub fn into_hyper_response(details: ResponseDetails) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(details.status).unwrap_or_else(|_| {
        warn!("Invalid response status {}, sending 502", details.status);
        StatusCode::BAD_GATEWAY
    });

    let mut response = Response::new(Full::new(Bytes::from(details.body_bytes())));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, values) in &details.headers {
        // The body may have been rewritten; hyper sets the length.
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!("Dropping invalid response header name {:?}", name);
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => warn!("Dropping invalid value for response header {}", name),
            }
        }
    }
    response
}

/// Error produced by the transport itself, marked like engine errors.
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("doppel: {message}\n"))));
    *response.status_mut() = status;
    response.headers_mut().insert(
        HeaderName::from_static(ERROR_HEADER),
        HeaderValue::from_static("true"),
    );
    response
}
