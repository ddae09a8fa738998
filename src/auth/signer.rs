use super::credentials::Credentials;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use url::{Position, Url};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "hmac-sha256";
const SIGNED_HEADERS: &str = "host date request-line";

/// Failure to produce a signed handshake URL. Always fatal, raised before connecting.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid endpoint URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("endpoint URL has no host: {0}")]
    MissingHost(String),

    #[error("api key is empty")]
    EmptyApiKey,

    #[error("api secret is empty")]
    EmptyApiSecret,

    #[error("api secret rejected as HMAC key")]
    InvalidKey,
}

/// Build the signed handshake URL for `base_url`, dated now
pub fn build_handshake_url(base_url: &str, credentials: &Credentials) -> Result<Url, SigningError> {
    build_handshake_url_at(base_url, credentials, Utc::now())
}

/// Build the signed handshake URL for `base_url` at a fixed instant
///
/// Identical inputs at the same instant produce identical output. The server
/// only accepts signatures whose date is close to its own clock, so a URL
/// built here goes stale quickly.
pub fn build_handshake_url_at(
    base_url: &str,
    credentials: &Credentials,
    date: DateTime<Utc>,
) -> Result<Url, SigningError> {
    if credentials.api_key.is_empty() {
        return Err(SigningError::EmptyApiKey);
    }

    let mut url = Url::parse(base_url).map_err(|source| SigningError::InvalidUrl {
        url: base_url.to_string(),
        source,
    })?;

    if url.host_str().is_none() {
        return Err(SigningError::MissingHost(base_url.to_string()));
    }

    // host[:port], as it appears on the wire in the Host header
    let host = url[Position::BeforeHost..Position::AfterPort].to_string();
    let date = format_date(date);
    let digest = signature(&host, url.path(), &date, &credentials.api_secret)?;

    let authorization_origin = format!(
        "api_key=\"{}\", algorithm=\"{}\", headers=\"{}\", signature=\"{}\"",
        credentials.api_key, ALGORITHM, SIGNED_HEADERS, digest
    );
    let authorization =
        base64::engine::general_purpose::STANDARD.encode(authorization_origin.as_bytes());

    url.query_pairs_mut()
        .append_pair("authorization", &authorization)
        .append_pair("date", &date)
        .append_pair("host", &host);

    debug!("Signed handshake for {}{} at {}", host, url.path(), date);

    Ok(url)
}

/// RFC 1123 date in GMT, e.g. `Sun, 03 Sep 2023 16:47:59 GMT`
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Base64 HMAC-SHA256 over the canonical signing string
pub fn signature(host: &str, path: &str, date: &str, secret: &str) -> Result<String, SigningError> {
    if secret.is_empty() {
        return Err(SigningError::EmptyApiSecret);
    }

    let signing_string = format!("host: {}\ndate: {}\nGET {} HTTP/1.1", host, date, path);

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SigningError::InvalidKey)?;
    mac.update(signing_string.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DATE: &str = "Sun, 03 Sep 2023 16:47:59 GMT";

    fn fixed_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 9, 3, 16, 47, 59).unwrap()
    }

    #[test]
    fn test_format_date_rfc1123() {
        assert_eq!(format_date(fixed_instant()), DATE);
    }

    #[test]
    fn test_signature_known_vector() {
        let sig = signature("aiui.xf-yun.com", "/v3/aiint/sos", DATE, "secret").unwrap();
        assert_eq!(sig, "ah8Fajxr1hXLCxkJpXLTy+WO1i3AGQVWUAaeg2Ye0V8=");
    }

    #[test]
    fn test_signature_changes_with_every_input() {
        let base = signature("a.example", "/p", DATE, "s").unwrap();

        assert_eq!(base, signature("a.example", "/p", DATE, "s").unwrap());
        assert_ne!(base, signature("b.example", "/p", DATE, "s").unwrap());
        assert_ne!(base, signature("a.example", "/q", DATE, "s").unwrap());
        assert_ne!(
            base,
            signature("a.example", "/p", "Mon, 04 Sep 2023 16:47:59 GMT", "s").unwrap()
        );
        assert_ne!(base, signature("a.example", "/p", DATE, "t").unwrap());
    }

    #[test]
    fn test_handshake_url_query() {
        let creds = Credentials::new("app", "key", "secret");
        let url =
            build_handshake_url_at("wss://aiui.xf-yun.com/v3/aiint/sos", &creds, fixed_instant())
                .unwrap();

        assert_eq!(
            url.as_str(),
            "wss://aiui.xf-yun.com/v3/aiint/sos?authorization=YXBpX2tleT0ia2V5IiwgYWxnb3JpdGhtPSJobWFjLXNoYTI1NiIsIGhlYWRlcnM9Imhvc3QgZGF0ZSByZXF1ZXN0LWxpbmUiLCBzaWduYXR1cmU9ImFoOEZhanhyMWhYTEN4a0pwWExUeStXTzFpM0FHUVZXVUFhZWcyWWUwVjg9Ig%3D%3D&date=Sun%2C+03+Sep+2023+16%3A47%3A59+GMT&host=aiui.xf-yun.com"
        );
    }

    #[test]
    fn test_handshake_url_keeps_explicit_port_in_host() {
        let creds = Credentials::new("app", "key", "secret");
        let url = build_handshake_url_at("ws://127.0.0.1:9001/sos", &creds, fixed_instant()).unwrap();

        let host = url
            .query_pairs()
            .find(|(k, _)| k == "host")
            .map(|(_, v)| v.into_owned());
        assert_eq!(host.as_deref(), Some("127.0.0.1:9001"));
    }

    #[test]
    fn test_handshake_url_deterministic() {
        let creds = Credentials::new("app", "key", "secret");
        let a = build_handshake_url_at("wss://h.example/x", &creds, fixed_instant()).unwrap();
        let b = build_handshake_url_at("wss://h.example/x", &creds, fixed_instant()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_signing_errors() {
        let creds = Credentials::new("app", "key", "secret");
        assert!(matches!(
            build_handshake_url_at("not a url", &creds, fixed_instant()),
            Err(SigningError::InvalidUrl { .. })
        ));

        let no_secret = Credentials::new("app", "key", "");
        assert!(matches!(
            build_handshake_url_at("wss://h.example/x", &no_secret, fixed_instant()),
            Err(SigningError::EmptyApiSecret)
        ));

        let no_key = Credentials::new("app", "", "secret");
        assert!(matches!(
            build_handshake_url_at("wss://h.example/x", &no_key, fixed_instant()),
            Err(SigningError::EmptyApiKey)
        ));
    }
}
