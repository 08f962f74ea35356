//! Connection string (DSN) resolution
//!
//! A DSN has the form `scheme://apikey@host[:port]`. The API key travels in
//! the username position; everything else names the collector endpoint.

use reqwest::Url;

use crate::error::{Error, Result};

/// A resolved connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    /// `scheme://host[:port]`, with host and port exactly as written
    pub endpoint: String,
    /// API key sent as the `X-OBS-Key` header
    pub api_key: String,
}

impl Dsn {
    /// Resolve a connection string into endpoint and API key.
    pub fn parse(dsn: &str) -> Result<Self> {
        let url = Url::parse(dsn).map_err(|e| Error::MalformedDsn(e.to_string()))?;
        if url.host_str().is_none() {
            return Err(Error::MalformedDsn(format!("{} has no host", dsn)));
        }

        // `Url` normalizes `http://@host` to `http://host`, so tell a missing
        // credential from an empty one by looking at the raw authority.
        let authority = raw_authority(dsn)
            .ok_or_else(|| Error::MalformedDsn(format!("{} has no authority", dsn)))?;
        let host_port = match authority.rsplit_once('@') {
            Some((_, host_port)) => host_port,
            None => return Err(Error::MissingCredential),
        };

        if url.username().is_empty() {
            return Err(Error::EmptyCredential);
        }

        let api_key = urlencoding::decode(url.username())
            .map_err(|e| Error::MalformedDsn(format!("API key is not valid UTF-8: {}", e)))?
            .into_owned();

        Ok(Self {
            endpoint: format!("{}://{}", url.scheme(), host_port),
            api_key,
        })
    }

    /// URL events are posted to.
    pub fn events_url(&self) -> String {
        format!("{}/api/events", self.endpoint.trim_end_matches('/'))
    }
}

impl std::str::FromStr for Dsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The `userinfo@host:port` part between `scheme://` and the path.
fn raw_authority(dsn: &str) -> Option<&str> {
    let (_, rest) = dsn.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_port() {
        let dsn = Dsn::parse("http://mykey@localhost:8000").unwrap();
        assert_eq!(dsn.endpoint, "http://localhost:8000");
        assert_eq!(dsn.api_key, "mykey");
    }

    #[test]
    fn test_parse_https_without_port() {
        let dsn = Dsn::parse("https://secret@example.com").unwrap();
        assert_eq!(dsn.endpoint, "https://example.com");
        assert_eq!(dsn.api_key, "secret");
    }

    #[test]
    fn test_parse_keeps_default_port_as_written() {
        let dsn = Dsn::parse("http://k@collector.internal:80").unwrap();
        assert_eq!(dsn.endpoint, "http://collector.internal:80");
    }

    #[test]
    fn test_parse_ignores_path_and_password() {
        let dsn = Dsn::parse("http://key:pw@127.0.0.1:9000/some/path").unwrap();
        assert_eq!(dsn.endpoint, "http://127.0.0.1:9000");
        assert_eq!(dsn.api_key, "key");
    }

    #[test]
    fn test_parse_decodes_percent_encoded_key() {
        let dsn = Dsn::parse("http://ab%2Bcd@localhost").unwrap();
        assert_eq!(dsn.api_key, "ab+cd");
    }

    #[test]
    fn test_missing_credential() {
        assert!(matches!(
            Dsn::parse("http://localhost:8000"),
            Err(Error::MissingCredential)
        ));
    }

    #[test]
    fn test_empty_credential() {
        assert!(matches!(
            Dsn::parse("http://@localhost:8000"),
            Err(Error::EmptyCredential)
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(Dsn::parse("://bad"), Err(Error::MalformedDsn(_))));
        assert!(matches!(Dsn::parse("not a url"), Err(Error::MalformedDsn(_))));
        assert!(matches!(Dsn::parse(""), Err(Error::MalformedDsn(_))));
    }

    #[test]
    fn test_events_url() {
        let dsn: Dsn = "http://k@localhost:8000".parse().unwrap();
        assert_eq!(dsn.events_url(), "http://localhost:8000/api/events");
    }
}
