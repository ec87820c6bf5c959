//! Registry connections over HTTP

mod v1;
mod v2;

use crate::{
    errors::{error_codes, ImageError, RegistryApiError, RegistryErrorBody},
    registry::{
        auth::Auth, AuthConfig, Endpoint, ManifestService, MetaHeaders, RepositoryInfo, Session,
        TlsConfig, Transport,
    },
};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Response, StatusCode};
use std::time::Duration;

/// Prefix of the caller-supplied metadata headers we forward
const META_HEADER_PREFIX: &str = "x-meta-";

/// Builder for configuring custom [HttpTransport] instances
#[derive(Clone, Debug)]
pub struct HttpTransportBuilder {
    user_agent: HeaderValue,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    local_address: Option<std::net::IpAddr>,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        HttpTransportBuilder::new()
    }
}

impl HttpTransportBuilder {
    /// Start constructing a custom transport
    pub fn new() -> Self {
        HttpTransportBuilder {
            user_agent: HttpTransport::default_user_agent(),
            request_timeout: None,
            connect_timeout: None,
            local_address: None,
        }
    }

    /// Set a timeout for each network request
    ///
    /// This timeout applies from the beginning of a request until the
    /// last byte has been received. By default there is no timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set a timeout for only the initial connect phase of each network request
    ///
    /// By default there is no timeout beyond those built into the networking
    /// stack.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the `User-Agent` header used by this transport
    ///
    /// By default, the value returned by
    /// [HttpTransport::default_user_agent()] is used, which identifies the
    /// version of `reginspect` acting as a client.
    pub fn user_agent<V>(mut self, value: V) -> Result<Self, ImageError>
    where
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Display,
    {
        self.user_agent = value
            .try_into()
            .map_err(|err| ImageError::InvalidHeader(err.to_string()))?;
        Ok(self)
    }

    /// Bind to a specific local IP address
    pub fn local_address<T>(mut self, addr: T) -> Self
    where
        T: Into<Option<std::net::IpAddr>>,
    {
        self.local_address = addr.into();
        self
    }

    /// Construct an HttpTransport using the parameters from this Builder
    pub fn build(self) -> HttpTransport {
        HttpTransport { settings: self }
    }
}

/// The default [Transport], speaking both registry protocols with `reqwest`
///
/// A separate HTTP client is built for every repository or session opened,
/// since TLS settings and metadata headers vary per call.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    settings: HttpTransportBuilder,
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransport::new()
    }
}

impl HttpTransport {
    /// Construct a new transport with default options
    pub fn new() -> HttpTransport {
        HttpTransport::builder().build()
    }

    /// Construct a transport with custom options, via HttpTransportBuilder
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    /// Return the default `User-Agent` that we use if no other is set
    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    fn client(&self, tls: &TlsConfig, meta_headers: &MetaHeaders) -> Result<reqwest::Client, ImageError> {
        let settings = &self.settings;
        let mut builder = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(meta_header_map(meta_headers)?)
            .local_address(settings.local_address);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = settings.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        for pem in &tls.root_certificates {
            builder = builder.add_root_certificate(Certificate::from_pem(pem)?);
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn v2_repository(
        &self,
        repo_info: &RepositoryInfo,
        endpoint: &Endpoint,
        meta_headers: &MetaHeaders,
        auth_config: Option<&AuthConfig>,
    ) -> Result<Box<dyn ManifestService>, ImageError> {
        let client = self.client(&endpoint.tls, meta_headers)?;
        let repo = v2::Repository::new(
            client,
            endpoint.url.clone(),
            repo_info.remote_name.clone(),
            Auth::new(auth_config),
        );
        Ok(Box::new(repo))
    }

    async fn v1_session(
        &self,
        endpoint: &Endpoint,
        tls: &TlsConfig,
        meta_headers: &MetaHeaders,
        auth_config: Option<&AuthConfig>,
    ) -> Result<Box<dyn Session>, ImageError> {
        let client = self.client(tls, meta_headers)?;
        let session = v1::Session::open(client, endpoint, auth_config).await?;
        Ok(Box::new(session))
    }
}

/// Convert metadata headers, keeping only the `X-Meta-` ones
fn meta_header_map(meta_headers: &MetaHeaders) -> Result<HeaderMap, ImageError> {
    let mut map = HeaderMap::new();
    for (key, values) in meta_headers {
        if !key.to_ascii_lowercase().starts_with(META_HEADER_PREFIX) {
            log::debug!("ignoring metadata header {:?}", key);
            continue;
        }
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| ImageError::InvalidHeader(format!("{}: {}", key, err)))?;
        for value in values {
            let value = HeaderValue::from_str(value)
                .map_err(|err| ImageError::InvalidHeader(format!("{}: {}", key, err)))?;
            map.append(name.clone(), value);
        }
    }
    Ok(map)
}

/// Turn an unsuccessful response into the most specific error we can
///
/// Registry error bodies win. A bare 401 counts as an authorization error
/// from the registry, and anything else is reported by status.
async fn error_from_response(response: Response) -> ImageError {
    let url = response.url().to_string();
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    if let Ok(RegistryErrorBody { errors }) = serde_json::from_slice::<RegistryErrorBody>(&body) {
        if !errors.is_empty() {
            return ImageError::RegistryErrors(errors);
        }
    }
    if status == StatusCode::UNAUTHORIZED {
        return ImageError::Registry(RegistryApiError {
            code: error_codes::UNAUTHORIZED.to_string(),
            message: "authentication required".to_string(),
            detail: serde_json::Value::Null,
        });
    }
    ImageError::UnexpectedHttpStatus {
        url,
        status: status.as_u16(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_headers_filtered() {
        let mut meta = MetaHeaders::new();
        meta.insert("X-Meta-Source".into(), vec!["a".into(), "b".into()]);
        meta.insert("Authorization".into(), vec!["nope".into()]);
        let map = meta_header_map(&meta).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get_all("x-meta-source").iter().count(), 2);
        assert!(map.get("authorization").is_none());

        meta.insert("X-Meta-Bad".into(), vec!["line\nbreak".into()]);
        assert!(matches!(
            meta_header_map(&meta),
            Err(ImageError::InvalidHeader(_))
        ));
    }

    #[test]
    fn user_agent() {
        assert!(HttpTransport::default_user_agent()
            .to_str()
            .unwrap()
            .starts_with("reginspect/"));
        assert!(HttpTransport::builder().user_agent("bad\nagent").is_err());
    }
}
