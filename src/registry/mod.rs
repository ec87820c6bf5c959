//! Registry indexes, their endpoints, and the clients that talk to them

mod auth;
mod default;
mod http;
mod service;
mod transport;

pub use default::DefaultRegistry;
pub use http::{HttpTransport, HttpTransportBuilder};
pub use service::{Service, ServiceBuilder};
pub use transport::{
    AuthConfig, ManifestService, MetaHeaders, RepositoryData, Session, TagMap, Transport,
};

use crate::{
    errors::ImageError,
    image::{ImageName, Registry, Repository},
};
use std::fmt;
use url::Url;

/// Generation of the registry HTTP API
///
/// Versions order by age, so sorting puts [ApiVersion::V1] first.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ApiVersion {
    /// Legacy session and tag protocol
    V1,
    /// Content-addressed manifest protocol
    V2,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::V1 => f.write_str("v1"),
            ApiVersion::V2 => f.write_str("v2"),
        }
    }
}

/// TLS settings for connecting to one index
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TlsConfig {
    /// Accept any server certificate
    pub insecure_skip_verify: bool,
    /// Additional trusted roots, PEM encoded
    pub root_certificates: Vec<Vec<u8>>,
}

/// One network address and protocol generation for reaching a registry
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    pub url: Url,
    pub version: ApiVersion,
    /// This address serves a copy of the official index
    pub mirror: bool,
    /// This address belongs to the official index
    pub official: bool,
    pub tls: TlsConfig,
}

impl Endpoint {
    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }
}

/// The registry identity that endpoints belong to
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexInfo {
    pub name: Registry,
    /// V1 API addresses of mirrors serving the same content, each ending
    /// in `/v1/`
    pub mirrors: Vec<Url>,
    pub secure: bool,
    pub official: bool,
}

/// Everything the registry service knows about one repository
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepositoryInfo {
    pub index: IndexInfo,
    /// Fully qualified name, without any tag or digest
    pub canonical_name: ImageName,
    /// Name as a user would write it for this index
    pub local_name: Repository,
    /// Path of the repository on the registry server
    pub remote_name: Repository,
}

/// Resolves references to repositories and their pull endpoints
///
/// Implementations are shared between concurrent calls, and only read.
pub trait RegistryService: Send + Sync {
    /// Look up the index and the various names of a fully qualified reference
    fn resolve_repository(&self, name: &ImageName) -> Result<RepositoryInfo, ImageError>;

    /// List the endpoints to try for a canonical name, in preference order
    fn lookup_pull_endpoints(&self, canonical_name: &ImageName) -> Result<Vec<Endpoint>, ImageError>;

    /// TLS settings for an index
    fn tls_config(&self, index: &Registry) -> Result<TlsConfig, ImageError>;
}

/// Reject repository names that can never be pulled
pub fn validate_repo_name(name: &str) -> Result<(), ImageError> {
    lazy_static! {
        static ref IMAGE_ID: regex::Regex = regex::Regex::new("^[a-f0-9]{64}$").unwrap();
    }
    if name.is_empty() {
        Err(ImageError::InvalidRepositoryName("repository name can't be empty".into()))
    } else if name == "scratch" {
        Err(ImageError::InvalidRepositoryName("'scratch' is a reserved name".into()))
    } else if IMAGE_ID.is_match(name) {
        Err(ImageError::InvalidRepositoryName(format!(
            "{}, cannot specify 64-byte hexadecimal strings",
            name
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_order() {
        assert!(ApiVersion::V1 < ApiVersion::V2);
        assert_eq!(ApiVersion::V2.to_string(), "v2");
    }

    #[test]
    fn repo_names() {
        assert!(validate_repo_name("busybox").is_ok());
        assert!(validate_repo_name("").is_err());
        assert!(validate_repo_name("scratch").is_err());
        assert!(validate_repo_name(&format!("{:064x}", 7)).is_err());
        assert!(validate_repo_name(&format!("{:063x}", 7)).is_ok());
    }
}
