//! Connections to a registry, one trait per protocol generation

use crate::{
    errors::ImageError,
    image::{ContentDigest, Repository, Tag},
    manifest::SignedManifest,
    registry::{Endpoint, RepositoryInfo, TlsConfig},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use url::Url;

/// Extra request headers describing the caller, each beginning with `X-Meta-`
pub type MetaHeaders = BTreeMap<String, Vec<String>>;

/// Tag names mapped to legacy image IDs
pub type TagMap = BTreeMap<String, String>;

/// Credentials for one registry
#[derive(Clone, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// A bearer token to send instead of answering challenges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_token: Option<String>,
}

impl AuthConfig {
    pub fn has_login(&self) -> bool {
        !self.username.is_empty()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("registry_token", &self.registry_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What a legacy index says about a repository
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RepositoryData {
    /// Registry endpoints holding the repository's images
    pub endpoints: Vec<Url>,
    /// Access tokens issued by the index
    pub tokens: Vec<String>,
}

/// Opens connections to registry endpoints
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the manifest service of a repository on a V2 endpoint
    async fn v2_repository(
        &self,
        repo_info: &RepositoryInfo,
        endpoint: &Endpoint,
        meta_headers: &MetaHeaders,
        auth_config: Option<&AuthConfig>,
    ) -> Result<Box<dyn ManifestService>, ImageError>;

    /// Open an authenticated session with a V1 endpoint
    async fn v1_session(
        &self,
        endpoint: &Endpoint,
        tls: &TlsConfig,
        meta_headers: &MetaHeaders,
        auth_config: Option<&AuthConfig>,
    ) -> Result<Box<dyn Session>, ImageError>;
}

/// Manifests and tags of one repository, over the V2 protocol
#[async_trait]
pub trait ManifestService: Send {
    async fn exists(&mut self, digest: &ContentDigest) -> Result<bool, ImageError>;

    /// Fetch a manifest by digest, or `None` if the registry has no content
    async fn get(&mut self, digest: &ContentDigest) -> Result<Option<SignedManifest>, ImageError>;

    async fn exists_by_tag(&mut self, tag: &Tag) -> Result<bool, ImageError>;

    async fn get_by_tag(&mut self, tag: &Tag) -> Result<Option<SignedManifest>, ImageError>;

    /// All tags, in the order the registry lists them
    async fn tags(&mut self) -> Result<Vec<String>, ImageError>;
}

/// A session with a legacy V1 index
#[async_trait]
pub trait Session: Send {
    async fn repository_data(&mut self, remote: &Repository) -> Result<RepositoryData, ImageError>;

    /// Tag map from the first endpoint that answers
    async fn remote_tags(
        &mut self,
        endpoints: &[Url],
        remote: &Repository,
    ) -> Result<TagMap, ImageError>;

    /// Raw legacy image JSON
    async fn remote_image_json(&mut self, image_id: &str, endpoint: &Url) -> Result<Vec<u8>, ImageError>;
}
