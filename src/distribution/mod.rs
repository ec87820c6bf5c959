//! Resolve images and tags on remote registries without pulling them
//!
//! A reference without a registry is tried against each candidate registry
//! in turn. Within one registry, each endpoint the registry service offers
//! is tried until one answers or fails in a way that rules out the others.

mod types;
mod v1;
mod v2;

pub use types::{ImageInspect, RepositoryTag, RepositoryTagList};

use crate::{
    errors::{ErrorKind, ImageError},
    image::{ImageName, Registry},
    registry::{
        validate_repo_name, ApiVersion, AuthConfig, Endpoint, MetaHeaders, RegistryService,
        RepositoryInfo, Transport,
    },
};
use std::{future::Future, sync::Arc};

/// Registries tried for references that don't name one
pub const DEFAULT_REGISTRIES: &[&str] = &["docker.io"];

/// Settings for [inspect]
#[derive(Clone)]
pub struct InspectConfig {
    /// Headers with metadata about the caller, each beginning with `X-Meta-`
    pub meta_headers: MetaHeaders,
    /// Credentials for the registry
    pub auth_config: Option<AuthConfig>,
    /// Resolves repositories, endpoints and TLS settings
    pub registry_service: Arc<dyn RegistryService>,
    /// Opens connections to endpoints
    pub transport: Arc<dyn Transport>,
    /// Candidate registries, in order, for references without one
    pub registries: Vec<String>,
}

/// Settings for [list_remote_tags]
#[derive(Clone)]
pub struct ListRemoteTagsConfig {
    /// Headers with metadata about the caller, each beginning with `X-Meta-`
    pub meta_headers: MetaHeaders,
    /// Credentials for the registry
    pub auth_config: Option<AuthConfig>,
    /// Resolves repositories, endpoints and TLS settings
    pub registry_service: Arc<dyn RegistryService>,
    /// Opens connections to endpoints
    pub transport: Arc<dyn Transport>,
    /// Candidate registries, in order, for references without one
    pub registries: Vec<String>,
}

impl InspectConfig {
    pub fn new(registry_service: Arc<dyn RegistryService>, transport: Arc<dyn Transport>) -> Self {
        InspectConfig {
            meta_headers: MetaHeaders::new(),
            auth_config: None,
            registry_service,
            transport,
            registries: default_registries(),
        }
    }
}

impl ListRemoteTagsConfig {
    pub fn new(registry_service: Arc<dyn RegistryService>, transport: Arc<dyn Transport>) -> Self {
        ListRemoteTagsConfig {
            meta_headers: MetaHeaders::new(),
            auth_config: None,
            registry_service,
            transport,
            registries: default_registries(),
        }
    }
}

fn default_registries() -> Vec<String> {
    DEFAULT_REGISTRIES.iter().map(|r| r.to_string()).collect()
}

/// Failure at one endpoint, and whether the next endpoint is worth trying
#[derive(Debug)]
pub struct EndpointError {
    pub error: ImageError,
    pub fallback: bool,
}

impl EndpointError {
    pub fn fallback(error: ImageError) -> Self {
        EndpointError {
            error,
            fallback: true,
        }
    }

    pub fn fatal(error: ImageError) -> Self {
        EndpointError {
            error,
            fallback: false,
        }
    }

    /// Fall back exactly when the error itself allows it
    pub fn classify(error: ImageError) -> Self {
        EndpointError {
            fallback: error.continue_on_error(),
            error,
        }
    }
}

/// The error to report if no endpoint succeeds
///
/// An "operation not supported" error is only kept until any other kind of
/// error shows up. After that, later unsupported errors are ignored.
#[derive(Debug, Default)]
pub struct LastError {
    pub error: Option<ImageError>,
    pub discard_unsupported: bool,
}

impl LastError {
    pub fn record(self, error: ImageError) -> Self {
        if !error.is_no_support() {
            LastError {
                error: Some(error),
                discard_unsupported: true,
            }
        } else if !self.discard_unsupported {
            LastError {
                error: Some(error),
                discard_unsupported: false,
            }
        } else {
            self
        }
    }

    pub fn into_error(self, index: &Registry) -> ImageError {
        self.error
            .unwrap_or_else(|| ImageError::NoEndpoints(index.to_string()))
    }
}

/// Protocol-specific manifest fetcher for one endpoint
enum ManifestFetcher<'a> {
    V1(v1::ManifestFetcher<'a>),
    V2(v2::ManifestFetcher<'a>),
}

impl<'a> ManifestFetcher<'a> {
    fn new(endpoint: Endpoint, repo_info: &'a RepositoryInfo, config: &'a InspectConfig) -> Self {
        match endpoint.version {
            ApiVersion::V1 => ManifestFetcher::V1(v1::ManifestFetcher {
                endpoint,
                repo_info,
                config,
            }),
            ApiVersion::V2 => ManifestFetcher::V2(v2::ManifestFetcher {
                endpoint,
                repo_info,
                config,
            }),
        }
    }

    async fn fetch(&self, name: &ImageName) -> Result<ImageInspect, EndpointError> {
        match self {
            ManifestFetcher::V1(fetcher) => fetcher.fetch(name).await,
            ManifestFetcher::V2(fetcher) => fetcher.fetch(name).await,
        }
    }
}

/// Protocol-specific tag lister for one endpoint
enum TagLister<'a> {
    V1(v1::TagLister<'a>),
    V2(v2::TagLister<'a>),
}

impl<'a> TagLister<'a> {
    fn new(
        endpoint: Endpoint,
        repo_info: &'a RepositoryInfo,
        config: &'a ListRemoteTagsConfig,
    ) -> Self {
        match endpoint.version {
            ApiVersion::V1 => TagLister::V1(v1::TagLister {
                endpoint,
                repo_info,
                config,
            }),
            ApiVersion::V2 => TagLister::V2(v2::TagLister {
                endpoint,
                repo_info,
                config,
            }),
        }
    }

    async fn list(&self) -> Result<Vec<RepositoryTag>, EndpointError> {
        match self {
            TagLister::V1(lister) => lister.list().await,
            TagLister::V2(lister) => lister.list().await,
        }
    }
}

/// Order endpoints for tag listing
///
/// V1 endpoints come first since they also report image IDs, and https
/// comes before plain http. Inspection keeps the service's own order.
pub fn sort_for_listing(endpoints: &mut [Endpoint]) {
    endpoints.sort_by(|a, b| {
        a.version
            .cmp(&b.version)
            .then_with(|| b.is_https().cmp(&a.is_https()))
    });
}

/// Try a reference without a registry against each candidate registry
async fn across_registries<T, F, Fut>(
    name: &ImageName,
    registries: &[String],
    mut attempt: F,
) -> Result<T, ImageError>
where
    F: FnMut(ImageName) -> Fut,
    Fut: Future<Output = Result<T, ImageError>>,
{
    let mut last_error = ImageError::NoConfiguredRegistry;
    for registry in registries {
        let qualified = match name.with_registry(registry) {
            Ok(qualified) => qualified,
            Err(err) => {
                log::warn!(
                    "failed to fully qualify {:?} name with {:?} registry: {}",
                    name.repository_str(),
                    registry,
                    err
                );
                last_error = err;
                continue;
            }
        };
        match attempt(qualified).await {
            Ok(result) => return Ok(result),
            Err(err) => match err.kind() {
                ErrorKind::Validation | ErrorKind::Configuration => return Err(err),
                _ => last_error = err,
            },
        }
    }
    Err(last_error)
}

/// Fetch the metadata of an image from a remote registry
///
/// A reference naming a registry is resolved there only. Otherwise each of
/// the configured candidate registries is tried in order.
pub async fn inspect(name: &ImageName, config: &InspectConfig) -> Result<ImageInspect, ImageError> {
    if name.is_fully_qualified() {
        return fetch_manifest(name.clone(), config).await;
    }
    if config.registries.is_empty() {
        return Err(ImageError::NoConfiguredRegistry);
    }
    across_registries(name, &config.registries, |qualified| {
        fetch_manifest(qualified, config)
    })
    .await
}

async fn fetch_manifest(name: ImageName, config: &InspectConfig) -> Result<ImageInspect, ImageError> {
    let repo_info = config.registry_service.resolve_repository(&name)?;
    validate_repo_name(repo_info.local_name.as_str())?;
    let endpoints = config
        .registry_service
        .lookup_pull_endpoints(&repo_info.canonical_name)?;

    let mut last_error = LastError::default();
    for endpoint in endpoints {
        log::debug!(
            "trying to fetch image manifest of {} repository from {} {}",
            repo_info.canonical_name,
            endpoint.url,
            endpoint.version
        );
        let fetcher = ManifestFetcher::new(endpoint, &repo_info, config);
        match fetcher.fetch(&name).await {
            Ok(inspect) => return Ok(inspect),
            Err(EndpointError {
                error,
                fallback: true,
            }) => last_error = last_error.record(error),
            Err(EndpointError { error, .. }) => {
                log::debug!("not continuing with error: {}", error);
                return Err(error);
            }
        }
    }
    Err(last_error.into_error(&repo_info.index.name))
}

/// List the tags of a remote repository, sorted by name
///
/// Registries are chosen the same way as for [inspect].
pub async fn list_remote_tags(
    name: &ImageName,
    config: &ListRemoteTagsConfig,
) -> Result<RepositoryTagList, ImageError> {
    if name.is_fully_qualified() {
        return remote_tag_list(name.clone(), config).await;
    }
    if config.registries.is_empty() {
        return Err(ImageError::NoConfiguredRegistry);
    }
    validate_repo_name(name.repository_str())?;
    across_registries(name, &config.registries, |qualified| {
        remote_tag_list(qualified, config)
    })
    .await
}

async fn remote_tag_list(
    name: ImageName,
    config: &ListRemoteTagsConfig,
) -> Result<RepositoryTagList, ImageError> {
    let repo_info = config.registry_service.resolve_repository(&name)?;
    validate_repo_name(repo_info.local_name.as_str())?;
    let mut endpoints = config
        .registry_service
        .lookup_pull_endpoints(&repo_info.canonical_name)?;
    sort_for_listing(&mut endpoints);

    let mut last_error = LastError::default();
    for endpoint in endpoints {
        log::debug!(
            "trying to fetch tag list of {} repository from {} {}",
            repo_info.canonical_name,
            endpoint.url,
            endpoint.version
        );
        let version = endpoint.version;
        let lister = TagLister::new(endpoint, &repo_info, config);
        match lister.list().await {
            Ok(mut tag_list) => {
                tag_list.sort_by(|a, b| a.tag.cmp(&b.tag));
                return Ok(RepositoryTagList {
                    name: repo_info.canonical_name.to_string(),
                    tag_list,
                });
            }
            // V1 endpoints come first and must not keep V2 from being asked
            Err(EndpointError { error, fallback }) if fallback || version == ApiVersion::V1 => {
                last_error = last_error.record(error)
            }
            Err(EndpointError { error, .. }) => {
                log::debug!("not continuing with error: {}", error);
                return Err(error);
            }
        }
    }
    Err(last_error.into_error(&repo_info.index.name))
}
