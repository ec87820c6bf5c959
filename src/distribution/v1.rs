use super::{
    v2::choose_tag, EndpointError, ImageInspect, InspectConfig, ListRemoteTagsConfig,
    RepositoryTag,
};
use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageName, Tag},
    manifest::{image_from_v1_json, ImageConfig},
    registry::{AuthConfig, Endpoint, MetaHeaders, RegistryService, RepositoryInfo, Session, Transport},
};
use url::Url;

pub struct ManifestFetcher<'a> {
    pub endpoint: Endpoint,
    pub repo_info: &'a RepositoryInfo,
    pub config: &'a InspectConfig,
}

pub struct TagLister<'a> {
    pub endpoint: Endpoint,
    pub repo_info: &'a RepositoryInfo,
    pub config: &'a ListRemoteTagsConfig,
}

/// Open a session using the index's TLS settings
///
/// Failing to find TLS settings rules out every endpoint of the index.
/// Failing to open the session only rules out this one.
async fn open_session(
    endpoint: &Endpoint,
    repo_info: &RepositoryInfo,
    service: &dyn RegistryService,
    transport: &dyn Transport,
    meta_headers: &MetaHeaders,
    auth_config: Option<&AuthConfig>,
) -> Result<Box<dyn Session>, EndpointError> {
    let tls = service
        .tls_config(&repo_info.index.name)
        .map_err(EndpointError::fatal)?;
    transport
        .v1_session(endpoint, &tls, meta_headers, auth_config)
        .await
        .map_err(|err| {
            log::debug!("fallback from error: {}", err);
            EndpointError::fallback(err)
        })
}

/// A legacy index answers an unknown repository with a plain 404
fn not_found_as_image(err: ImageError, repo_info: &RepositoryInfo) -> ImageError {
    match err {
        ImageError::UnexpectedHttpStatus { status: 404, .. } => {
            ImageError::ImageNotFound(repo_info.remote_name.to_string())
        }
        other => other,
    }
}

impl<'a> ManifestFetcher<'a> {
    pub async fn fetch(&self, name: &ImageName) -> Result<ImageInspect, EndpointError> {
        if name.content_digest().is_some() {
            // https v1 endpoints come before http v2 ones, so keep going
            return Err(EndpointError::fallback(ImageError::NoSupport(
                "cannot pull by digest with v1 registry".into(),
            )));
        }
        let mut session = open_session(
            &self.endpoint,
            self.repo_info,
            self.config.registry_service.as_ref(),
            self.config.transport.as_ref(),
            &self.config.meta_headers,
            self.config.auth_config.as_ref(),
        )
        .await?;
        self.fetch_with_session(session.as_mut(), name.tag())
            .await
            .map_err(EndpointError::fatal)
    }

    async fn fetch_with_session(
        &self,
        session: &mut dyn Session,
        asked_tag: Option<Tag>,
    ) -> Result<ImageInspect, ImageError> {
        let remote = &self.repo_info.remote_name;
        let canonical = &self.repo_info.canonical_name;
        let repo_data = session
            .repository_data(remote)
            .await
            .map_err(|err| not_found_as_image(err, self.repo_info))?;

        log::debug!("retrieving the tag list from v1 endpoints");
        let tags = session
            .remote_tags(&repo_data.endpoints, remote)
            .await
            .map_err(|err| {
                log::error!("unable to get remote tags: {}", err);
                err
            })?;
        if tags.is_empty() {
            return Err(ImageError::NoTags(canonical.to_string()));
        }

        let tag = match asked_tag {
            Some(tag) => tag,
            None => match choose_tag(tags.keys()) {
                Some(tag) => Tag::parse(tag)?,
                None => return Err(ImageError::NoTags(canonical.to_string())),
            },
        };
        let image_id = tags
            .get(tag.as_str())
            .ok_or_else(|| ImageError::TagNotFound {
                tag: tag.to_string(),
                repository: canonical.to_string(),
            })?;

        let mut pulled = None;
        let mut last_error = None;
        for mirror in &self.repo_info.index.mirrors {
            match pull_image_json(session, image_id, mirror).await {
                Ok(image) => {
                    pulled = Some(image);
                    break;
                }
                Err(err) => {
                    log::debug!(
                        "error pulling image json of {}:{}, mirror: {}, {}",
                        canonical,
                        tag,
                        mirror,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }
        if pulled.is_none() {
            for endpoint in &repo_data.endpoints {
                match pull_image_json(session, image_id, endpoint).await {
                    Ok(image) => {
                        pulled = Some(image);
                        last_error = None;
                        break;
                    }
                    Err(err) => {
                        log::info!(
                            "error pulling image json of {}:{}, endpoint: {}, {}",
                            canonical,
                            tag,
                            endpoint,
                            err
                        );
                        last_error = Some(err);
                    }
                }
            }
        }

        match (pulled, last_error) {
            (Some((config, id)), _) => Ok(ImageInspect::new(
                self.repo_info,
                &config,
                &id,
                Some(&tag),
                None,
            )),
            (None, Some(err)) => Err(ImageError::ImageJsonPull {
                tag: tag.to_string(),
                repository: canonical.to_string(),
                source: Box::new(err),
            }),
            (None, None) => Err(ImageError::ImageNotFound(format!("{}:{}", canonical, tag))),
        }
    }
}

/// Fetch legacy image JSON and turn it into a single-layer configuration
async fn pull_image_json(
    session: &mut dyn Session,
    image_id: &str,
    endpoint: &Url,
) -> Result<(ImageConfig, ContentDigest), ImageError> {
    let json = session.remote_image_json(image_id, endpoint).await?;
    image_from_v1_json(&json)
}

impl<'a> TagLister<'a> {
    /// Errors after the session opens never allow another endpoint
    pub async fn list(&self) -> Result<Vec<RepositoryTag>, EndpointError> {
        let mut session = open_session(
            &self.endpoint,
            self.repo_info,
            self.config.registry_service.as_ref(),
            self.config.transport.as_ref(),
            &self.config.meta_headers,
            self.config.auth_config.as_ref(),
        )
        .await?;
        self.list_with_session(session.as_mut())
            .await
            .map_err(EndpointError::fatal)
    }

    async fn list_with_session(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<RepositoryTag>, ImageError> {
        let remote = &self.repo_info.remote_name;
        let repo_data = session
            .repository_data(remote)
            .await
            .map_err(|err| not_found_as_image(err, self.repo_info))?;

        log::debug!("retrieving the tag list from v1 endpoints");
        let tags = session
            .remote_tags(&repo_data.endpoints, remote)
            .await
            .map_err(|err| {
                log::error!("unable to get remote tags: {}", err);
                err
            })?;
        if tags.is_empty() {
            return Err(ImageError::NoTags(self.repo_info.canonical_name.to_string()));
        }
        Ok(tags
            .into_iter()
            .map(|(tag, image_id)| RepositoryTag {
                tag,
                image_id: Some(image_id),
            })
            .collect())
    }
}
