use super::{EndpointError, ImageInspect, InspectConfig, ListRemoteTagsConfig, RepositoryTag};
use crate::{
    errors::ImageError,
    image::{ImageName, ImageVersion, Tag, DEFAULT_TAG},
    manifest::decode_manifest,
    registry::{Endpoint, ManifestService, RepositoryInfo},
};

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

/// Pick `latest` if the repository has it, otherwise the first tag listed
pub(super) fn choose_tag<'t, I>(tags: I) -> Option<&'t str>
where
    I: IntoIterator<Item = &'t String>,
{
    let mut first = None;
    for tag in tags {
        if tag == DEFAULT_TAG {
            return Some(tag.as_str());
        }
        first = first.or(Some(tag.as_str()));
    }
    first
}

impl<'a> ManifestFetcher<'a> {
    pub async fn fetch(&self, name: &ImageName) -> Result<ImageInspect, EndpointError> {
        let mut manifests = self
            .config
            .transport
            .v2_repository(
                self.repo_info,
                &self.endpoint,
                &self.config.meta_headers,
                self.config.auth_config.as_ref(),
            )
            .await
            .map_err(|err| {
                log::debug!("error getting v2 registry: {}", err);
                EndpointError::fallback(err)
            })?;

        self.fetch_with_repository(manifests.as_mut(), name)
            .await
            .map_err(|err| {
                let err = EndpointError::classify(err);
                if err.fallback {
                    log::debug!("error trying v2 registry: {}", err.error);
                }
                err
            })
    }

    async fn fetch_with_repository(
        &self,
        manifests: &mut dyn ManifestService,
        name: &ImageName,
    ) -> Result<ImageInspect, ImageError> {
        let repository = self.repo_info.canonical_name.to_string();
        let (signed, tag) = match name.version() {
            Some(ImageVersion::ContentDigest(digest)) => {
                if !manifests.exists(&digest).await? {
                    return Err(ImageError::DigestNotFound {
                        digest: digest.to_string(),
                        repository,
                    });
                }
                let signed = manifests.get(&digest).await?;
                (signed.ok_or_else(|| ImageError::ManifestMissing(digest.to_string()))?, None)
            }
            Some(ImageVersion::Tag(tag)) => {
                if !manifests.exists_by_tag(&tag).await? {
                    return Err(ImageError::TagNotFound {
                        tag: tag.to_string(),
                        repository,
                    });
                }
                let signed = manifests.get_by_tag(&tag).await?;
                (signed.ok_or_else(|| ImageError::ManifestMissing(tag.to_string()))?, Some(tag))
            }
            None => {
                let tags = manifests.tags().await?;
                let tag = match choose_tag(&tags) {
                    Some(tag) => Tag::parse(tag)?,
                    None => return Err(ImageError::NoTags(repository)),
                };
                let signed = manifests.get_by_tag(&tag).await?;
                (signed.ok_or_else(|| ImageError::ManifestMissing(tag.to_string()))?, Some(tag))
            }
        };

        let decoded = decode_manifest(&signed, name, self.repo_info.local_name.as_str())?;
        Ok(ImageInspect::new(
            self.repo_info,
            &decoded.config,
            &decoded.id,
            tag.as_ref(),
            Some(&decoded.digest),
        ))
    }
}

impl<'a> TagLister<'a> {
    pub async fn list(&self) -> Result<Vec<RepositoryTag>, EndpointError> {
        let mut manifests = self
            .config
            .transport
            .v2_repository(
                self.repo_info,
                &self.endpoint,
                &self.config.meta_headers,
                self.config.auth_config.as_ref(),
            )
            .await
            .map_err(|err| {
                log::debug!("error getting v2 registry: {}", err);
                EndpointError::fallback(err)
            })?;

        log::debug!("retrieving the tag list from v2 endpoint {}", self.endpoint.url);
        match manifests.tags().await {
            Ok(tags) => Ok(tags
                .into_iter()
                .map(|tag| RepositoryTag { tag, image_id: None })
                .collect()),
            Err(err) => {
                let err = EndpointError::classify(err.unwrap_single());
                if err.fallback {
                    log::debug!("error trying v2 registry: {}", err.error);
                }
                Err(err)
            }
        }
    }
}
