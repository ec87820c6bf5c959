//! Content-addressed manifest protocol
//!
//! Reference: <https://docs.docker.com/registry/spec/api/>

use super::error_from_response;
use crate::{
    errors::ImageError,
    image::{self, ContentDigest, Tag},
    manifest::{media_types, SignedManifest},
    registry::{auth::Auth, ManifestService},
};
use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, LINK, WWW_AUTHENTICATE},
    Method, Response, StatusCode,
};
use serde::Deserialize;
use std::collections::HashSet;
use url::Url;

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Manifest service for one repository on one endpoint
pub struct Repository {
    client: reqwest::Client,
    base: Url,
    remote: image::Repository,
    auth: Auth,
}

impl Repository {
    pub fn new(client: reqwest::Client, mut base: Url, remote: image::Repository, auth: Auth) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Repository {
            client,
            base,
            remote,
            auth,
        }
    }

    fn url(&self, path: &str) -> Result<Url, ImageError> {
        Ok(self.base.join(&format!("v2/{}/{}", self.remote, path))?)
    }

    /// Send a request, answering at most one authentication challenge
    async fn send(&mut self, method: Method, url: &Url, manifest: bool) -> Result<Response, ImageError> {
        let mut challenged = false;
        loop {
            let mut req = self.client.request(method.clone(), url.clone());
            if manifest {
                for media_type in &[media_types::SIGNED_MANIFEST, media_types::MANIFEST, media_types::JSON] {
                    req = req.header(ACCEPT, *media_type);
                }
            }
            log::debug!("{} {}", method, url);
            let response = self.auth.include_credentials(req).send().await?;
            if response.status() == StatusCode::UNAUTHORIZED && !challenged {
                if let Some(header) = response.headers().get(WWW_AUTHENTICATE) {
                    let header = String::from_utf8_lossy(header.as_bytes()).into_owned();
                    challenged = true;
                    if self.auth.authenticate(&self.client, &header).await? {
                        continue;
                    }
                }
            }
            return Ok(response);
        }
    }

    async fn manifest_exists(&mut self, reference: &str) -> Result<bool, ImageError> {
        let url = self.url(&format!("manifests/{}", reference))?;
        let response = self.send(Method::HEAD, &url, true).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_from_response(response).await),
        }
    }

    async fn manifest(&mut self, reference: &str) -> Result<Option<SignedManifest>, ImageError> {
        let url = self.url(&format!("manifests/{}", reference))?;
        let response = self.send(Method::GET, &url, true).await?;
        match response.status() {
            status if status.is_success() => {
                let raw = response.bytes().await?;
                log::trace!("raw json manifest, {}", String::from_utf8_lossy(&raw));
                Ok(Some(SignedManifest::from_bytes(raw.to_vec())?))
            }
            StatusCode::NOT_FOUND => match error_from_response(response).await {
                ImageError::UnexpectedHttpStatus { .. } => Ok(None),
                err => Err(err),
            },
            _ => Err(error_from_response(response).await),
        }
    }
}

/// Find the next page in a `Link` header
///
/// The header looks like `</v2/name/tags/list?n=100&last=x>; rel="next"`.
fn next_link(response: &Response) -> Option<String> {
    let link = response.headers().get(LINK)?.to_str().ok()?;
    parse_next_link(link).map(str::to_owned)
}

fn parse_next_link(link: &str) -> Option<&str> {
    if !link.contains("rel=\"next\"") {
        return None;
    }
    let start = link.find('<')? + 1;
    let len = link[start..].find('>')?;
    Some(&link[start..start + len]).filter(|target| !target.is_empty())
}

#[async_trait]
impl ManifestService for Repository {
    async fn exists(&mut self, digest: &ContentDigest) -> Result<bool, ImageError> {
        self.manifest_exists(digest.as_str()).await
    }

    async fn get(&mut self, digest: &ContentDigest) -> Result<Option<SignedManifest>, ImageError> {
        self.manifest(digest.as_str()).await
    }

    async fn exists_by_tag(&mut self, tag: &Tag) -> Result<bool, ImageError> {
        self.manifest_exists(tag.as_str()).await
    }

    async fn get_by_tag(&mut self, tag: &Tag) -> Result<Option<SignedManifest>, ImageError> {
        self.manifest(tag.as_str()).await
    }

    async fn tags(&mut self) -> Result<Vec<String>, ImageError> {
        let mut tags = Vec::new();
        let mut url = self.url("tags/list")?;
        let mut visited = HashSet::new();
        loop {
            visited.insert(url.clone());
            let response = self.send(Method::GET, &url, false).await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            let next = next_link(&response);
            let list: TagList = response.json().await?;
            tags.extend(list.tags.unwrap_or_default());
            match next {
                Some(next) => {
                    let next = url.join(&next)?;
                    if visited.contains(&next) {
                        log::warn!("tag list of {} links back to {}, stopping", self.remote, next);
                        break;
                    }
                    url = next;
                }
                None => break,
            }
        }
        Ok(tags)
    }
}
