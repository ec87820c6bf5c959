//! Legacy session and tag protocol

use super::error_from_response;
use crate::{
    errors::ImageError,
    image::Repository,
    registry::{transport, AuthConfig, Endpoint, RepositoryData, TagMap},
};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, RequestBuilder, StatusCode};
use url::Url;

const TOKEN_HEADER: &str = "X-Docker-Token";
const ENDPOINTS_HEADER: &str = "X-Docker-Endpoints";
const STANDALONE_HEADER: &str = "X-Docker-Registry-Standalone";

/// An open session with a legacy index
pub struct Session {
    client: reqwest::Client,
    /// Index address, ending in `/v1/`
    index: Url,
    login: Option<AuthConfig>,
    always_basic_auth: bool,
    tokens: Vec<String>,
}

impl Session {
    /// Open a session with the V1 API of an endpoint
    ///
    /// A private registry over https is pinged first, and a standalone one
    /// gets basic credentials on every request. Other registries hand out
    /// tokens with the repository data.
    pub async fn open(
        client: reqwest::Client,
        endpoint: &Endpoint,
        login: Option<&AuthConfig>,
    ) -> Result<Self, ImageError> {
        let index = endpoint.url.join("v1/")?;
        let mut always_basic_auth = false;
        if !endpoint.official && endpoint.is_https() {
            let ping = index.join("_ping")?;
            log::debug!("pinging {}", ping);
            let response = client.get(ping.clone()).send().await?;
            if !response.status().is_success() {
                return Err(ImageError::UnexpectedHttpStatus {
                    url: ping.to_string(),
                    status: response.status().as_u16(),
                });
            }
            let standalone = response
                .headers()
                .get(STANDALONE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);
            log::debug!("registry {} standalone: {}", index, standalone);
            always_basic_auth = standalone && login.map(AuthConfig::has_login).unwrap_or(false);
        }
        Ok(Session {
            client,
            index,
            login: login.cloned(),
            always_basic_auth,
            tokens: Vec::new(),
        })
    }

    fn get(&self, url: Url) -> RequestBuilder {
        log::debug!("GET {}", url);
        let req = self.client.get(url);
        if !self.tokens.is_empty() {
            req.header(AUTHORIZATION, format!("Token {}", self.tokens.join(",")))
        } else {
            self.with_basic_auth(req)
        }
    }

    fn with_basic_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.login {
            Some(login) if self.always_basic_auth => {
                req.basic_auth(&login.username, Some(&login.password))
            }
            _ => req,
        }
    }

    /// Registry endpoints named by the index, using the index's scheme
    fn endpoints_from_header(&self, header: &str) -> Result<Vec<Url>, ImageError> {
        header
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| Ok(Url::parse(&format!("{}://{}/v1/", self.index.scheme(), host))?))
            .collect()
    }
}

#[async_trait]
impl transport::Session for Session {
    async fn repository_data(&mut self, remote: &Repository) -> Result<RepositoryData, ImageError> {
        let url = self.index.join(&format!("repositories/{}/images", remote))?;
        log::debug!("GET {}", url);
        let mut req = self.client.get(url).header(TOKEN_HEADER, "true");
        req = match &self.login {
            Some(login) if login.has_login() => {
                req.basic_auth(&login.username, Some(&login.password))
            }
            _ => req,
        };
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let tokens: Vec<String> = response
            .headers()
            .get_all(TOKEN_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect();
        let endpoints = match response.headers().get(ENDPOINTS_HEADER) {
            Some(header) => {
                let header = header
                    .to_str()
                    .map_err(|err| ImageError::InvalidHeader(err.to_string()))?;
                self.endpoints_from_header(header)?
            }
            None => vec![self.index.clone()],
        };
        self.tokens = tokens.clone();
        Ok(RepositoryData { endpoints, tokens })
    }

    async fn remote_tags(
        &mut self,
        endpoints: &[Url],
        remote: &Repository,
    ) -> Result<TagMap, ImageError> {
        for endpoint in endpoints {
            let url = endpoint.join(&format!("repositories/{}/tags", remote))?;
            let response = self.get(url).send().await?;
            log::debug!("got status {} from {}", response.status(), response.url());
            match response.status() {
                StatusCode::OK => return Ok(response.json().await?),
                StatusCode::NOT_FOUND => return Err(ImageError::ImageNotFound(remote.to_string())),
                _ => continue,
            }
        }
        Err(ImageError::SessionUnreachable(remote.to_string()))
    }

    async fn remote_image_json(&mut self, image_id: &str, endpoint: &Url) -> Result<Vec<u8>, ImageError> {
        let url = endpoint.join(&format!("images/{}/json", image_id))?;
        let response = self.get(url.clone()).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ImageError::UnexpectedHttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
