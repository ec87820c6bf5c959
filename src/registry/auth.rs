use crate::{errors::ImageError, registry::AuthConfig};
use regex::Regex;
use reqwest::{RequestBuilder, Url};
use serde::Deserialize;

/// Credentials for one repository connection
///
/// Starts out with only what the caller supplied, and picks up a bearer
/// token once the server has challenged us for one.
#[derive(Clone, Default)]
pub struct Auth {
    login: Option<AuthConfig>,
    token: Option<String>,
    basic: bool,
}

/// How a server asked us to authenticate
#[derive(Debug, Clone)]
pub enum Challenge {
    Bearer(BearerChallenge),
    Basic,
}

impl Auth {
    pub fn new(login: Option<&AuthConfig>) -> Self {
        Auth {
            token: login.and_then(|l| l.registry_token.clone()),
            login: login.cloned(),
            basic: false,
        }
    }

    pub fn include_credentials(&self, req: RequestBuilder) -> RequestBuilder {
        match (&self.token, &self.login) {
            (Some(token), _) => req.bearer_auth(token),
            (None, Some(login)) if self.basic => {
                req.basic_auth(&login.username, Some(&login.password))
            }
            _ => req,
        }
    }

    /// Answer a `WWW-Authenticate` challenge
    ///
    /// Returns whether the request is worth repeating with the new
    /// credentials.
    ///
    /// Reference: <https://docs.docker.com/registry/spec/auth/token/>
    pub async fn authenticate(
        &mut self,
        client: &reqwest::Client,
        auth_header: &str,
    ) -> Result<bool, ImageError> {
        match Challenge::parse(auth_header)? {
            Challenge::Basic => match &self.login {
                Some(login) if login.has_login() && !self.basic => {
                    self.basic = true;
                    Ok(true)
                }
                _ => Ok(false),
            },
            Challenge::Bearer(challenge) => {
                log::debug!("login challenge, {:?}", challenge);
                let mut query = vec![("service", challenge.service)];
                if let Some(scope) = challenge.scope {
                    query.push(("scope", scope));
                }
                let req = client.get(challenge.realm).query(&query);
                let req = match &self.login {
                    Some(login) if login.has_login() => {
                        req.basic_auth(&login.username, Some(&login.password))
                    }
                    _ => req,
                };
                let response: Token = req.send().await?.error_for_status()?.json().await?;
                log::debug!("received token");
                self.token = Some(response.token);
                Ok(true)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BearerChallenge {
    realm: Url,
    service: String,
    scope: Option<String>,
}

#[derive(Clone, Deserialize)]
struct Token {
    #[serde(alias = "access_token")]
    token: String,
}

impl Challenge {
    pub fn parse(auth_header: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref BASIC: Regex = Regex::new("^\\s*(?i:basic)(?:\\s|$)").unwrap();
            static ref RE: Regex = Regex::new(concat!(
                "^\\s*",
                "(?i:bearer)",   // Case-insensitive challenge type
                "(?:",           // multiple unordered parameters
                /* */ "\\s*",
                /* */ "(?:",     // alternative group for the parameters
                /* -- */ "(?:",  // parameter: service
                /* -- -- */ "service=",
                /* -- -- */ "\"(?P<service>",
                /* -- -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*", // allowed chars from RFC 6750
                /* -- -- */ ")\"",
                /* -- */ ")|",
                /* -- */ "(?:",  // parameter: scope
                /* -- -- */ "scope=",
                /* -- -- */ "\"(?P<scope>",
                /* -- -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*", // allowed chars from RFC 6750
                /* -- -- */ ")\"",
                /* -- */ ")|",
                /* -- */ "(?:",  // parameter: realm
                /* -- -- */ "realm=",
                /* -- -- */ "\"(?P<realm>", // capture quoted string
                /* -- -- -- */ "https?://",
                /* -- -- -- */ "[-_.+a-zA-Z:0-9/]+",
                /* -- -- */ ")\"",
                /* -- */ ")",
                /* */ ")",
                /* */ ",?",      // to keep the parser regular, commas are all optional *shrug*
                ")*$",
            )).unwrap();
        }
        if BASIC.is_match(auth_header) {
            return Ok(Challenge::Basic);
        }
        match RE.captures(auth_header).map(|captures| {
            (
                captures.name("service").map(|m| m.as_str().to_owned()),
                captures.name("scope").map(|m| m.as_str().to_owned()),
                captures.name("realm").map(|m| m.as_str().parse::<Url>()),
            )
        }) {
            Some((Some(service), scope, Some(Ok(realm)))) => Ok(Challenge::Bearer(BearerChallenge {
                realm,
                service,
                scope,
            })),
            _ => Err(ImageError::UnsupportedAuthentication(
                auth_header.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_challenge() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/busybox:pull""#;
        match Challenge::parse(header).unwrap() {
            Challenge::Bearer(c) => {
                assert_eq!(c.realm.as_str(), "https://auth.docker.io/token");
                assert_eq!(c.service, "registry.docker.io");
                assert_eq!(c.scope.as_deref(), Some("repository:library/busybox:pull"));
            }
            other => panic!("unexpected {:?}", other),
        }
        let header = r#"bearer service="svc", realm="http://127.0.0.1:4000/token""#;
        assert!(matches!(Challenge::parse(header), Ok(Challenge::Bearer(_))));
    }

    #[test]
    fn other_challenges() {
        assert!(matches!(
            Challenge::parse(r#"Basic realm="Registry""#),
            Ok(Challenge::Basic)
        ));
        assert!(Challenge::parse("Digest nonce=1").is_err());
        assert!(Challenge::parse(r#"Bearer realm="ftp://x/token",service="s""#).is_err());
        assert!(Challenge::parse(r#"Bearer realm="https://x/token""#).is_err());
    }
}
