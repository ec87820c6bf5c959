//! Error types you might see while resolving an image on a remote registry

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Broad classes of [ImageError], used to decide whether another endpoint
/// is worth trying
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The digest, tag, or repository is absent
    NotFound,
    /// The operation is not implemented by this protocol generation
    Unsupported,
    /// Network, HTTP, authentication, or session failure
    Transport,
    /// The registry returned content that failed verification
    Validation,
    /// Local configuration or input is unusable
    Configuration,
}

/// Errors during remote image resolution
#[derive(Error, Debug)]
pub enum ImageError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReferenceFormat(String),

    /// the candidate registry list is empty
    #[error("no configured registry to pull from")]
    NoConfiguredRegistry,

    /// repository name is reserved or empty
    #[error("invalid repository name: {0}")]
    InvalidRepositoryName(String),

    /// every endpoint was skipped without recording an error
    #[error("no endpoints found for {0}")]
    NoEndpoints(String),

    /// invalid url
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// invalid http header in the request configuration
    #[error("invalid http header: {0}")]
    InvalidHeader(String),

    /// digest is not known to the remote repository
    #[error("digest {digest} does not exist in remote repository {repository}")]
    DigestNotFound { digest: String, repository: String },

    /// tag is not known to the remote repository
    #[error("tag {tag} does not exist in remote repository {repository}")]
    TagNotFound { tag: String, repository: String },

    /// remote repository exists but has no tags
    #[error("no tags available for remote repository {0}")]
    NoTags(String),

    /// legacy registry has no repository by this name
    #[error("image {0} not found")]
    ImageNotFound(String),

    /// registry answered the lookup without a manifest
    #[error("image manifest does not exist for tag or digest {0:?}")]
    ManifestMissing(String),

    /// operation not implemented by this protocol generation
    #[error("not supported by this registry: {0}")]
    NoSupport(String),

    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// registry responded with an unexpected http status
    #[error("unexpected http response from {url}: status {status}")]
    UnexpectedHttpStatus { url: String, status: u16 },

    /// registry server requested an unsupported type of authentication
    #[error("registry server requested an unsupported type of authentication: {0:?}")]
    UnsupportedAuthentication(String),

    /// legacy session could not reach any endpoint
    #[error("could not reach any registry endpoint: {0}")]
    SessionUnreachable(String),

    /// a single error reported by the registry API
    #[error("{0}")]
    Registry(RegistryApiError),

    /// several errors reported by the registry API in one response
    #[error("{}", RegistryErrorList(.0))]
    RegistryErrors(Vec<RegistryApiError>),

    /// image JSON could not be retrieved from any mirror or endpoint
    #[error("error pulling image ({tag}) from {repository}, {source}")]
    ImageJsonPull {
        tag: String,
        repository: String,
        #[source]
        source: Box<ImageError>,
    },

    /// json error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// manifest signature envelope could not be decoded
    #[error("invalid manifest signature: {0}")]
    InvalidSignature(String),

    /// digest algorithm is not one we can compute
    #[error("unsupported digest algorithm {0:?}")]
    UnsupportedDigestAlgorithm(String),

    /// manifest payload does not hash to the requested digest
    #[error("image verification failed for digest {0}")]
    ManifestVerification(String),

    /// manifest schema is not the signed legacy schema
    #[error("unsupported schema version {version} for {reference:?}")]
    UnsupportedSchemaVersion { version: u32, reference: String },

    /// manifest layer and history lists disagree
    #[error("length of history not equal to number of layers for {0:?}")]
    LayerHistoryMismatch(String),

    /// manifest lists no layers at all
    #[error("no layers in manifest for {0:?}")]
    NoLayers(String),

    /// legacy image id is not 64 lowercase hex digits
    #[error("image ID {0:?} is invalid")]
    InvalidImageId(String),

    /// bottom-most layer claims a parent
    #[error("invalid parent ID in the base layer of the image")]
    InvalidBaseLayerParent,

    /// a layer id appears twice, not adjacently
    #[error("ID {0} appears multiple times in manifest")]
    DuplicateLayerId(String),

    /// layer parent does not match the layer below it
    #[error("invalid parent ID, expected {expected:?}, got {found:?}")]
    InvalidParentId { expected: String, found: String },
}

impl ImageError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        use ImageError::*;
        match self {
            InvalidReferenceFormat(_)
            | NoConfiguredRegistry
            | InvalidRepositoryName(_)
            | InvalidUrl(_)
            | InvalidHeader(_) => ErrorKind::Configuration,

            DigestNotFound { .. }
            | TagNotFound { .. }
            | NoTags(_)
            | ImageNotFound(_)
            | ManifestMissing(_) => ErrorKind::NotFound,

            NoSupport(_) => ErrorKind::Unsupported,

            NoEndpoints(_)
            | NetworkRequest(_)
            | UnexpectedHttpStatus { .. }
            | UnsupportedAuthentication(_)
            | SessionUnreachable(_)
            | Registry(_)
            | RegistryErrors(_)
            | ImageJsonPull { .. } => ErrorKind::Transport,

            JSON(_)
            | InvalidSignature(_)
            | UnsupportedDigestAlgorithm(_)
            | ManifestVerification(_)
            | UnsupportedSchemaVersion { .. }
            | LayerHistoryMismatch(_)
            | NoLayers(_)
            | InvalidImageId(_)
            | InvalidBaseLayerParent
            | DuplicateLayerId(_)
            | InvalidParentId { .. } => ErrorKind::Validation,
        }
    }

    /// Is this an "operation not supported" error?
    pub fn is_no_support(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }

    /// Should the next endpoint be tried after this error?
    ///
    /// Registry API errors fall back only for codes that suggest a different
    /// endpoint may know better. A list of registry errors is judged by its
    /// first entry.
    pub fn continue_on_error(&self) -> bool {
        match self {
            ImageError::Registry(err) => err.allows_fallback(),
            ImageError::RegistryErrors(list) => match list.first() {
                None => true,
                Some(err) => err.allows_fallback(),
            },
            ImageError::ImageJsonPull { source, .. } => source.continue_on_error(),
            other => matches!(other.kind(), ErrorKind::Unsupported | ErrorKind::Transport),
        }
    }

    /// Replace a registry error list of exactly one element with that element
    pub fn unwrap_single(self) -> Self {
        match self {
            ImageError::RegistryErrors(mut list) if list.len() == 1 => {
                ImageError::Registry(list.remove(0))
            }
            other => other,
        }
    }
}

/// One entry of a registry API error body
///
/// Reference: <https://docs.docker.com/registry/spec/api/#errors>
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct RegistryApiError {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// Registry API error codes after which another endpoint may succeed
pub mod error_codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const MANIFEST_UNKNOWN: &str = "MANIFEST_UNKNOWN";
    pub const NAME_UNKNOWN: &str = "NAME_UNKNOWN";
}

impl RegistryApiError {
    fn allows_fallback(&self) -> bool {
        matches!(
            self.code.as_str(),
            error_codes::UNAUTHORIZED | error_codes::MANIFEST_UNKNOWN | error_codes::NAME_UNKNOWN
        )
    }
}

impl fmt::Display for RegistryApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code.to_lowercase().replace('_', " ");
        if self.message.is_empty() {
            write!(f, "{}", code)
        } else {
            write!(f, "{}: {}", code, self.message)
        }
    }
}

/// Body of a registry error response
#[derive(Debug, Deserialize)]
pub(crate) struct RegistryErrorBody {
    #[serde(default)]
    pub errors: Vec<RegistryApiError>,
}

struct RegistryErrorList<'a>(&'a [RegistryApiError]);

impl<'a> fmt::Display for RegistryErrorList<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => write!(f, "<nil>"),
            1 => write!(f, "{}", self.0[0]),
            _ => {
                write!(f, "errors:")?;
                for err in self.0 {
                    write!(f, "\n{}", err)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: &str) -> RegistryApiError {
        RegistryApiError {
            code: code.to_string(),
            message: "msg".to_string(),
            detail: serde_json::Value::Null,
        }
    }

    #[test]
    fn fallback_by_kind() {
        assert!(ImageError::NoSupport("x".into()).continue_on_error());
        assert!(ImageError::SessionUnreachable("x".into()).continue_on_error());
        assert!(!ImageError::NoTags("x".into()).continue_on_error());
        assert!(!ImageError::InvalidBaseLayerParent.continue_on_error());
        assert!(!ImageError::NoConfiguredRegistry.continue_on_error());
    }

    #[test]
    fn fallback_by_registry_code() {
        assert!(ImageError::Registry(api_error("UNAUTHORIZED")).continue_on_error());
        assert!(ImageError::Registry(api_error("NAME_UNKNOWN")).continue_on_error());
        assert!(!ImageError::Registry(api_error("DENIED")).continue_on_error());
        assert!(ImageError::RegistryErrors(vec![]).continue_on_error());
        assert!(!ImageError::RegistryErrors(vec![api_error("DENIED"), api_error("UNAUTHORIZED")])
            .continue_on_error());
    }

    #[test]
    fn unwrap_single_registry_error() {
        let err = ImageError::RegistryErrors(vec![api_error("NAME_UNKNOWN")]).unwrap_single();
        assert!(matches!(err, ImageError::Registry(_)));
        assert_eq!(err.to_string(), "name unknown: msg");

        let err = ImageError::RegistryErrors(vec![api_error("A"), api_error("B")]).unwrap_single();
        assert!(matches!(err, ImageError::RegistryErrors(ref v) if v.len() == 2));
    }
}
