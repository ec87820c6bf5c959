use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageVersion, Registry, Repository, Tag},
};
use regex::Regex;
use std::ops::Range;

/// Parsed Docker-style image reference
///
/// A complete image name contains a [Registry], [Repository], [Tag], and
/// [ContentDigest] in that order. Only the [Repository] component is
/// mandatory.
///
/// The [Tag] always begins with a `:` and the [ContentDigest] with an `@`.
/// Whether the first path section names a registry is decided the same way
/// Docker decides it: the section is a registry if it contains a dot or a
/// port number, or if it is exactly `localhost`. A name with a registry is
/// "fully qualified" and is only ever resolved against that registry.
#[derive(Clone)]
pub struct ImageName {
    serialized: String,
    registry_pos: Option<Range<usize>>,
    repository_pos: Range<usize>,
    tag_pos: Option<Range<usize>>,
    digest_pos: Option<Range<usize>>,
}

serialized_string_impls!(ImageName);

const DOMAIN_COMPONENT: &str = "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";

impl ImageName {
    /// Returns a reference to the existing string representation
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse an [ImageName] from its component pieces
    ///
    /// This fails if a component is invalid, or if the assembled string would
    /// parse differently than intended, for example when a registry-like
    /// first path section is passed as part of the repository.
    pub fn from_parts(
        registry: Option<&str>,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Self, ImageError> {
        let mut combined = String::new();
        if let Some(registry) = registry {
            combined.push_str(registry);
            combined.push('/');
        }
        combined.push_str(repository);
        if let Some(tag) = tag {
            combined.push(':');
            combined.push_str(tag);
        }
        if let Some(digest) = digest {
            combined.push('@');
            combined.push_str(digest);
        }
        let parsed = ImageName::parse(&combined)?;
        if parsed.as_parts() == (registry, repository, tag, digest) {
            Ok(parsed)
        } else {
            Err(ImageError::InvalidReferenceFormat(combined))
        }
    }

    /// Return references to the parsed components within this [ImageName]
    pub fn as_parts(&self) -> (Option<&str>, &str, Option<&str>, Option<&str>) {
        (
            self.registry_str(),
            self.repository_str(),
            self.tag_str(),
            self.content_digest_str(),
        )
    }

    /// Parse a [prim@str] as an [ImageName]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref HAS_REGISTRY: Regex = Regex::new(&format!(
                concat!(
                    "^(?:",
                    /* */ "{d}(?:\\.{d})+(?::[0-9]+)?", // dotted domain, optional port
                    /* */ "|{d}:[0-9]+", // no dots, but a port
                    /* */ "|localhost(?::[0-9]+)?",
                    ")/",
                ),
                d = DOMAIN_COMPONENT
            ))
            .unwrap();
            static ref WITH_REGISTRY: Regex = Regex::new(&format!(
                "^{}/{}(?::{})?(?:@{})?$",
                Registry::regex_str(),
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
            static ref NO_REGISTRY: Regex = Regex::new(&format!(
                "^{}(?::{})?(?:@{})?$",
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
        }
        let re: &Regex = if HAS_REGISTRY.is_match(s) {
            &WITH_REGISTRY
        } else {
            &NO_REGISTRY
        };
        let captures = re
            .captures(s)
            .ok_or_else(|| ImageError::InvalidReferenceFormat(s.to_owned()))?;
        if let Some(registry) = captures.name("reg") {
            // rejects out of range port numbers
            Registry::parse(registry.as_str())?;
        }
        Ok(ImageName {
            serialized: s.to_owned(),
            registry_pos: captures.name("reg").map(|m| m.range()),
            repository_pos: captures.name("repo").unwrap().range(),
            tag_pos: captures.name("tag").map(|m| m.range()),
            digest_pos: captures.name("dig").map(|m| m.range()),
        })
    }

    /// Returns a reference to the optional registry portion of the string
    pub fn registry_str(&self) -> Option<&str> {
        self.registry_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    /// Returns a reference to the repository portion of the string
    pub fn repository_str(&self) -> &str {
        &self.serialized[self.repository_pos.clone()]
    }

    /// Returns a reference to the optional tag portion of the string
    pub fn tag_str(&self) -> Option<&str> {
        self.tag_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    /// Returns a reference to the optional digest portion of the string
    pub fn content_digest_str(&self) -> Option<&str> {
        self.digest_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    /// Returns the registry portion as a new object
    pub fn registry(&self) -> Option<Registry> {
        self.registry_str()
            .map(|s| Registry::parse(s).expect("already parsed"))
    }

    /// Returns the repository portion as a new object
    pub fn repository(&self) -> Repository {
        Repository::parse(self.repository_str()).expect("already parsed")
    }

    /// Returns the tag portion as a new object
    pub fn tag(&self) -> Option<Tag> {
        self.tag_str().map(|s| Tag::parse(s).expect("already parsed"))
    }

    /// Returns the digest portion as a new object
    pub fn content_digest(&self) -> Option<ContentDigest> {
        self.content_digest_str()
            .map(|s| ContentDigest::parse(s).expect("already parsed"))
    }

    /// Returns the most specific version named, if any
    ///
    /// A digest wins over a tag. Unlike a pull, no default tag is assumed.
    pub fn version(&self) -> Option<ImageVersion> {
        match (self.content_digest(), self.tag()) {
            (Some(digest), _) => Some(ImageVersion::ContentDigest(digest)),
            (None, Some(tag)) => Some(ImageVersion::Tag(tag)),
            (None, None) => None,
        }
    }

    /// Does this name include an explicit registry?
    pub fn is_fully_qualified(&self) -> bool {
        self.registry_pos.is_some()
    }

    /// Prefix this name with a registry
    ///
    /// The registry string is parsed here, so an invalid candidate fails
    /// with [ImageError::InvalidReferenceFormat]. A name that already has a
    /// registry is returned unchanged.
    pub fn with_registry(&self, registry: &str) -> Result<ImageName, ImageError> {
        if self.is_fully_qualified() {
            return Ok(self.clone());
        }
        let registry = Registry::parse(registry)?;
        ImageName::from_parts(
            Some(registry.as_str()),
            self.repository_str(),
            self.tag_str(),
            self.content_digest_str(),
        )
    }

    /// Drop the tag and digest, keeping the registry and repository
    pub fn without_version(&self) -> ImageName {
        ImageName {
            serialized: self.serialized[..self.repository_pos.end].to_owned(),
            registry_pos: self.registry_pos.clone(),
            repository_pos: self.repository_pos.clone(),
            tag_pos: None,
            digest_pos: None,
        }
    }

    /// Replace any tag and digest with the given tag
    pub fn with_tag(&self, tag: &Tag) -> ImageName {
        let base = self.without_version();
        let start = base.serialized.len() + 1;
        ImageName {
            serialized: format!("{}:{}", base.serialized, tag),
            tag_pos: Some(start..(start + tag.as_str().len())),
            ..base
        }
    }
}
