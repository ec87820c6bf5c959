use crate::errors::ImageError;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::ops::Range;

/// A digest securely identifies the specific contents of a binary object
///
/// The serialized form is `algorithm:hex`. Any algorithm name is accepted by
/// the parser, but only `sha256` can be computed or verified locally.
#[derive(Clone)]
pub struct ContentDigest {
    serialized: String,
    format_pos: Range<usize>,
    hex_pos: Range<usize>,
}

serialized_string_impls!(ContentDigest);

/// The only algorithm we compute
pub const SHA256: &str = "sha256";

impl ContentDigest {
    /// Returns a reference to the existing string representation
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Hash content with `sha256`
    ///
    /// ```
    /// # use reginspect::image::ContentDigest;
    /// let digest = ContentDigest::from_content(b"cat");
    /// assert_eq!(digest.as_str(), "sha256:77af778b51abd4a3c51c5ddd97204a9c3ae614ebccb75a606c3b6865aed6744e");
    /// ```
    pub fn from_content(content_bytes: &[u8]) -> Self {
        let hex = format!("{:x}", Sha256::digest(content_bytes));
        ContentDigest {
            format_pos: 0..SHA256.len(),
            hex_pos: (SHA256.len() + 1)..(SHA256.len() + 1 + hex.len()),
            serialized: format!("{}:{}", SHA256, hex),
        }
    }

    /// Parse a [prim@str] as a [ContentDigest]
    ///
    /// ```
    /// # use reginspect::image::ContentDigest;
    /// let digest = ContentDigest::parse("format:00112233445566778899aabbccddeeff").unwrap();
    /// assert_eq!(digest.format_str(), "format");
    /// assert_eq!(digest.hex_str(), "00112233445566778899aabbccddeeff")
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", ContentDigest::regex_str())).unwrap();
        }
        let captures = RE
            .captures(s)
            .ok_or_else(|| ImageError::InvalidReferenceFormat(s.to_owned()))?;
        Ok(ContentDigest {
            serialized: s.to_owned(),
            format_pos: captures.name("dig_f").unwrap().range(),
            hex_pos: captures.name("dig_h").unwrap().range(),
        })
    }

    /// The algorithm name before the colon
    pub fn format_str(&self) -> &str {
        &self.serialized[self.format_pos.clone()]
    }

    /// The hex digits after the colon, at least 32 of them
    pub fn hex_str(&self) -> &str {
        &self.serialized[self.hex_pos.clone()]
    }

    /// Check content against this digest
    ///
    /// Fails if the algorithm is not one we can compute. Otherwise returns
    /// whether the content hashes to this digest.
    pub fn verify(&self, content_bytes: &[u8]) -> Result<bool, ImageError> {
        if self.format_str() != SHA256 {
            return Err(ImageError::UnsupportedDigestAlgorithm(
                self.format_str().to_owned(),
            ));
        }
        Ok(&ContentDigest::from_content(content_bytes) == self)
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<dig>",
            /*  */ "(?P<dig_f>", // algorithm
            /* -- */ "[a-zA-Z][a-zA-Z0-9]*",
            /* -- */ "(?:[-_+.][a-zA-Z][a-zA-Z0-9]*)*",
            /*  */ ")",
            /*  */ "[:]",
            /*  */ "(?P<dig_h>[a-f0-9]{32,})",
            ")",
        )
    }
}

impl<'de> serde::Deserialize<'de> for ContentDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentDigest::parse(&s).map_err(serde::de::Error::custom)
    }
}
