//! Image manifests and image configuration
//!
//! Inspection understands the signed legacy manifest schema (schema1),
//! whose history entries embed one legacy image JSON per layer. Both that
//! schema and the per-image JSON served by legacy registries are converted
//! into one [ImageConfig].

mod decode;
mod v1;

pub use v1::{
    history_from_config, image_from_v1_json, make_raw_config, ContainerConfig, History,
    ImageConfig, RootFs, V1Image, FS_TYPE,
};
pub use decode::{decode_manifest, fix_manifest_layers, verify_manifest, DecodedManifest};

use crate::errors::ImageError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

/// Partial implementation of the image manifest v2 schema1 spec.
///
/// Reference: <https://docs.docker.com/registry/spec/manifest-v2-1/>
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub architecture: String,
    /// Layers, top-most first
    #[serde(rename = "fsLayers", default)]
    pub fs_layers: Vec<FsLayer>,
    /// One entry per layer, in the same order
    #[serde(default)]
    pub history: Vec<V1Compatibility>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct V1Compatibility {
    /// Legacy image JSON for this layer
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Signature {
    #[serde(default)]
    pub header: serde_json::Value,
    pub signature: String,
    pub protected: String,
}

pub mod media_types {
    pub const SIGNED_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
    pub const MANIFEST: &str = "application/vnd.docker.distribution.manifest.v1+json";
    pub const JSON: &str = "application/json";
}

/// A schema1 manifest as received, before any verification
///
/// The raw bytes are kept, since the signed payload and the manifest digest
/// are both defined over them rather than over any re-encoding.
#[derive(Clone, Debug)]
pub struct SignedManifest {
    pub manifest: Manifest,
    pub signatures: Vec<Signature>,
    raw: Vec<u8>,
}

#[derive(Deserialize)]
struct SignedManifestJson {
    #[serde(flatten)]
    manifest: Manifest,
    #[serde(default)]
    signatures: Vec<Signature>,
}

#[derive(Deserialize)]
struct ProtectedHeader {
    #[serde(rename = "formatLength")]
    format_length: usize,
    #[serde(rename = "formatTail")]
    format_tail: String,
}

impl SignedManifest {
    /// Parse a manifest exactly as the registry sent it
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, ImageError> {
        let parsed: SignedManifestJson = serde_json::from_slice(&raw)?;
        Ok(SignedManifest {
            manifest: parsed.manifest,
            signatures: parsed.signatures,
            raw,
        })
    }

    /// The bytes exactly as received
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The bytes covered by the signature
    ///
    /// A pretty-printed JWS embeds its signatures in the document itself.
    /// The protected header of a signature records how many leading bytes
    /// of the document were signed, and which bytes closed the document
    /// before the signatures were spliced in. An unsigned manifest is its
    /// own payload.
    pub fn payload(&self) -> Result<Vec<u8>, ImageError> {
        let signature = match self.signatures.first() {
            None => return Ok(self.raw.clone()),
            Some(signature) => signature,
        };
        let header = decode_base64url(&signature.protected)?;
        let header: ProtectedHeader = serde_json::from_slice(&header)
            .map_err(|err| ImageError::InvalidSignature(err.to_string()))?;
        let tail = decode_base64url(&header.format_tail)?;
        if header.format_length > self.raw.len() {
            return Err(ImageError::InvalidSignature(format!(
                "format length {} exceeds manifest size {}",
                header.format_length,
                self.raw.len()
            )));
        }
        let mut payload = Vec::with_capacity(header.format_length + tail.len());
        payload.extend_from_slice(&self.raw[..header.format_length]);
        payload.extend_from_slice(&tail);
        Ok(payload)
    }
}

fn decode_base64url(s: &str) -> Result<Vec<u8>, ImageError> {
    URL_SAFE_NO_PAD
        .decode(s.trim_end_matches('='))
        .map_err(|err| ImageError::InvalidSignature(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_payload_is_raw() {
        let raw = br#"{"schemaVersion":1,"fsLayers":[],"history":[]}"#.to_vec();
        let m = SignedManifest::from_bytes(raw.clone()).unwrap();
        assert_eq!(m.payload().unwrap(), raw);
        assert_eq!(m.manifest.schema_version, 1);
    }

    #[test]
    fn signed_payload_strips_signatures() {
        let body = "{\n   \"schemaVersion\": 1,\n   \"name\": \"x\"";
        let tail = "\n}";
        let header = format!(
            r#"{{"formatLength":{},"formatTail":"{}"}}"#,
            body.len(),
            URL_SAFE_NO_PAD.encode(tail)
        );
        let raw = format!(
            "{},\n   \"signatures\": [{{\"signature\": \"s\", \"protected\": \"{}\"}}]\n}}",
            body,
            URL_SAFE_NO_PAD.encode(header)
        );
        let m = SignedManifest::from_bytes(raw.into_bytes()).unwrap();
        assert_eq!(m.manifest.name, "x");
        let payload = m.payload().unwrap();
        assert_eq!(String::from_utf8(payload).unwrap(), format!("{}{}", body, tail));
    }

    #[test]
    fn bad_protected_header() {
        let raw = br#"{"schemaVersion":1,"signatures":[{"signature":"s","protected":"!!"}]}"#;
        let m = SignedManifest::from_bytes(raw.to_vec()).unwrap();
        assert!(matches!(m.payload(), Err(ImageError::InvalidSignature(_))));
    }
}
