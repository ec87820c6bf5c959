use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageName},
    manifest::{history_from_config, make_raw_config, ImageConfig, Manifest, RootFs, SignedManifest},
};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;

/// Everything inspection learns from one schema1 manifest
#[derive(Clone, Debug)]
pub struct DecodedManifest {
    pub config: ImageConfig,
    /// Digest of the merged configuration
    pub id: ContentDigest,
    /// Blob sums of the layers that carry filesystem content, bottom-most first
    pub layers: Vec<String>,
    /// Digest of the signed payload
    pub digest: ContentDigest,
}

/// Check a manifest against the reference it was fetched for
///
/// When the reference names a digest, the signed payload must hash to it,
/// and the manifest is re-read from that payload. This happens before any
/// other validation.
pub fn verify_manifest(signed: &SignedManifest, reference: &ImageName) -> Result<Manifest, ImageError> {
    let manifest = match reference.content_digest() {
        Some(digest) => {
            let payload = signed.payload()?;
            if !digest.verify(&payload)? {
                return Err(ImageError::ManifestVerification(digest.to_string()));
            }
            serde_json::from_slice(&payload)?
        }
        None => signed.manifest.clone(),
    };
    if manifest.schema_version != 1 {
        return Err(ImageError::UnsupportedSchemaVersion {
            version: manifest.schema_version,
            reference: reference.to_string(),
        });
    }
    if manifest.fs_layers.len() != manifest.history.len() {
        return Err(ImageError::LayerHistoryMismatch(reference.to_string()));
    }
    if manifest.fs_layers.is_empty() {
        return Err(ImageError::NoLayers(reference.to_string()));
    }
    Ok(manifest)
}

#[derive(Deserialize)]
struct LayerIds {
    #[serde(default)]
    id: String,
    #[serde(default)]
    parent: String,
}

#[derive(Deserialize)]
struct ThrowAway {
    #[serde(default)]
    throwaway: bool,
}

fn validate_id(id: &str) -> Result<(), ImageError> {
    lazy_static! {
        static ref VALID_ID: Regex = Regex::new("^[a-f0-9]{64}$").unwrap();
    }
    if VALID_ID.is_match(id) {
        Ok(())
    } else {
        Err(ImageError::InvalidImageId(id.to_owned()))
    }
}

/// Remove repeated layers and check the parent chain
///
/// Adjacent entries with the same ID are collapsed into one. The same ID
/// appearing again further down is an error, as is any entry whose parent
/// is not the entry directly below it.
pub fn fix_manifest_layers(manifest: &mut Manifest) -> Result<(), ImageError> {
    let mut images = Vec::with_capacity(manifest.history.len());
    for entry in &manifest.history {
        let ids: LayerIds = serde_json::from_str(&entry.v1_compatibility)?;
        validate_id(&ids.id)?;
        images.push(ids);
    }

    match images.last() {
        Some(base) if !base.parent.is_empty() => return Err(ImageError::InvalidBaseLayerParent),
        _ => (),
    }

    let mut seen = HashSet::new();
    let mut last_id = "";
    for image in &images {
        if image.id != last_id && seen.contains(image.id.as_str()) {
            return Err(ImageError::DuplicateLayerId(image.id.clone()));
        }
        last_id = image.id.as_str();
        seen.insert(image.id.as_str());
    }

    // walk upward so removals do not disturb the indices still to visit
    for i in (0..images.len().saturating_sub(1)).rev() {
        if images[i].id == images[i + 1].id {
            manifest.fs_layers.remove(i);
            manifest.history.remove(i);
        } else if images[i].parent != images[i + 1].id {
            return Err(ImageError::InvalidParentId {
                expected: images[i + 1].id.clone(),
                found: images[i].parent.clone(),
            });
        }
    }
    Ok(())
}

/// Turn a schema1 manifest into an image configuration
///
/// `local_name` only appears in log messages.
pub fn decode_manifest(
    signed: &SignedManifest,
    reference: &ImageName,
    local_name: &str,
) -> Result<DecodedManifest, ImageError> {
    let mut manifest = verify_manifest(signed, reference)?;
    fix_manifest_layers(&mut manifest)?;

    let mut history = Vec::with_capacity(manifest.history.len());
    let mut layers = Vec::new();
    for (layer, entry) in manifest.fs_layers.iter().zip(&manifest.history).rev() {
        let json = entry.v1_compatibility.as_bytes();
        let ThrowAway { throwaway } = serde_json::from_slice::<ThrowAway>(json)?;
        history.push(history_from_config(json, throwaway)?);
        if !throwaway {
            layers.push(layer.blob_sum.clone());
        }
    }

    // the top entry as served, before repeated layers were collapsed
    let top = signed
        .manifest
        .history
        .first()
        .ok_or_else(|| ImageError::NoLayers(reference.to_string()))?;
    let raw = make_raw_config(top.v1_compatibility.as_bytes(), &RootFs::default(), &history)?;
    let (config, id) = ImageConfig::from_raw(&raw)?;

    // a corrupted signature section leaves the whole document as payload
    let payload = match signed.payload() {
        Ok(payload) => payload,
        Err(err) => {
            log::info!(
                "could not extract manifest payload for {}:{}, {}",
                local_name,
                signed.manifest.tag,
                err
            );
            signed.raw().to_vec()
        }
    };

    Ok(DecodedManifest {
        config,
        id,
        layers,
        digest: ContentDigest::from_content(&payload),
    })
}
