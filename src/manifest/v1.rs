//! Conversion of legacy image JSON into the canonical image configuration

use crate::{errors::ImageError, image::ContentDigest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The only root filesystem type images are built from
pub const FS_TYPE: &str = "layers";

/// Legacy images older than this are normalized through [V1Image] first
const NO_FALLBACK_MIN_VERSION: &str = "1.8.3";

/// Keys of the legacy image JSON that describe a single layer rather than
/// the image
const LAYER_KEYS: &[&str] = &["id", "parent", "Size", "parent_id", "layer_id", "throwaway"];

/// Container configuration embedded in legacy image JSON
///
/// Only the command is interpreted. Everything else is carried through
/// unchanged.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ContainerConfig {
    #[serde(
        rename = "Cmd",
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub cmd: Option<Vec<String>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

fn string_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    Ok(Option::<StringOrList>::deserialize(d)?.map(|v| match v {
        StringOrList::One(s) => vec![s],
        StringOrList::Many(v) => v,
    }))
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// Typed shape of the legacy per-image JSON
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct V1Image {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_config: Option<ContainerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ContainerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(rename = "Size", default, skip_serializing_if = "is_zero")]
    pub size: i64,
}

/// One entry of the image history, bottom-most first
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct History {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub empty_layer: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    #[serde(default)]
    pub diff_ids: Vec<ContentDigest>,
}

impl Default for RootFs {
    fn default() -> Self {
        RootFs {
            fs_type: FS_TYPE.to_string(),
            diff_ids: Vec::new(),
        }
    }
}

/// Canonical image configuration
///
/// Both wire generations are converted into this one shape: the legacy
/// image fields, the root filesystem, and the ordered history.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ImageConfig {
    #[serde(flatten)]
    pub image: V1Image,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs: Option<RootFs>,
    #[serde(default)]
    pub history: Vec<History>,
}

impl ImageConfig {
    /// Parse a merged raw config, returning it along with the image ID
    ///
    /// The image ID is the digest of the config as encoded here, with keys
    /// in sorted order.
    pub fn from_raw(raw: &Map<String, Value>) -> Result<(ImageConfig, ContentDigest), ImageError> {
        let encoded = serde_json::to_vec(raw)?;
        let config = serde_json::from_slice(&encoded)?;
        Ok((config, ContentDigest::from_content(&encoded)))
    }
}

/// Build one history entry from a legacy image JSON
pub fn history_from_config(image_json: &[u8], empty_layer: bool) -> Result<History, ImageError> {
    let image: V1Image = serde_json::from_slice(image_json)?;
    let created_by = image
        .container_config
        .and_then(|c| c.cmd)
        .map(|cmd| cmd.join(" "))
        .unwrap_or_default();
    Ok(History {
        created: image.created,
        author: image.author.unwrap_or_default(),
        created_by,
        comment: image.comment.unwrap_or_default(),
        empty_layer,
    })
}

/// Merge a legacy image JSON with a root filesystem and history
///
/// The per-layer keys are removed, and `rootfs` and `history` are added.
/// JSON written by engines older than 1.8.3 is first normalized through
/// [V1Image], which drops any keys it does not know.
pub fn make_raw_config(
    image_json: &[u8],
    rootfs: &RootFs,
    history: &[History],
) -> Result<Map<String, Value>, ImageError> {
    #[derive(Deserialize)]
    struct DockerVersion {
        #[serde(default)]
        docker_version: Option<String>,
    }
    let version: DockerVersion = serde_json::from_slice(image_json)?;
    let version = version.docker_version.unwrap_or_default();

    let mut config: Map<String, Value> = if version_less_than(&version, NO_FALLBACK_MIN_VERSION) {
        let image: V1Image = serde_json::from_slice(image_json)?;
        match serde_json::to_value(image)? {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    } else {
        serde_json::from_slice(image_json)?
    };

    for key in LAYER_KEYS {
        config.remove(*key);
    }
    config.insert("rootfs".to_string(), serde_json::to_value(rootfs)?);
    config.insert("history".to_string(), serde_json::to_value(history)?);
    Ok(config)
}

/// Convert a legacy image JSON served by a V1 registry into a config
///
/// The image contributes one history entry and no known layers.
pub fn image_from_v1_json(image_json: &[u8]) -> Result<(ImageConfig, ContentDigest), ImageError> {
    let history = history_from_config(image_json, false)?;
    let raw = make_raw_config(image_json, &RootFs::default(), &[history])?;
    ImageConfig::from_raw(&raw)
}

/// Compare dotted version strings numerically
///
/// Missing or non-numeric components count as zero, so an empty version is
/// older than any release.
fn version_less_than(a: &str, b: &str) -> bool {
    let a: Vec<u64> = a.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    let b: Vec<u64> = b.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        if x != y {
            return x < y;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE_JSON: &str = r##"{
        "id": "b5b2b2c507a0944348e0303114d8d93aaaa081732b86451d9bce1f432a537bc7",
        "parent": "4a3ff7d76d1e8c1d1a8b83fa9f6c2f1e1b8c91bdf7d4f95ac8f2d3d3b06d9c54",
        "created": "2016-03-04T21:23:56.123456789Z",
        "container": "c0ffee",
        "container_config": {"Hostname": "c0ffee", "Cmd": ["/bin/sh", "-c", "#(nop) CMD [\"sh\"]"]},
        "docker_version": "1.9.1",
        "author": "someone",
        "config": {"Cmd": "sh", "Env": ["PATH=/bin"]},
        "architecture": "amd64",
        "os": "linux",
        "Size": 0,
        "throwaway": true,
        "custom": 1
    }"##;

    #[test]
    fn history_joins_command() {
        let h = history_from_config(IMAGE_JSON.as_bytes(), true).unwrap();
        assert_eq!(h.created_by, "/bin/sh -c #(nop) CMD [\"sh\"]");
        assert_eq!(h.author, "someone");
        assert!(h.empty_layer);
        assert_eq!(
            h.created.unwrap().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            "2016-03-04T21:23:56.123456789Z"
        );

        let h = history_from_config(br#"{"container_config":{"Cmd":"echo hi"}}"#, false).unwrap();
        assert_eq!(h.created_by, "echo hi");
        let h = history_from_config(b"{}", false).unwrap();
        assert_eq!(h, History::default());
    }

    #[test]
    fn raw_config_drops_layer_keys() {
        let history = vec![History::default()];
        let raw = make_raw_config(IMAGE_JSON.as_bytes(), &RootFs::default(), &history).unwrap();
        for key in LAYER_KEYS {
            assert!(!raw.contains_key(*key), "{} should be removed", key);
        }
        assert_eq!(raw["rootfs"]["type"], "layers");
        assert_eq!(raw["history"].as_array().unwrap().len(), 1);
        // recent engines keep unknown keys
        assert_eq!(raw["custom"], 1);
        assert_eq!(raw["config"]["Env"][0], "PATH=/bin");
    }

    #[test]
    fn old_engines_are_normalized() {
        let json = IMAGE_JSON.replace("1.9.1", "1.6.2");
        let raw = make_raw_config(json.as_bytes(), &RootFs::default(), &[]).unwrap();
        assert!(!raw.contains_key("custom"));
        assert_eq!(raw["config"]["Cmd"][0], "sh");
        assert_eq!(raw["architecture"], "amd64");

        let raw = make_raw_config(br#"{"custom":1}"#, &RootFs::default(), &[]).unwrap();
        assert!(!raw.contains_key("custom"));
    }

    #[test]
    fn image_id_is_config_digest() {
        let (config, id) = image_from_v1_json(IMAGE_JSON.as_bytes()).unwrap();
        assert_eq!(config.image.os.as_deref(), Some("linux"));
        assert_eq!(config.image.id, None);
        assert_eq!(config.image.parent, None);
        assert_eq!(config.history.len(), 1);
        assert_eq!(config.rootfs, Some(RootFs::default()));

        let raw = make_raw_config(
            IMAGE_JSON.as_bytes(),
            &RootFs::default(),
            &config.history,
        )
        .unwrap();
        let encoded = serde_json::to_vec(&raw).unwrap();
        assert_eq!(id, ContentDigest::from_content(&encoded));
    }

    #[test]
    fn compare_versions() {
        assert!(version_less_than("", "1.8.3"));
        assert!(version_less_than("1.8.2", "1.8.3"));
        assert!(version_less_than("1.6", "1.8.3"));
        assert!(!version_less_than("1.8.3", "1.8.3"));
        assert!(!version_less_than("1.10.0", "1.8.3"));
        assert!(!version_less_than("17.03.1-ce", "1.8.3"));
    }
}
