use crate::{
    image::{ContentDigest, Tag},
    manifest::{ContainerConfig, ImageConfig},
    registry::RepositoryInfo,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// Metadata of an image on a remote registry
///
/// Field names follow the Docker engine API.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspect {
    #[serde(rename = "Id")]
    pub id: String,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
    pub parent: String,
    pub comment: String,
    /// RFC 3339 in UTC, with nanoseconds
    pub created: String,
    pub container: String,
    pub container_config: Option<ContainerConfig>,
    pub docker_version: String,
    pub author: String,
    pub config: Option<ContainerConfig>,
    pub architecture: String,
    pub os: String,
    pub size: i64,
    /// Name of the index the image was found on
    pub registry: String,
}

impl ImageInspect {
    /// Assemble the record for an image found in a repository
    ///
    /// Each of the tag and the manifest digest contributes one entry, when
    /// known.
    pub fn new(
        repo_info: &RepositoryInfo,
        config: &ImageConfig,
        id: &ContentDigest,
        tag: Option<&Tag>,
        digest: Option<&ContentDigest>,
    ) -> Self {
        let image = &config.image;
        ImageInspect {
            id: id.to_string(),
            repo_tags: tag
                .map(|tag| repo_info.canonical_name.with_tag(tag).to_string())
                .into_iter()
                .collect(),
            repo_digests: digest.map(ContentDigest::to_string).into_iter().collect(),
            parent: image.parent.clone().unwrap_or_default(),
            comment: image.comment.clone().unwrap_or_default(),
            created: image
                .created
                .map(|created| created.to_rfc3339_opts(SecondsFormat::Nanos, true))
                .unwrap_or_default(),
            container: image.container.clone().unwrap_or_default(),
            container_config: image.container_config.clone(),
            docker_version: image.docker_version.clone().unwrap_or_default(),
            author: image.author.clone().unwrap_or_default(),
            config: image.config.clone(),
            architecture: image.architecture.clone().unwrap_or_default(),
            os: image.os.clone().unwrap_or_default(),
            size: image.size,
            registry: repo_info.index.name.to_string(),
        }
    }
}

/// One tag of a remote repository
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct RepositoryTag {
    #[serde(rename = "Tag")]
    pub tag: String,
    /// Only legacy registries report image IDs alongside tags
    #[serde(rename = "ImageID", default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

/// All tags of a remote repository, sorted by name
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct RepositoryTagList {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "TagList")]
    pub tag_list: Vec<RepositoryTag>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::{ImageName, Registry},
        registry::IndexInfo,
    };
    use chrono::TimeZone;

    fn repo_info() -> RepositoryInfo {
        RepositoryInfo {
            index: IndexInfo {
                name: Registry::parse("docker.io").unwrap(),
                mirrors: vec![],
                secure: true,
                official: true,
            },
            canonical_name: ImageName::parse("docker.io/library/busybox").unwrap(),
            local_name: "busybox".parse().unwrap(),
            remote_name: "library/busybox".parse().unwrap(),
        }
    }

    #[test]
    fn inspect_record() {
        let mut config = ImageConfig::default();
        config.image.created = Some(chrono::Utc.with_ymd_and_hms(2016, 3, 4, 21, 23, 56).unwrap());
        config.image.os = Some("linux".into());
        let id = ContentDigest::from_content(b"config");
        let digest = ContentDigest::from_content(b"manifest");

        let record = ImageInspect::new(&repo_info(), &config, &id, Some(&Tag::latest()), Some(&digest));
        assert_eq!(record.repo_tags, vec!["docker.io/library/busybox:latest"]);
        assert_eq!(record.repo_digests, vec![digest.to_string()]);
        assert_eq!(record.created, "2016-03-04T21:23:56.000000000Z");
        assert_eq!(record.registry, "docker.io");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Id"], id.to_string());
        assert_eq!(json["Os"], "linux");
        assert_eq!(json["DockerVersion"], "");

        let record = ImageInspect::new(&repo_info(), &config, &id, None, None);
        assert!(record.repo_tags.is_empty());
        assert!(record.repo_digests.is_empty());
    }

    #[test]
    fn tag_json() {
        let tag = RepositoryTag {
            tag: "1.0".into(),
            image_id: None,
        };
        assert_eq!(serde_json::to_string(&tag).unwrap(), r#"{"Tag":"1.0"}"#);
    }
}
