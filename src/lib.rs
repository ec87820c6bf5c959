//! Inspect images and list tags on remote Docker registries, without
//! pulling any layers.

#[macro_use] extern crate lazy_static;

pub mod distribution;
pub mod errors;
pub mod image;
pub mod manifest;
pub mod registry;

pub use crate::{
    distribution::{
        inspect, list_remote_tags, ImageInspect, InspectConfig, ListRemoteTagsConfig,
        RepositoryTag, RepositoryTagList,
    },
    image::ImageName,
};
