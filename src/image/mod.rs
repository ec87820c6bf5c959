//! Image references and their components
//!
//! These types parse the Docker reference grammar. Each one owns its
//! serialized string and compares, hashes, and prints as that string.

/// Comparison, hashing, formatting, and [std::str::FromStr] for a type with
/// a `serialized: String` field and a fallible `parse` constructor
macro_rules! serialized_string_impls {
    ($type:ty) => {
        impl Eq for $type {}

        impl PartialEq for $type {
            fn eq(&self, other: &Self) -> bool {
                self.serialized.eq(&other.serialized)
            }
        }

        impl std::hash::Hash for $type {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.serialized.hash(state);
            }
        }

        impl Ord for $type {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.serialized.cmp(&other.serialized)
            }
        }

        impl PartialOrd for $type {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl std::str::FromStr for $type {
            type Err = crate::errors::ImageError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$type>::parse(s)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.serialized)
            }
        }

        impl std::fmt::Debug for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.serialized)
            }
        }

        impl serde::Serialize for $type {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.serialized)
            }
        }
    };
}



mod digest;
mod name;
mod registry;
mod repository;
mod tag;
mod version;

pub use digest::ContentDigest;
pub use name::ImageName;
pub use registry::Registry;
pub use repository::{Repository, RepositoryIter};
pub use tag::{Tag, DEFAULT_TAG};
pub use version::ImageVersion;
