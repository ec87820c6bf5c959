use crate::image::{ImageName, Registry, Repository};

/// Settings for the official index and its quirks
///
/// If you don't need the additional options, you can convert a plain [Registry]
/// [Into] a [DefaultRegistry]
#[derive(Clone, Debug)]
pub struct DefaultRegistry {
    /// The index is known to users under this name
    pub index_name: Registry,
    /// Connect to V2 of the registry under this name
    pub network_name: Registry,
    /// Connect to V1 of the registry under this name
    pub legacy_name: Registry,
    /// This registry is also known under additional names
    pub also_known_as: Vec<Registry>,
    /// Use this prefix when accessing an image repository with only a single
    /// path component
    pub library_prefix: Option<Repository>,
}

impl From<Registry> for DefaultRegistry {
    fn from(network_name: Registry) -> Self {
        DefaultRegistry {
            index_name: network_name.clone(),
            legacy_name: network_name.clone(),
            network_name,
            also_known_as: vec![],
            library_prefix: None,
        }
    }
}

impl Default for DefaultRegistry {
    fn default() -> Self {
        DefaultRegistry::new()
    }
}

impl DefaultRegistry {
    /// Return the built-in defaults
    pub fn new() -> Self {
        DefaultRegistry {
            index_name: "docker.io".parse().unwrap(),
            network_name: "registry-1.docker.io".parse().unwrap(),
            legacy_name: "index.docker.io".parse().unwrap(),
            also_known_as: vec![
                "registry-1.docker.io".parse().unwrap(),
                "index.docker.io".parse().unwrap(),
            ],
            library_prefix: Some("library".parse().unwrap()),
        }
    }

    /// Check whether a particular registry is considered default under these
    /// settings
    ///
    /// Returns true if the given registry is None or if it matches either the
    /// `index_name`, the `network_name`, or any of the `also_known_as` settings
    /// here.
    pub fn is_default(&self, registry: &Option<Registry>) -> bool {
        match registry {
            None => true,
            Some(registry) => {
                registry == &self.index_name
                    || registry == &self.network_name
                    || self.also_known_as.contains(registry)
            }
        }
    }

    /// Path of a repository on the server
    ///
    /// Single component names on the default registry get the library prefix.
    pub fn remote_name(&self, image: &ImageName) -> Repository {
        let image_repo = image.repository();
        if !self.is_default(&image.registry()) || !image_repo.is_single_component() {
            return image_repo;
        }
        match &self.library_prefix {
            None => image_repo,
            Some(prefix) => prefix.join(&image_repo),
        }
    }

    /// Name of a repository as a user would write it
    ///
    /// This is the remote name with any library prefix removed again.
    pub fn local_name(&self, image: &ImageName) -> Repository {
        let remote = self.remote_name(image);
        if !self.is_default(&image.registry()) {
            return remote;
        }
        match &self.library_prefix {
            Some(prefix) => match remote.strip_prefix(prefix) {
                Some(stripped) if stripped.is_single_component() => stripped,
                _ => remote,
            },
            None => remote,
        }
    }
}
