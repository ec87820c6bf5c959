use crate::{
    errors::ImageError,
    image::{ImageName, Registry},
    registry::{
        ApiVersion, DefaultRegistry, Endpoint, IndexInfo, RegistryService, RepositoryInfo,
        TlsConfig,
    },
};
use std::collections::HashSet;
use url::Url;

/// Builder for configuring custom [Service] instances
#[derive(Clone, Debug)]
pub struct ServiceBuilder {
    default_registry: DefaultRegistry,
    mirrors: Vec<Url>,
    insecure_registries: HashSet<Registry>,
    root_certificates: Vec<Vec<u8>>,
    disable_legacy: bool,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        ServiceBuilder::new()
    }
}

impl ServiceBuilder {
    /// Start constructing a custom registry service
    pub fn new() -> Self {
        ServiceBuilder {
            default_registry: DefaultRegistry::new(),
            mirrors: Vec::new(),
            insecure_registries: HashSet::new(),
            root_certificates: Vec::new(),
            disable_legacy: false,
        }
    }

    /// Change the default registry server
    ///
    /// The parameter is a [DefaultRegistry], which provides a few additional
    /// options for emulating registry quirks. When those aren't needed,
    /// a [Registry] can be converted directly into a [DefaultRegistry] by
    /// calling its `into()`.
    pub fn registry(mut self, default_registry: &DefaultRegistry) -> Self {
        self.default_registry = default_registry.clone();
        self
    }

    /// Add a mirror of the default registry
    ///
    /// Mirrors are tried in the order they were added, before the default
    /// registry itself.
    pub fn mirror(mut self, url: Url) -> Self {
        self.mirrors.push(url);
        self
    }

    /// Allow plain http and unverified certificates for a registry
    ///
    /// Loopback registries are always treated this way.
    pub fn insecure_registry(mut self, registry: Registry) -> Self {
        self.insecure_registries.insert(registry);
        self
    }

    /// Trust an additional PEM encoded root certificate
    pub fn add_root_certificate(mut self, pem: Vec<u8>) -> Self {
        self.root_certificates.push(pem);
        self
    }

    /// Never offer V1 endpoints
    pub fn disable_legacy_registry(mut self) -> Self {
        self.disable_legacy = true;
        self
    }

    /// Construct a Service using the parameters from this Builder
    pub fn build(self) -> Service {
        Service {
            default_registry: self.default_registry,
            mirrors: self.mirrors,
            insecure_registries: self.insecure_registries,
            root_certificates: self.root_certificates,
            disable_legacy: self.disable_legacy,
        }
    }
}

/// The default [RegistryService]
///
/// It knows one official index, its mirrors, and which other registries are
/// allowed to skip TLS.
#[derive(Clone, Debug)]
pub struct Service {
    default_registry: DefaultRegistry,
    mirrors: Vec<Url>,
    insecure_registries: HashSet<Registry>,
    root_certificates: Vec<Vec<u8>>,
    disable_legacy: bool,
}

impl Default for Service {
    fn default() -> Self {
        Service::new()
    }
}

impl Service {
    /// Construct a registry service with default options
    pub fn new() -> Service {
        Service::builder().build()
    }

    /// Construct a registry service with custom options, via ServiceBuilder
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    fn is_secure(&self, registry: &Registry) -> bool {
        !registry.is_localhost() && !self.insecure_registries.contains(registry)
    }

    fn index_for(&self, registry: Option<Registry>) -> Result<IndexInfo, ImageError> {
        if self.default_registry.is_default(&registry) {
            Ok(IndexInfo {
                name: self.default_registry.index_name.clone(),
                mirrors: self
                    .mirrors
                    .iter()
                    .map(legacy_mirror)
                    .collect::<Result<_, _>>()?,
                secure: true,
                official: true,
            })
        } else {
            let name = registry.unwrap_or_else(|| self.default_registry.index_name.clone());
            Ok(IndexInfo {
                secure: self.is_secure(&name),
                name,
                mirrors: Vec::new(),
                official: false,
            })
        }
    }

    fn endpoint(
        &self,
        scheme: &str,
        host: &Registry,
        version: ApiVersion,
        official: bool,
        tls: &TlsConfig,
    ) -> Result<Endpoint, ImageError> {
        Ok(Endpoint {
            url: Url::parse(&format!("{}://{}", scheme, host))?,
            version,
            mirror: false,
            official,
            tls: tls.clone(),
        })
    }
}

/// Address of the V1 API on a mirror
///
/// Mirrors are configured by their root. V2 requests go below `v2/` there,
/// and V1 image JSON below `v1/`.
fn legacy_mirror(mirror: &Url) -> Result<Url, ImageError> {
    let mut root = mirror.clone();
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    Ok(root.join("v1/")?)
}

impl RegistryService for Service {
    fn resolve_repository(&self, name: &ImageName) -> Result<RepositoryInfo, ImageError> {
        let index = self.index_for(name.registry())?;
        let remote_name = self.default_registry.remote_name(name);
        let local_name = self.default_registry.local_name(name);
        let canonical_name =
            ImageName::from_parts(Some(index.name.as_str()), remote_name.as_str(), None, None)?;
        Ok(RepositoryInfo {
            index,
            canonical_name,
            local_name,
            remote_name,
        })
    }

    fn lookup_pull_endpoints(&self, canonical_name: &ImageName) -> Result<Vec<Endpoint>, ImageError> {
        let index = self.index_for(canonical_name.registry())?;
        let tls = self.tls_config(&index.name)?;
        let mut endpoints = Vec::new();

        if index.official {
            for mirror in &self.mirrors {
                endpoints.push(Endpoint {
                    url: mirror.clone(),
                    version: ApiVersion::V2,
                    mirror: true,
                    official: true,
                    tls: tls.clone(),
                });
            }
            let network = &self.default_registry.network_name;
            endpoints.push(self.endpoint("https", network, ApiVersion::V2, true, &tls)?);
            if !self.disable_legacy {
                let legacy = &self.default_registry.legacy_name;
                endpoints.push(self.endpoint("https", legacy, ApiVersion::V1, true, &tls)?);
            }
            return Ok(endpoints);
        }

        let mut versions = vec![ApiVersion::V2];
        if !self.disable_legacy {
            versions.push(ApiVersion::V1);
        }
        for version in versions {
            endpoints.push(self.endpoint("https", &index.name, version, false, &tls)?);
            if !index.secure {
                endpoints.push(self.endpoint("http", &index.name, version, false, &tls)?);
            }
        }
        Ok(endpoints)
    }

    fn tls_config(&self, index: &Registry) -> Result<TlsConfig, ImageError> {
        let official = self.default_registry.is_default(&Some(index.clone()));
        Ok(TlsConfig {
            insecure_skip_verify: !official && !self.is_secure(index),
            root_certificates: self.root_certificates.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(endpoints: &[Endpoint]) -> Vec<(String, ApiVersion)> {
        endpoints
            .iter()
            .map(|e| (e.url.to_string(), e.version))
            .collect()
    }

    #[test]
    fn resolve_official() {
        let service = Service::new();
        let info = service
            .resolve_repository(&ImageName::parse("docker.io/busybox:latest").unwrap())
            .unwrap();
        assert_eq!(info.index.name.as_str(), "docker.io");
        assert!(info.index.official);
        assert!(info.index.secure);
        assert_eq!(info.canonical_name.as_str(), "docker.io/library/busybox");
        assert_eq!(info.local_name.as_str(), "busybox");
        assert_eq!(info.remote_name.as_str(), "library/busybox");
    }

    #[test]
    fn official_endpoints_with_mirror() {
        let service = Service::builder()
            .mirror("https://mirror.example.com".parse().unwrap())
            .build();
        let name = ImageName::parse("docker.io/library/busybox").unwrap();
        let endpoints = service.lookup_pull_endpoints(&name).unwrap();
        assert_eq!(
            urls(&endpoints),
            vec![
                ("https://mirror.example.com/".to_string(), ApiVersion::V2),
                ("https://registry-1.docker.io/".to_string(), ApiVersion::V2),
                ("https://index.docker.io/".to_string(), ApiVersion::V1),
            ]
        );
        assert!(endpoints[0].mirror);
        assert!(endpoints.iter().all(|e| e.official));

        let info = service.resolve_repository(&name).unwrap();
        assert_eq!(
            info.index.mirrors,
            vec![Url::parse("https://mirror.example.com/v1/").unwrap()]
        );
    }

    #[test]
    fn legacy_mirror_paths() {
        let mirror = |s: &str| legacy_mirror(&s.parse().unwrap()).unwrap().to_string();
        assert_eq!(mirror("https://m.example.com"), "https://m.example.com/v1/");
        assert_eq!(mirror("https://m.example.com/"), "https://m.example.com/v1/");
        assert_eq!(mirror("http://m.example.com:5000/hub"), "http://m.example.com:5000/hub/v1/");
    }

    #[test]
    fn insecure_endpoints() {
        let service = Service::builder()
            .insecure_registry("dev.example.com:5000".parse().unwrap())
            .build();
        let name = ImageName::parse("dev.example.com:5000/app").unwrap();
        let info = service.resolve_repository(&name).unwrap();
        assert!(!info.index.secure);
        let endpoints = service.lookup_pull_endpoints(&info.canonical_name).unwrap();
        assert_eq!(
            urls(&endpoints),
            vec![
                ("https://dev.example.com:5000/".to_string(), ApiVersion::V2),
                ("http://dev.example.com:5000/".to_string(), ApiVersion::V2),
                ("https://dev.example.com:5000/".to_string(), ApiVersion::V1),
                ("http://dev.example.com:5000/".to_string(), ApiVersion::V1),
            ]
        );
        assert!(endpoints[0].tls.insecure_skip_verify);
    }

    #[test]
    fn legacy_disabled() {
        let service = Service::builder().disable_legacy_registry().build();
        let name = ImageName::parse("quay.io/org/app").unwrap();
        let endpoints = service.lookup_pull_endpoints(&name).unwrap();
        assert_eq!(
            urls(&endpoints),
            vec![("https://quay.io/".to_string(), ApiVersion::V2)]
        );
        assert!(!endpoints[0].tls.insecure_skip_verify);
    }
}
