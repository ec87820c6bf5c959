mod common;

use common::*;
use reginspect::{
    errors::ImageError,
    image::{ImageName, Tag},
    registry::{
        ApiVersion, AuthConfig, Endpoint, HttpTransport, IndexInfo, ManifestService, MetaHeaders,
        RepositoryInfo, Service, TlsConfig, Transport,
    },
    InspectConfig, ListRemoteTagsConfig,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const MANIFEST_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

fn registry_name(server: &MockServer) -> String {
    server.address().to_string()
}

fn repo_info(server: &MockServer) -> RepositoryInfo {
    let name = ImageName::parse(&format!("{}/app", registry_name(server))).unwrap();
    RepositoryInfo {
        index: IndexInfo {
            name: name.registry().unwrap(),
            mirrors: vec![],
            secure: false,
            official: false,
        },
        canonical_name: name.clone(),
        local_name: name.repository(),
        remote_name: name.repository(),
    }
}

fn http_endpoint(server: &MockServer) -> Endpoint {
    Endpoint {
        url: server.uri().parse().unwrap(),
        version: ApiVersion::V2,
        mirror: false,
        official: false,
        tls: TlsConfig::default(),
    }
}

async fn mount_manifest(server: &MockServer, repository: &str, reference: &str, raw: Vec<u8>) {
    let manifest_path = format!("/v2/{}/manifests/{}", repository, reference);
    Mock::given(method("HEAD"))
        .and(path(manifest_path.clone()))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(manifest_path))
        .respond_with(ResponseTemplate::new(200).set_body_raw(raw, MANIFEST_TYPE))
        .mount(server)
        .await;
}

#[tokio::test]
async fn inspect_loopback_registry() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;
    mount_manifest(&server, "app", "1.0", manifest_bytes("1.0", 3)).await;

    // https is tried first and fails against a plain http server
    let config = InspectConfig::new(Arc::new(Service::new()), Arc::new(HttpTransport::new()));
    let name = ImageName::parse(&format!("{}/app:1.0", registry_name(&server))).unwrap();
    let record = reginspect::inspect(&name, &config).await.unwrap();

    assert_eq!(record.repo_tags, vec![format!("{}/app:1.0", registry_name(&server))]);
    assert_eq!(record.registry, registry_name(&server));
    assert_eq!(record.architecture, "amd64");
    assert_eq!(record.repo_digests.len(), 1);
}

#[tokio::test]
async fn official_mirror_answers_first() {
    let mirror = MockServer::start().await;
    mount_manifest(&mirror, "library/app", "1.0", manifest_bytes("1.0", 2)).await;

    let service = Service::builder().mirror(mirror.uri().parse().unwrap()).build();
    let config = InspectConfig::new(Arc::new(service), Arc::new(HttpTransport::new()));
    let record = reginspect::inspect(&ImageName::parse("app:1.0").unwrap(), &config)
        .await
        .unwrap();

    assert_eq!(record.repo_tags, vec!["docker.io/library/app:1.0"]);
    assert_eq!(record.registry, "docker.io");
    assert_eq!(record.repo_digests.len(), 1);
}

#[tokio::test]
async fn inspect_unknown_tag() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/v2/app/manifests/2.0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = InspectConfig::new(Arc::new(Service::new()), Arc::new(HttpTransport::new()));
    let name = ImageName::parse(&format!("{}/app:2.0", registry_name(&server))).unwrap();
    let err = reginspect::inspect(&name, &config).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "tag 2.0 does not exist in remote repository {}/app",
            registry_name(&server)
        )
    );
}

#[tokio::test]
async fn manifest_without_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/app/manifests/1.0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/app/manifests/2.0"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errors": [{"code": "MANIFEST_UNKNOWN", "message": "manifest unknown"}]
        })))
        .mount(&server)
        .await;

    let mut repo = HttpTransport::new()
        .v2_repository(&repo_info(&server), &http_endpoint(&server), &MetaHeaders::new(), None)
        .await
        .unwrap();
    assert!(repo.get_by_tag(&Tag::parse("1.0").unwrap()).await.unwrap().is_none());

    let err = repo.get_by_tag(&Tag::parse("2.0").unwrap()).await.unwrap_err();
    assert!(matches!(err, ImageError::RegistryErrors(ref list) if list[0].code == "MANIFEST_UNKNOWN"));
    assert!(err.continue_on_error());
}

#[tokio::test]
async fn bearer_token_challenge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("service", "registry.test"))
        .and(query_param("scope", "repository:app:pull"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "t0k3n"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/app/tags/list"))
        .and(header("Authorization", "Bearer t0k3n"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "app", "tags": ["1.0"]})))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/app/tags/list"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            format!(
                "Bearer realm=\"{}/token\",service=\"registry.test\",scope=\"repository:app:pull\"",
                server.uri()
            )
            .as_str(),
        ))
        .mount(&server)
        .await;

    let login = AuthConfig {
        username: "user".into(),
        password: "pass".into(),
        registry_token: None,
    };
    let mut repo = HttpTransport::new()
        .v2_repository(&repo_info(&server), &http_endpoint(&server), &MetaHeaders::new(), Some(&login))
        .await
        .unwrap();
    assert_eq!(repo.tags().await.unwrap(), vec!["1.0"]);
}

#[tokio::test]
async fn bare_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/app/tags/list"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut repo = HttpTransport::new()
        .v2_repository(&repo_info(&server), &http_endpoint(&server), &MetaHeaders::new(), None)
        .await
        .unwrap();
    let err = repo.tags().await.unwrap_err();
    assert!(matches!(err, ImageError::Registry(ref e) if e.code == "UNAUTHORIZED"));
    assert!(err.continue_on_error());
}

#[tokio::test]
async fn paginated_tags_with_meta_headers() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/app/tags/list"))
        .and(query_param("last", "b"))
        .and(header("X-Meta-Source", "tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "app", "tags": ["a"]})))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/app/tags/list"))
        .and(header("X-Meta-Source", "tests"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", "</v2/app/tags/list?n=2&last=b>; rel=\"next\"")
                .set_body_json(json!({"name": "app", "tags": ["latest", "b"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut meta = MetaHeaders::new();
    meta.insert("X-Meta-Source".into(), vec!["tests".into()]);
    let mut config =
        ListRemoteTagsConfig::new(Arc::new(Service::new()), Arc::new(HttpTransport::new()));
    config.meta_headers = meta;
    config.registries = vec![registry_name(&server)];

    // V1 endpoints come first, and find nothing at /v1/ on this server
    let list = reginspect::list_remote_tags(&ImageName::parse("app").unwrap(), &config)
        .await
        .unwrap();
    assert_eq!(list.name, format!("{}/app", registry_name(&server)));
    let tags: Vec<_> = list.tag_list.iter().map(|t| t.tag.as_str()).collect();
    assert_eq!(tags, vec!["a", "b", "latest"]);
}

#[tokio::test]
async fn malformed_link_ends_tag_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/app/tags/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", ">x<; rel=\"next\"")
                .set_body_json(json!({"name": "app", "tags": ["1.0"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut repo = HttpTransport::new()
        .v2_repository(&repo_info(&server), &http_endpoint(&server), &MetaHeaders::new(), None)
        .await
        .unwrap();
    assert_eq!(repo.tags().await.unwrap(), vec!["1.0"]);
}

#[tokio::test]
async fn cyclic_link_ends_tag_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/app/tags/list"))
        .and(query_param("last", "a"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", "</v2/app/tags/list>; rel=\"next\"")
                .set_body_json(json!({"name": "app", "tags": ["b"]})),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/app/tags/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", "</v2/app/tags/list?last=a>; rel=\"next\"")
                .set_body_json(json!({"name": "app", "tags": ["a"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut repo = HttpTransport::new()
        .v2_repository(&repo_info(&server), &http_endpoint(&server), &MetaHeaders::new(), None)
        .await
        .unwrap();
    assert_eq!(repo.tags().await.unwrap(), vec!["a", "b"]);
}
