//! Image documents shared by the integration tests
#![allow(dead_code)]

use serde_json::json;

pub fn layer_id(n: u8) -> String {
    format!("{:064x}", n)
}

/// Legacy image JSON for layer `n`
pub fn v1_json(n: u8, parent: Option<u8>, throwaway: bool) -> String {
    let mut image = json!({
        "id": layer_id(n),
        "created": "2016-03-04T21:23:56.123456789Z",
        "container_config": {"Cmd": ["/bin/sh", "-c", format!("step {}", n)]},
        "docker_version": "1.10.3",
        "architecture": "amd64",
        "os": "linux",
        "Size": 42,
    });
    if let Some(parent) = parent {
        image["parent"] = json!(layer_id(parent));
    }
    if throwaway {
        image["throwaway"] = json!(true);
    }
    image.to_string()
}

/// Unsigned schema1 manifest with a linear chain of `count` layers
pub fn manifest_bytes(tag: &str, count: u8) -> Vec<u8> {
    let history: Vec<_> = (0..count)
        .rev()
        .map(|n| {
            let parent = if n == 0 { None } else { Some(n - 1) };
            json!({ "v1Compatibility": v1_json(n, parent, false) })
        })
        .collect();
    let layers: Vec<_> = (0..count)
        .map(|n| json!({ "blobSum": format!("sha256:{:064x}", 200 + n as u32) }))
        .collect();
    serde_json::to_vec(&json!({
        "schemaVersion": 1,
        "name": "app",
        "tag": tag,
        "architecture": "amd64",
        "fsLayers": layers,
        "history": history,
    }))
    .unwrap()
}
