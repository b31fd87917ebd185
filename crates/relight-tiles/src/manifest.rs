//! Lighting-map resolution from IIIF presentation manifests.
//!
//! A relightable canvas carries several image resources (albedo, normal,
//! depth, ...). Each one is tagged with a lighting-map service whose `mapType`
//! names the role of the image, next to the image service that serves its
//! tiles. Presentation API 3 (`items`/`body`) and 2 (`sequences`/`images`)
//! manifests are both read, including `Choice` bodies.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{TileError, TileResult};

/// Profiles under which the lighting-map service is published.
pub const LIGHTING_MAP_PROFILES: [&str; 2] = [
    "http://iiif.io/api/annex/services/lightingmap",
    "http://iiif.io/api/extension/lightingmap",
];

/// Role of an image resource on a relightable canvas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapType {
    Albedo,
    Normal,
    Depth,
    Shaded,
    Composite,
    Other(String),
}

impl MapType {
    /// Parse a `mapType` value. Unknown values are kept verbatim.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "albedo" => Self::Albedo,
            "normal" => Self::Normal,
            "depth" => Self::Depth,
            "shaded" => Self::Shaded,
            "composite" => Self::Composite,
            _ => Self::Other(value.trim().to_string()),
        }
    }

    /// The `mapType` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Albedo => "albedo",
            Self::Normal => "normal",
            Self::Depth => "depth",
            Self::Shaded => "shaded",
            Self::Composite => "composite",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for MapType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for MapType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// One image resource of a canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    /// Resource (body) id. Host layer ids use this.
    pub id: String,
    /// Lighting-map role, when the resource carries a lighting-map service.
    pub map_type: Option<MapType>,
    /// Image service id. `ImageService3` wins over `ImageService2`.
    pub service_id: Option<String>,
}

/// Albedo and normal image service ids of a canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightingMaps {
    pub albedo: String,
    pub normal: String,
}

impl LightingMaps {
    /// Find the albedo and normal services. `None` unless both resolve.
    #[must_use]
    pub fn resolve(resources: &[ImageResource]) -> Option<Self> {
        let albedo = service_for(resources, &MapType::Albedo)?;
        let normal = service_for(resources, &MapType::Normal)?;
        Some(Self { albedo, normal })
    }
}

fn service_for(resources: &[ImageResource], map_type: &MapType) -> Option<String> {
    resources
        .iter()
        .filter(|resource| resource.map_type.as_ref() == Some(map_type))
        .find_map(|resource| resource.service_id.clone())
}

/// Map of resource id to lighting-map role.
#[must_use]
pub fn layer_types(resources: &[ImageResource]) -> BTreeMap<String, MapType> {
    resources
        .iter()
        .filter_map(|resource| {
            resource
                .map_type
                .clone()
                .map(|map_type| (resource.id.clone(), map_type))
        })
        .collect()
}

/// Parse manifest bytes and extract the image resources of one canvas.
pub fn canvas_resources_from_json(
    bytes: &[u8],
    canvas_index: usize,
) -> TileResult<Vec<ImageResource>> {
    let manifest: Value = serde_json::from_slice(bytes)?;
    canvas_resources(&manifest, canvas_index)
}

/// Extract the image resources of canvas `canvas_index`.
pub fn canvas_resources(manifest: &Value, canvas_index: usize) -> TileResult<Vec<ImageResource>> {
    let canvases = canvases(manifest)
        .ok_or_else(|| TileError::MalformedManifest("no canvases".to_string()))?;
    let canvas = canvases.get(canvas_index).ok_or_else(|| {
        TileError::MalformedManifest(format!(
            "canvas {canvas_index} out of range ({} canvases)",
            canvases.len()
        ))
    })?;

    let mut bodies = Vec::new();
    if let Some(pages) = canvas.get("items").and_then(Value::as_array) {
        for annotation in pages
            .iter()
            .filter_map(|page| page.get("items").and_then(Value::as_array))
            .flatten()
        {
            if let Some(body) = annotation.get("body") {
                collect_bodies(body, &mut bodies);
            }
        }
    } else if let Some(images) = canvas.get("images").and_then(Value::as_array) {
        for image in images {
            if let Some(resource) = image.get("resource") {
                collect_bodies(resource, &mut bodies);
            }
        }
    }

    let resources: Vec<ImageResource> = bodies.into_iter().filter_map(image_resource).collect();
    tracing::debug!(
        "Canvas {} has {} image resources",
        canvas_index,
        resources.len()
    );
    Ok(resources)
}

fn canvases(manifest: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = manifest.get("items").and_then(Value::as_array) {
        return Some(items);
    }
    manifest
        .get("sequences")?
        .as_array()?
        .first()?
        .get("canvases")?
        .as_array()
}

/// Flatten `Choice` bodies, arrays and v2 `oa:Choice` resources.
fn collect_bodies<'a>(body: &'a Value, out: &mut Vec<&'a Value>) {
    if let Some(array) = body.as_array() {
        for item in array {
            collect_bodies(item, out);
        }
        return;
    }
    if matches!(type_of(body), Some("Choice" | "oa:Choice")) {
        if let Some(items) = body.get("items").and_then(Value::as_array) {
            for item in items {
                collect_bodies(item, out);
            }
        }
        if let Some(default) = body.get("default") {
            collect_bodies(default, out);
        }
        match body.get("item") {
            Some(Value::Array(items)) => items.iter().for_each(|item| collect_bodies(item, out)),
            Some(item) => collect_bodies(item, out),
            None => {}
        }
        return;
    }
    out.push(body);
}

fn image_resource(body: &Value) -> Option<ImageResource> {
    let id = id_of(body)?.to_string();
    let services = services_of(body);

    let map_type = services
        .iter()
        .find(|service| is_lighting_map(service))
        .and_then(|service| service.get("mapType"))
        .and_then(Value::as_str)
        .map(MapType::parse);

    let service_id = services
        .iter()
        .find(|service| type_of(service) == Some("ImageService3"))
        .or_else(|| {
            services
                .iter()
                .find(|service| type_of(service) == Some("ImageService2"))
        })
        .and_then(|service| id_of(service))
        .map(str::to_string);

    Some(ImageResource {
        id,
        map_type,
        service_id,
    })
}

fn services_of(body: &Value) -> Vec<&Value> {
    match body.get("service") {
        Some(Value::Array(services)) => services.iter().collect(),
        Some(service @ Value::Object(_)) => vec![service],
        _ => Vec::new(),
    }
}

fn is_lighting_map(service: &Value) -> bool {
    let matches = |value: &Value| {
        value
            .as_str()
            .is_some_and(|profile| LIGHTING_MAP_PROFILES.contains(&profile))
    };
    ["profile", "@context"].iter().any(|field| match service.get(*field) {
        Some(Value::Array(values)) => values.iter().any(matches),
        Some(value) => matches(value),
        None => false,
    })
}

fn id_of(value: &Value) -> Option<&str> {
    value
        .get("id")
        .or_else(|| value.get("@id"))
        .and_then(Value::as_str)
}

fn type_of(value: &Value) -> Option<&str> {
    value
        .get("type")
        .or_else(|| value.get("@type"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(id: &str, map_type: &str, services: Value) -> Value {
        let mut list = vec![json!({
            "@context": "http://iiif.io/api/annex/services/lightingmap/1/context.json",
            "profile": "http://iiif.io/api/annex/services/lightingmap",
            "mapType": map_type
        })];
        if let Value::Array(extra) = services {
            list.extend(extra);
        }
        json!({ "id": id, "type": "Image", "service": list })
    }

    fn manifest_v3(bodies: Vec<Value>) -> Value {
        json!({
            "type": "Manifest",
            "items": [{
                "id": "https://example.org/canvas/1",
                "type": "Canvas",
                "items": [{
                    "type": "AnnotationPage",
                    "items": [{
                        "type": "Annotation",
                        "motivation": "painting",
                        "body": { "type": "Choice", "items": bodies }
                    }]
                }]
            }]
        })
    }

    #[test]
    fn resolves_albedo_and_normal_services() {
        let manifest = manifest_v3(vec![
            body(
                "https://example.org/albedo.jpg",
                "albedo",
                json!([
                    { "@id": "https://example.org/iiif2/albedo", "@type": "ImageService2" },
                    { "id": "https://example.org/iiif3/albedo", "type": "ImageService3" }
                ]),
            ),
            body(
                "https://example.org/normal.jpg",
                "normal",
                json!([{ "@id": "https://example.org/iiif2/normal", "@type": "ImageService2" }]),
            ),
            body("https://example.org/depth.jpg", "depth", json!([])),
        ]);
        let resources = canvas_resources(&manifest, 0).unwrap();
        assert_eq!(resources.len(), 3);

        let maps = LightingMaps::resolve(&resources).unwrap();
        assert_eq!(maps.albedo, "https://example.org/iiif3/albedo");
        assert_eq!(maps.normal, "https://example.org/iiif2/normal");

        let layers = layer_types(&resources);
        assert_eq!(layers["https://example.org/depth.jpg"], MapType::Depth);
    }

    #[test]
    fn albedo_only_does_not_resolve() {
        let manifest = manifest_v3(vec![body(
            "https://example.org/albedo.jpg",
            "albedo",
            json!([{ "id": "https://example.org/iiif3/albedo", "type": "ImageService3" }]),
        )]);
        let resources = canvas_resources(&manifest, 0).unwrap();
        assert!(LightingMaps::resolve(&resources).is_none());
    }

    #[test]
    fn accepts_extension_profile_and_v2_manifests() {
        let manifest = json!({
            "@type": "sc:Manifest",
            "sequences": [{
                "canvases": [{
                    "images": [{
                        "resource": {
                            "@id": "https://example.org/normal.jpg",
                            "service": [
                                {
                                    "profile": ["http://iiif.io/api/extension/lightingmap"],
                                    "mapType": "Normal"
                                },
                                {
                                    "@id": "https://example.org/iiif2/normal",
                                    "@type": "ImageService2"
                                }
                            ]
                        }
                    }]
                }]
            }]
        });
        let resources = canvas_resources(&manifest, 0).unwrap();
        assert_eq!(resources[0].map_type, Some(MapType::Normal));
        assert_eq!(
            resources[0].service_id.as_deref(),
            Some("https://example.org/iiif2/normal")
        );
    }

    #[test]
    fn missing_canvas_is_malformed() {
        let manifest = manifest_v3(Vec::new());
        assert!(matches!(
            canvas_resources(&manifest, 3),
            Err(TileError::MalformedManifest(_))
        ));
        assert!(matches!(
            canvas_resources(&json!({}), 0),
            Err(TileError::MalformedManifest(_))
        ));
        assert!(canvas_resources_from_json(b"not json", 0).is_err());
    }

    #[test]
    fn map_type_parsing_is_case_insensitive() {
        assert_eq!(MapType::parse(" Albedo "), MapType::Albedo);
        assert_eq!(MapType::parse("specular"), MapType::Other("specular".into()));
        assert_eq!(MapType::Composite.to_string(), "composite");
    }
}
