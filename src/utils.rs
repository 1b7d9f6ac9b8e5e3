use crate::tracker::GVK;
use crate::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde_json::Value;

/// Length of the random suffix appended to `metadata.generateName`.
const GENERATED_SUFFIX_LEN: usize = 5;

pub fn object_meta(object: &Value) -> Result<ObjectMeta> {
    let meta_value = object
        .get("metadata")
        .ok_or_else(|| Error::Invalid("object is missing metadata".to_string()))?;

    serde_json::from_value(meta_value.clone())
        .map_err(|e| Error::Invalid(format!("malformed metadata: {}", e)))
}

pub fn set_object_meta(object: &mut Value, meta: &ObjectMeta) -> Result<()> {
    let fields = object
        .as_object_mut()
        .ok_or_else(|| Error::Invalid("object payload must be a JSON object".to_string()))?;
    fields.insert("metadata".to_string(), serde_json::to_value(meta)?);
    Ok(())
}

/// Fill in `apiVersion` and `kind` when the payload does not carry them.
pub fn ensure_type_meta(object: &mut Value, gvk: &GVK) -> Result<()> {
    let fields = object
        .as_object_mut()
        .ok_or_else(|| Error::Invalid("object payload must be a JSON object".to_string()))?;
    fields
        .entry("apiVersion")
        .or_insert_with(|| Value::String(gvk.api_version()));
    fields
        .entry("kind")
        .or_insert_with(|| Value::String(gvk.kind.clone()));
    Ok(())
}

pub fn ensure_metadata(meta: &mut ObjectMeta, namespace: &str) {
    // Cluster-scoped objects never carry a namespace
    if namespace.is_empty() {
        meta.namespace = None;
    } else {
        meta.namespace = Some(namespace.to_string());
    }
    if meta.creation_timestamp.is_none() {
        meta.creation_timestamp = now();
    }
    if meta.uid.is_none() {
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
    }
}

fn now() -> Option<Time> {
    serde_json::from_value(Value::String(
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    ))
    .ok()
}

/// Resolve the object name, expanding `generateName` when no name was given.
pub fn resolve_name(meta: &mut ObjectMeta) -> Result<String> {
    if let Some(name) = meta.name.as_ref().filter(|n| !n.is_empty()) {
        return Ok(name.clone());
    }
    match meta.generate_name.as_ref().filter(|p| !p.is_empty()) {
        Some(prefix) => {
            let name = generate_name(prefix);
            meta.name = Some(name.clone());
            Ok(name)
        }
        None => Err(Error::Invalid(
            "name or generateName is required".to_string(),
        )),
    }
}

pub fn generate_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &suffix[..GENERATED_SUFFIX_LEN])
}

/// Pluralize a Kubernetes Kind name to its resource plural form.
///
/// Implementation copied from kube-rs to ensure consistency with the broader ecosystem.
/// See: <https://github.com/kube-rs/kube/blob/main/kube-core/src/discovery.rs>
///
/// Copyright (c) kube-rs contributors
/// Licensed under Apache-2.0
pub fn pluralize(kind: &str) -> String {
    let word = kind.to_ascii_lowercase();

    if word == "endpoints" || word == "endpointslices" {
        return word;
    } else if word == "nodemetrics" {
        return "nodes".to_string();
    } else if word == "podmetrics" {
        return "pods".to_string();
    }

    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }

    if word.ends_with('y') {
        if let Some(c) = word.chars().rev().nth(1) {
            if !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u') {
                let mut chars = word.chars();
                chars.next_back();
                return format!("{}ies", chars.as_str());
            }
        }
    }

    format!("{word}s")
}

pub fn extract_gvk(value: &Value) -> Result<GVK> {
    let api_version = value
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Invalid("Missing apiVersion".to_string()))?;

    let kind = value
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Invalid("Missing kind".to_string()))?;

    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };

    Ok(GVK::new(group, version, kind))
}

pub fn extract_namespace(value: &Value) -> String {
    value
        .get("metadata")
        .and_then(|m| m.get("namespace"))
        .and_then(|n| n.as_str())
        .unwrap_or_default()
        .to_string()
}
