use crate::selector::ObjectFilter;
use crate::utils::{ensure_metadata, ensure_type_meta, object_meta, resolve_name, set_object_meta};
use crate::watch::{BucketState, Broadcaster, EventType, Subscription, WatchEvent};
use crate::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GVR {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GVR {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

impl std::fmt::Display for GVR {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GVK {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GVK {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Unique identity of one stored object; namespace is empty for cluster-scoped kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub resource: GVR,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(resource: &GVR, namespace: &str, name: &str) -> Self {
        Self {
            resource: resource.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    fn not_found(&self) -> Error {
        Error::NotFound {
            kind: self.resource.resource.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }

    fn already_exists(&self) -> Error {
        Error::AlreadyExists {
            kind: self.resource.resource.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Value,
    resource_version: u64,
}

/// (namespace, name) ordered so listings come out sorted by name within a namespace
type ObjectsByResource = BTreeMap<(String, String), StoredObject>;
type ObjectStorage = HashMap<GVR, ObjectsByResource>;

/// In-memory store of objects that emits a watch event for every committed mutation
///
/// Callers always receive copies; nothing hands out references into the
/// store. Each mutation checks and writes under one write lock, then hands
/// over to the delivery lock before releasing it, so events leave in commit
/// order and only after the change is visible to readers.
pub struct ObjectTracker {
    objects: RwLock<ObjectStorage>,
    delivery: Mutex<()>,
    broadcaster: Broadcaster,
}

impl ObjectTracker {
    pub fn new() -> Self {
        Self::with_broadcaster(Broadcaster::default())
    }

    pub fn with_broadcaster(broadcaster: Broadcaster) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            delivery: Mutex::new(()),
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn watch_state(&self, gvr: &GVR, namespace: &str) -> BucketState {
        self.broadcaster.state(gvr, namespace)
    }

    /// Store a new object and assign its first resource version
    ///
    /// Any resource version supplied by the caller is replaced. An empty
    /// name is generated from `metadata.generateName` when present.
    pub fn add(&self, gvr: &GVR, gvk: &GVK, mut object: Value, namespace: &str) -> Result<Value> {
        trace!("Adding object: {} in namespace: {}", gvr, namespace);

        let mut meta = object_meta(&object)?;
        let name = resolve_name(&mut meta)?;
        let target = target_namespace(&meta, namespace)?;
        let namespace = target.as_str();

        let key = ObjectKey::new(gvr, namespace, &name);
        meta.resource_version = Some("1".to_string());
        ensure_metadata(&mut meta, namespace);
        set_object_meta(&mut object, &meta)?;
        ensure_type_meta(&mut object, gvk)?;

        let mut objects = self.write_objects();
        let by_resource = objects.entry(gvr.clone()).or_default();
        let slot = (key.namespace.clone(), key.name.clone());
        if by_resource.contains_key(&slot) {
            return Err(key.already_exists());
        }
        by_resource.insert(
            slot,
            StoredObject {
                data: object.clone(),
                resource_version: 1,
            },
        );

        debug!("Added object: {}/{} rv=1", namespace, name);
        self.commit(objects, &key, EventType::Added, &object, 1);
        Ok(object)
    }

    pub fn get(&self, gvr: &GVR, namespace: &str, name: &str) -> Result<Value> {
        trace!("Getting object: {} {}/{}", gvr, namespace, name);

        let key = ObjectKey::new(gvr, namespace, name);
        let objects = self.read_objects();
        objects
            .get(gvr)
            .and_then(|by_resource| by_resource.get(&(key.namespace.clone(), key.name.clone())))
            .map(|stored| stored.data.clone())
            .ok_or_else(|| key.not_found())
    }

    /// Snapshot of the matching objects ordered by name
    ///
    /// An empty namespace lists across all namespaces.
    pub fn list(&self, gvr: &GVR, namespace: &str, filter: &ObjectFilter) -> Result<Vec<Value>> {
        trace!("Listing objects: {} in namespace: {:?}", gvr, namespace);

        let mut result: Vec<(String, String, Value)> = {
            let objects = self.read_objects();
            objects
                .get(gvr)
                .map(|by_resource| {
                    by_resource
                        .iter()
                        .filter(|((ns, _), _)| namespace.is_empty() || ns == namespace)
                        .filter(|(_, stored)| filter.matches(&stored.data))
                        .map(|((ns, name), stored)| (name.clone(), ns.clone(), stored.data.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        result.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        Ok(result.into_iter().map(|(_, _, data)| data).collect())
    }

    /// Replace a stored object
    ///
    /// A non-empty caller resource version must equal the stored one,
    /// otherwise the update fails with `Conflict`. The uid and creation
    /// timestamp of the stored object are preserved.
    pub fn update(&self, gvr: &GVR, gvk: &GVK, mut object: Value, namespace: &str) -> Result<Value> {
        trace!("Updating object: {} in namespace: {}", gvr, namespace);

        let mut meta = object_meta(&object)?;
        let name = meta
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Invalid("Object name is required".to_string()))?;
        let target = target_namespace(&meta, namespace)?;
        let namespace = target.as_str();
        let key = ObjectKey::new(gvr, namespace, &name);
        let slot = (key.namespace.clone(), key.name.clone());

        let mut objects = self.write_objects();
        let existing = objects
            .get(gvr)
            .and_then(|by_resource| by_resource.get(&slot))
            .ok_or_else(|| key.not_found())?;

        let current_rv = existing.resource_version;
        if let Some(provided) = meta.resource_version.as_deref().filter(|rv| !rv.is_empty()) {
            if provided != current_rv.to_string() {
                return Err(Error::Conflict(format!(
                    "Resource version mismatch for {}/{}: expected {}, got {}",
                    namespace, name, current_rv, provided
                )));
            }
        }

        let existing_meta = object_meta(&existing.data)?;
        let next_rv = current_rv + 1;
        meta.resource_version = Some(next_rv.to_string());
        meta.uid = existing_meta.uid;
        meta.creation_timestamp = existing_meta.creation_timestamp;
        ensure_metadata(&mut meta, namespace);
        set_object_meta(&mut object, &meta)?;
        ensure_type_meta(&mut object, gvk)?;

        if let Some(by_resource) = objects.get_mut(gvr) {
            by_resource.insert(
                slot,
                StoredObject {
                    data: object.clone(),
                    resource_version: next_rv,
                },
            );
        }

        debug!("Updated object: {}/{} rv={}", namespace, name, next_rv);
        self.commit(objects, &key, EventType::Modified, &object, next_rv);
        Ok(object)
    }

    /// Remove an object and return the removed copy
    pub fn delete(&self, gvr: &GVR, namespace: &str, name: &str) -> Result<Value> {
        trace!("Deleting object: {} {}/{}", gvr, namespace, name);

        let key = ObjectKey::new(gvr, namespace, name);
        let mut objects = self.write_objects();
        let by_resource = objects.get_mut(gvr).ok_or_else(|| key.not_found())?;
        let stored = by_resource
            .remove(&(key.namespace.clone(), key.name.clone()))
            .ok_or_else(|| key.not_found())?;
        if by_resource.is_empty() {
            objects.remove(gvr);
        }

        debug!("Deleted object: {}/{}", namespace, name);
        self.commit(
            objects,
            &key,
            EventType::Deleted,
            &stored.data,
            stored.resource_version,
        );
        Ok(stored.data)
    }

    /// Subscribe to future changes of `gvr` in `namespace` (empty for all namespaces)
    pub fn watch(&self, gvr: &GVR, namespace: &str, filter: ObjectFilter) -> Subscription {
        trace!("Watching objects: {} in namespace: {:?}", gvr, namespace);
        self.broadcaster.subscribe(gvr, namespace, filter)
    }

    /// Release the store and publish the committed change
    fn commit(
        &self,
        objects: RwLockWriteGuard<'_, ObjectStorage>,
        key: &ObjectKey,
        event_type: EventType,
        object: &Value,
        resource_version: u64,
    ) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        drop(objects);
        self.broadcaster.publish(
            &key.resource,
            &key.namespace,
            WatchEvent {
                event_type,
                object: object.clone(),
                resource_version,
            },
        );
    }

    fn read_objects(&self) -> RwLockReadGuard<'_, ObjectStorage> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_objects(&self) -> RwLockWriteGuard<'_, ObjectStorage> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Namespace an incoming object is stored under
///
/// An empty request namespace defers to the object's own namespace. A
/// non-empty request namespace must agree with any namespace on the object.
fn target_namespace(meta: &ObjectMeta, namespace: &str) -> Result<String> {
    match meta.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        Some(own) if namespace.is_empty() => Ok(own.to_string()),
        Some(own) if own != namespace => Err(Error::Invalid(format!(
            "the namespace of the object ({}) does not match the namespace on the request ({})",
            own, namespace
        ))),
        _ => Ok(namespace.to_string()),
    }
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new()
    }
}
