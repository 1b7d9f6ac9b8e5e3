//! Builder for constructing fake clientsets with various options

use crate::clientset::FakeClientset;
use crate::fake::Fake;
use crate::reactor::{Reactor, ReactorChain};
use crate::tracker::{ObjectTracker, GVR};
use crate::utils::{extract_gvk, extract_namespace, pluralize};
use crate::watch::{Broadcaster, DEFAULT_WATCH_CAPACITY};
use crate::{Error, Result};
use kube::Resource;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Builder for fake clientsets
///
/// Provides a fluent API for:
/// - Seed objects (typed, raw JSON or YAML fixtures)
/// - Reactors installed before the first action
/// - Watch buffer capacity
/// - Disabling the default tracker reaction
///
/// Seed objects are written straight into the tracker and are not recorded
/// as actions.
///
/// # Example
///
/// ```rust
/// use kube_fake_clientset::FakeBuilder;
/// use k8s_openapi::api::core::v1::Pod;
///
/// let mut pod = Pod::default();
/// pod.metadata.name = Some("web-0".to_string());
/// pod.metadata.namespace = Some("default".to_string());
///
/// let clientset = FakeBuilder::new()
///     .with_object(pod)
///     .with_watch_capacity(16)
///     .build()
///     .unwrap();
///
/// let pods = clientset.namespaced::<Pod>("default");
/// assert!(pods.get("web-0").is_ok());
/// assert_eq!(clientset.actions().len(), 1);
/// ```
pub struct FakeBuilder {
    initial_objects: Vec<(GVR, Value)>,
    reactors: ReactorChain,
    watch_capacity: usize,
    default_reactor: bool,
    fixture_dir: Option<PathBuf>,
    deferred_error: Option<Error>,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self {
            initial_objects: Vec::new(),
            reactors: ReactorChain::new(),
            watch_capacity: DEFAULT_WATCH_CAPACITY,
            default_reactor: true,
            fixture_dir: None,
            deferred_error: None,
        }
    }

    /// Seed one typed object
    pub fn with_object<K>(mut self, obj: K) -> Self
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let gvr = GVR::new(K::group(&()), K::version(&()), K::plural(&()));
        match serde_json::to_value(&obj) {
            Ok(value) => self.initial_objects.push((gvr, value)),
            Err(e) => self.defer(e.into()),
        }
        self
    }

    pub fn with_objects<K>(mut self, objects: impl IntoIterator<Item = K>) -> Self
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        for obj in objects {
            self = self.with_object(obj);
        }
        self
    }

    /// Seed raw JSON objects; the resource is derived from `apiVersion` and a pluralized `kind`
    pub fn with_runtime_objects(mut self, objects: impl IntoIterator<Item = Value>) -> Self {
        for value in objects {
            match extract_gvk(&value) {
                Ok(gvk) => {
                    let gvr = GVR::new(gvk.group, gvk.version, pluralize(&gvk.kind));
                    self.initial_objects.push((gvr, value));
                }
                Err(e) => self.defer(e),
            }
        }
        self
    }

    /// Append a reactor to the chain
    pub fn with_reactor(mut self, reactor: Reactor) -> Self {
        self.reactors.append(reactor);
        self
    }

    /// Put a reactor in front of every reactor registered so far
    pub fn with_prepended_reactor(mut self, reactor: Reactor) -> Self {
        self.reactors.prepend(reactor);
        self
    }

    /// Buffered events per watch subscriber before it is terminated
    pub fn with_watch_capacity(mut self, capacity: usize) -> Self {
        self.watch_capacity = capacity;
        self
    }

    /// Fail actions no reactor handled with `Unsupported` instead of applying them to the tracker
    pub fn without_default_reactor(mut self) -> Self {
        self.default_reactor = false;
        self
    }

    /// Set the fixture directory for loading YAML fixtures
    ///
    /// This directory will be used as the base path for `load_fixture` calls.
    pub fn with_fixture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixture_dir = Some(dir.into());
        self
    }

    /// Load objects from a YAML fixture file
    ///
    /// Supports both single-document and multi-document YAML files (separated by `---`).
    /// Objects without `metadata.namespace` are stored cluster-scoped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the YAML cannot be parsed,
    /// or a document lacks `apiVersion`/`kind`.
    pub fn load_fixture(self, path: impl AsRef<Path>) -> Result<Self> {
        let fixture_path = match &self.fixture_dir {
            Some(dir) => dir.join(path),
            None => path.as_ref().to_path_buf(),
        };

        let content = std::fs::read_to_string(&fixture_path).map_err(|e| {
            Error::Internal(format!(
                "Failed to read fixture file {:?}: {}",
                fixture_path, e
            ))
        })?;

        use serde::Deserialize;
        let mut objects = Vec::new();
        for document in serde_yaml::Deserializer::from_str(&content) {
            let value = Value::deserialize(document).map_err(|e| {
                Error::Invalid(format!("Failed to parse YAML in {:?}: {}", fixture_path, e))
            })?;
            if value.is_null() {
                continue;
            }
            extract_gvk(&value)?;
            objects.push(value);
        }

        debug!("Loaded {} objects from {:?}", objects.len(), fixture_path);
        Ok(self.with_runtime_objects(objects))
    }

    pub fn load_fixtures<P>(mut self, paths: impl IntoIterator<Item = P>) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        for path in paths {
            self = self.load_fixture(path)?;
        }
        Ok(self)
    }

    /// Load objects from a YAML fixture file, panicking on error
    ///
    /// # Panics
    ///
    /// Panics if the fixture file cannot be loaded or parsed.
    pub fn load_fixture_or_panic(self, path: impl AsRef<Path>) -> Self {
        self.load_fixture(path).expect("Failed to load fixture")
    }

    /// Build the clientset and seed the tracker
    ///
    /// # Errors
    ///
    /// Returns the first error met while collecting or storing seed objects,
    /// e.g. `AlreadyExists` for two seeds with the same key.
    pub fn build(self) -> Result<FakeClientset> {
        if let Some(e) = self.deferred_error {
            return Err(e);
        }

        let tracker = Arc::new(ObjectTracker::with_broadcaster(Broadcaster::new(
            self.watch_capacity,
        )));

        for (gvr, obj) in self.initial_objects {
            let gvk = extract_gvk(&obj)?;
            let namespace = extract_namespace(&obj);
            tracker.add(&gvr, &gvk, obj, &namespace)?;
        }

        let fake = Fake::with_reactors(tracker, self.reactors, self.default_reactor);
        Ok(FakeClientset::from_fake(Arc::new(fake)))
    }

    fn defer(&mut self, e: Error) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(e);
        }
    }
}

impl Default for FakeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
