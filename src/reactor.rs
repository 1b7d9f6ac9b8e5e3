//! Reactors intercept recorded actions before they reach the object tracker
//!
//! A reactor pairs a `(verb, resource)` predicate with a reaction. The chain
//! is one explicit ordered list evaluated front to back:
//! - `prepend` inserts at the front, `append` pushes to the back
//! - the first matching reactor that returns `Ok(Some(reply))` or `Err(e)`
//!   decides the outcome
//! - a reactor returning `Ok(None)` defers to the next matching one
//! - when every matching reactor deferred, the default tracker reaction runs
//!
//! # Example
//! ```
//! use kube_fake_clientset::{Error, Reactor};
//!
//! let reactor = Reactor::new("create", "widgets", |ctx| {
//!     if ctx.action.name() == Some("forbidden") {
//!         return Err(Error::Invalid("forbidden name".into()));
//!     }
//!     Ok(None)
//! });
//! ```

use crate::action::{Action, ActionPayload, PatchType, Verb};
use crate::selector::ObjectFilter;
use crate::tracker::ObjectTracker;
use crate::utils::{extract_gvk, extract_namespace, object_meta};
use crate::watch::Subscription;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// What a reaction answers with
#[derive(Debug)]
pub enum Reply {
    Object(Value),
    List(Vec<Value>),
    Watch(Subscription),
}

impl Reply {
    pub fn object<T: Serialize>(object: &T) -> Result<Self> {
        Ok(Reply::Object(serde_json::to_value(object)?))
    }

    pub fn list<T: Serialize>(objects: &[T]) -> Result<Self> {
        let values = objects
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Reply::List(values))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Reply::Object(_) => "object",
            Reply::List(_) => "list",
            Reply::Watch(_) => "watch",
        }
    }
}

/// Context passed to reactions
pub struct ReactionContext<'a> {
    pub action: &'a Action,
    /// The fake's store, for reactions that want to read or seed state directly
    pub tracker: &'a ObjectTracker,
}

/// Return `Ok(Some(reply))` to answer, `Ok(None)` to defer, or `Err(e)` to fail the action.
pub type ReactionFunc = Arc<dyn Fn(ReactionContext) -> Result<Option<Reply>> + Send + Sync>;

#[derive(Clone)]
pub struct Reactor {
    verb: String,
    resource: String,
    reaction: ReactionFunc,
}

impl Reactor {
    /// `verb` and `resource` accept `"*"` as a wildcard
    pub fn new<F>(verb: impl Into<String>, resource: impl Into<String>, reaction: F) -> Self
    where
        F: Fn(ReactionContext) -> Result<Option<Reply>> + Send + Sync + 'static,
    {
        Self {
            verb: verb.into(),
            resource: resource.into(),
            reaction: Arc::new(reaction),
        }
    }

    pub fn handles(&self, action: &Action) -> bool {
        action.matches(&self.verb, &self.resource)
    }

    pub fn react(&self, ctx: ReactionContext) -> Result<Option<Reply>> {
        (self.reaction)(ctx)
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("verb", &self.verb)
            .field("resource", &self.resource)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReactorChain {
    reactors: Vec<Reactor>,
}

impl ReactorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepend(&mut self, reactor: Reactor) {
        self.reactors.insert(0, reactor);
    }

    pub fn append(&mut self, reactor: Reactor) {
        self.reactors.push(reactor);
    }

    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
    }

    /// Run matching reactors in order; `None` when all of them deferred
    pub fn react(&self, action: &Action, tracker: &ObjectTracker) -> Option<Result<Reply>> {
        for (position, reactor) in self.reactors.iter().enumerate() {
            if !reactor.handles(action) {
                continue;
            }
            trace!("reactor {} ({:?}) evaluating {}", position, reactor, action);
            match reactor.react(ReactionContext { action, tracker }) {
                Ok(Some(reply)) => return Some(Ok(reply)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Verb semantics applied directly to the object tracker
pub fn default_reaction(tracker: &ObjectTracker, action: &Action) -> Result<Reply> {
    let gvr = action.resource();
    let namespace = action.namespace();

    match (action.verb(), action.payload()) {
        (Verb::Get, ActionPayload::Name(name)) => {
            tracker.get(gvr, namespace, name).map(Reply::Object)
        }
        (Verb::List, ActionPayload::Selector(options)) => {
            let filter = ObjectFilter::new(
                options.label_selector.as_deref(),
                options.field_selector.as_deref(),
            )?;
            tracker.list(gvr, namespace, &filter).map(Reply::List)
        }
        (Verb::Watch, ActionPayload::Selector(options)) => {
            let filter = ObjectFilter::new(
                options.label_selector.as_deref(),
                options.field_selector.as_deref(),
            )?;
            Ok(Reply::Watch(tracker.watch(gvr, namespace, filter)))
        }
        (Verb::Create, ActionPayload::Object(object)) => {
            if action.subresource().is_some() {
                return Err(Error::Unsupported(format!(
                    "create on subresource {:?}",
                    action.subresource()
                )));
            }
            let gvk = extract_gvk(object)?;
            tracker.add(gvr, &gvk, object.clone(), namespace).map(Reply::Object)
        }
        (Verb::Update, ActionPayload::Object(object)) => {
            let gvk = extract_gvk(object)?;
            let replacement = match action.subresource() {
                None => object.clone(),
                Some("status") => {
                    let name = action
                        .name()
                        .ok_or_else(|| Error::Invalid("Object name is required".to_string()))?;
                    let stored_in = match namespace {
                        "" => extract_namespace(object),
                        ns => ns.to_string(),
                    };
                    let existing = tracker.get(gvr, &stored_in, name)?;
                    with_status_from(existing, object)?
                }
                Some(other) => {
                    return Err(Error::Unsupported(format!("update on subresource {}", other)))
                }
            };
            tracker
                .update(gvr, &gvk, replacement, namespace)
                .map(Reply::Object)
        }
        (
            Verb::Patch,
            ActionPayload::Patch {
                name,
                patch_type,
                patch,
            },
        ) => {
            let existing = tracker.get(gvr, namespace, name)?;
            let mut patched = existing.clone();
            match patch_type {
                PatchType::Json => {
                    let operations: json_patch::Patch = serde_json::from_value(patch.clone())
                        .map_err(|e| Error::Invalid(format!("malformed JSON patch: {}", e)))?;
                    json_patch::patch(&mut patched, &operations)
                        .map_err(|e| Error::Invalid(format!("JSON patch failed: {}", e)))?;
                }
                PatchType::Merge | PatchType::Strategic => json_patch::merge(&mut patched, patch),
                PatchType::Apply => {
                    return Err(Error::Unsupported("server-side apply patches".to_string()))
                }
            }

            let patched_name = object_meta(&patched)?.name;
            if patched_name.as_deref() != Some(name.as_str()) {
                return Err(Error::Invalid(format!(
                    "patch may not change the object name {}",
                    name
                )));
            }

            let replacement = match action.subresource() {
                None => patched,
                Some("status") => with_status_from(existing.clone(), &patched)?,
                Some(other) => {
                    return Err(Error::Unsupported(format!("patch on subresource {}", other)))
                }
            };
            let gvk = extract_gvk(&existing)?;
            tracker
                .update(gvr, &gvk, replacement, namespace)
                .map(Reply::Object)
        }
        (
            Verb::Delete,
            ActionPayload::Delete {
                name,
                preconditions,
            },
        ) => {
            if preconditions.resource_version.is_some() || preconditions.uid.is_some() {
                let existing = object_meta(&tracker.get(gvr, namespace, name)?)?;
                if let Some(rv) = &preconditions.resource_version {
                    if existing.resource_version.as_ref() != Some(rv) {
                        return Err(Error::Conflict(format!(
                            "precondition failed for {}/{}: resourceVersion {} does not match {:?}",
                            namespace, name, rv, existing.resource_version
                        )));
                    }
                }
                if let Some(uid) = &preconditions.uid {
                    if existing.uid.as_ref() != Some(uid) {
                        return Err(Error::Conflict(format!(
                            "precondition failed for {}/{}: uid {} does not match {:?}",
                            namespace, name, uid, existing.uid
                        )));
                    }
                }
            }
            tracker.delete(gvr, namespace, name).map(Reply::Object)
        }
        (Verb::DeleteCollection, ActionPayload::Selector(options)) => {
            let filter = ObjectFilter::new(
                options.label_selector.as_deref(),
                options.field_selector.as_deref(),
            )?;
            let mut deleted = Vec::new();
            for object in tracker.list(gvr, namespace, &filter)? {
                let meta = object_meta(&object)?;
                let name = meta.name.unwrap_or_default();
                let object_namespace = meta.namespace.unwrap_or_default();
                deleted.push(tracker.delete(gvr, &object_namespace, &name)?);
            }
            Ok(Reply::List(deleted))
        }
        (verb, payload) => Err(Error::Invalid(format!(
            "{} action carries an unexpected payload: {:?}",
            verb, payload
        ))),
    }
}

/// Keep everything from `base` except `status` and the resource version,
/// which come from `source` so the tracker's conflict check still applies.
fn with_status_from(mut base: Value, source: &Value) -> Result<Value> {
    let fields = base
        .as_object_mut()
        .ok_or_else(|| Error::Invalid("object payload must be a JSON object".to_string()))?;
    match source.get("status") {
        Some(status) => {
            fields.insert("status".to_string(), status.clone());
        }
        None => {
            fields.remove("status");
        }
    }

    let rv = source
        .get("metadata")
        .and_then(|m| m.get("resourceVersion"))
        .cloned();
    if let Some(metadata) = fields.get_mut("metadata").and_then(Value::as_object_mut) {
        match rv {
            Some(rv) => {
                metadata.insert("resourceVersion".to_string(), rv);
            }
            None => {
                metadata.remove("resourceVersion");
            }
        }
    }
    Ok(base)
}
