//! Recorded operations and the append-only history tests assert against

use crate::tracker::GVR;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Patch,
    Delete,
    DeleteCollection,
    Watch,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
            Verb::DeleteCollection => "delete-collection",
            Verb::Watch => "watch",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchType {
    /// RFC 6902 JSON Patch
    Json,
    /// RFC 7386 JSON Merge Patch
    Merge,
    /// Strategic merge; applied as a merge patch
    Strategic,
    /// Server-side apply
    Apply,
}

/// Label and field selection carried by list, watch and delete-collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub resource_version: Option<String>,
    pub uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    /// Get
    Name(String),
    /// Create and update
    Object(Value),
    Patch {
        name: String,
        patch_type: PatchType,
        patch: Value,
    },
    Delete {
        name: String,
        preconditions: Preconditions,
    },
    /// List, watch and delete-collection
    Selector(ListOptions),
}

/// An operation about to be recorded; the history assigns its sequence number
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub verb: Verb,
    pub resource: GVR,
    pub namespace: String,
    pub subresource: Option<String>,
    pub payload: ActionPayload,
}

impl ActionRequest {
    pub fn new(verb: Verb, resource: GVR, namespace: impl Into<String>, payload: ActionPayload) -> Self {
        Self {
            verb,
            resource,
            namespace: namespace.into(),
            subresource: None,
            payload,
        }
    }

    pub fn with_subresource(mut self, subresource: impl Into<String>) -> Self {
        self.subresource = Some(subresource.into());
        self
    }
}

/// One recorded operation; immutable once recorded
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    seq: u64,
    verb: Verb,
    resource: GVR,
    namespace: String,
    subresource: Option<String>,
    payload: ActionPayload,
}

impl Action {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn resource(&self) -> &GVR {
        &self.resource
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn subresource(&self) -> Option<&str> {
        self.subresource.as_deref()
    }

    pub fn payload(&self) -> &ActionPayload {
        &self.payload
    }

    /// `"*"` matches any verb or resource
    pub fn matches(&self, verb: &str, resource: &str) -> bool {
        (verb == "*" || verb == self.verb.as_str())
            && (resource == "*" || resource == self.resource.resource)
    }

    /// Name of the targeted object, when the action addresses a single one
    pub fn name(&self) -> Option<&str> {
        match &self.payload {
            ActionPayload::Name(name)
            | ActionPayload::Patch { name, .. }
            | ActionPayload::Delete { name, .. } => Some(name),
            ActionPayload::Object(object) => object
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(|n| n.as_str()),
            ActionPayload::Selector(_) => None,
        }
    }

    pub fn object(&self) -> Option<&Value> {
        match &self.payload {
            ActionPayload::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn list_options(&self) -> Option<&ListOptions> {
        match &self.payload {
            ActionPayload::Selector(options) => Some(options),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.seq, self.verb, self.resource)?;
        if let Some(sub) = &self.subresource {
            write!(f, "/{}", sub)?;
        }
        if !self.namespace.is_empty() {
            write!(f, " -n {}", self.namespace)?;
        }
        if let Some(name) = self.name() {
            write!(f, " {}", name)?;
        }
        Ok(())
    }
}

/// Append-only record of invoked operations
#[derive(Debug)]
pub struct ActionHistory {
    actions: Vec<Action>,
    next_seq: u64,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            next_seq: 1,
        }
    }

    /// Append the request with the next sequence number and return the recorded action
    pub fn record(&mut self, request: ActionRequest) -> Action {
        let action = Action {
            seq: self.next_seq,
            verb: request.verb,
            resource: request.resource,
            namespace: request.namespace,
            subresource: request.subresource,
            payload: request.payload,
        };
        self.next_seq += 1;
        self.actions.push(action.clone());
        action
    }

    pub fn snapshot(&self) -> Vec<Action> {
        self.actions.clone()
    }

    /// Forget recorded actions; sequence numbers keep counting
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::new()
    }
}
