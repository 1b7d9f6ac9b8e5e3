//! Typed resource clients over the type-erased fake
//!
//! A `ResourceClient<K>` only converts between `K` and JSON; every verb is
//! recorded and answered by the shared [`Fake`].

use crate::action::{ActionPayload, ActionRequest, ListOptions, PatchType, Preconditions, Verb};
use crate::fake::Fake;
use crate::reactor::Reply;
use crate::tracker::GVR;
use crate::watch::{Subscription, WatchEvent};
use crate::{Error, Result};
use futures::Stream;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Resource-scoped client for one kind, bound to a namespace or to all of them
pub struct ResourceClient<K> {
    fake: Arc<Fake>,
    namespace: String,
    resource: GVR,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for ResourceClient<K> {
    fn clone(&self) -> Self {
        Self {
            fake: Arc::clone(&self.fake),
            namespace: self.namespace.clone(),
            resource: self.resource.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> ResourceClient<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Serialize + DeserializeOwned,
{
    /// Client bound to one namespace; only namespaced kinds qualify
    pub fn namespaced(fake: Arc<Fake>, namespace: &str) -> Self {
        Self::scoped(fake, namespace)
    }
}

impl<K> ResourceClient<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    fn scoped(fake: Arc<Fake>, namespace: &str) -> Self {
        Self {
            fake,
            namespace: namespace.to_string(),
            resource: Self::gvr(),
            _kind: PhantomData,
        }
    }

    /// Client for a cluster-scoped kind, or for a namespaced kind across all namespaces
    pub fn all(fake: Arc<Fake>) -> Self {
        Self::scoped(fake, "")
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn resource(&self) -> &GVR {
        &self.resource
    }

    fn gvr() -> GVR {
        GVR::new(K::group(&()), K::version(&()), K::plural(&()))
    }

    pub fn get(&self, name: &str) -> Result<K> {
        let reply = self.invoke(Verb::Get, &self.namespace, None, ActionPayload::Name(name.to_string()))?;
        decode_object(Verb::Get, reply)
    }

    pub fn list(&self, lp: &ListParams) -> Result<Vec<K>> {
        let options = ListOptions {
            label_selector: lp.label_selector.clone(),
            field_selector: lp.field_selector.clone(),
        };
        let reply = self.invoke(Verb::List, &self.namespace, None, ActionPayload::Selector(options))?;
        decode_list(Verb::List, reply)
    }

    pub fn watch(&self, wp: &WatchParams) -> Result<Watch<K>> {
        let options = ListOptions {
            label_selector: wp.label_selector.clone(),
            field_selector: wp.field_selector.clone(),
        };
        match self.invoke(Verb::Watch, &self.namespace, None, ActionPayload::Selector(options))? {
            Reply::Watch(subscription) => Ok(Watch::new(subscription)),
            other => Err(unexpected_reply(Verb::Watch, &other)),
        }
    }

    pub fn create(&self, _pp: &PostParams, obj: &K) -> Result<K> {
        let namespace = self.namespace_for(obj);
        let payload = ActionPayload::Object(serde_json::to_value(obj)?);
        let reply = self.invoke(Verb::Create, &namespace, None, payload)?;
        decode_object(Verb::Create, reply)
    }

    /// Replace the stored object; a stale `metadata.resourceVersion` fails with `Conflict`
    pub fn update(&self, _pp: &PostParams, obj: &K) -> Result<K> {
        let namespace = self.namespace_for(obj);
        let payload = ActionPayload::Object(serde_json::to_value(obj)?);
        let reply = self.invoke(Verb::Update, &namespace, None, payload)?;
        decode_object(Verb::Update, reply)
    }

    /// Replace only the status of the stored object
    pub fn update_status(&self, _pp: &PostParams, obj: &K) -> Result<K> {
        let namespace = self.namespace_for(obj);
        let payload = ActionPayload::Object(serde_json::to_value(obj)?);
        let reply = self.invoke(Verb::Update, &namespace, Some("status"), payload)?;
        decode_object(Verb::Update, reply)
    }

    pub fn patch<P: Serialize>(&self, name: &str, _pp: &PatchParams, patch: &Patch<P>) -> Result<K> {
        let payload = patch_payload(name, patch)?;
        let reply = self.invoke(Verb::Patch, &self.namespace, None, payload)?;
        decode_object(Verb::Patch, reply)
    }

    pub fn patch_status<P: Serialize>(
        &self,
        name: &str,
        _pp: &PatchParams,
        patch: &Patch<P>,
    ) -> Result<K> {
        let payload = patch_payload(name, patch)?;
        let reply = self.invoke(Verb::Patch, &self.namespace, Some("status"), payload)?;
        decode_object(Verb::Patch, reply)
    }

    /// Delete an object and return the removed copy
    pub fn delete(&self, name: &str, dp: &DeleteParams) -> Result<K> {
        let preconditions = dp
            .preconditions
            .as_ref()
            .map(|p| Preconditions {
                resource_version: p.resource_version.clone(),
                uid: p.uid.clone(),
            })
            .unwrap_or_default();
        let payload = ActionPayload::Delete {
            name: name.to_string(),
            preconditions,
        };
        let reply = self.invoke(Verb::Delete, &self.namespace, None, payload)?;
        decode_object(Verb::Delete, reply)
    }

    /// Delete every object matching `lp` and return the removed copies
    pub fn delete_collection(&self, _dp: &DeleteParams, lp: &ListParams) -> Result<Vec<K>> {
        let options = ListOptions {
            label_selector: lp.label_selector.clone(),
            field_selector: lp.field_selector.clone(),
        };
        let reply = self.invoke(
            Verb::DeleteCollection,
            &self.namespace,
            None,
            ActionPayload::Selector(options),
        )?;
        decode_list(Verb::DeleteCollection, reply)
    }

    /// Objects sent without a namespace land in the client's namespace
    fn namespace_for(&self, obj: &K) -> String {
        if self.namespace.is_empty() {
            obj.meta().namespace.clone().unwrap_or_default()
        } else {
            self.namespace.clone()
        }
    }

    fn invoke(
        &self,
        verb: Verb,
        namespace: &str,
        subresource: Option<&str>,
        payload: ActionPayload,
    ) -> Result<Reply> {
        let mut request = ActionRequest::new(verb, self.resource.clone(), namespace, payload);
        if let Some(subresource) = subresource {
            request = request.with_subresource(subresource);
        }
        self.fake.invoke(request)
    }
}

fn patch_payload<P: Serialize>(name: &str, patch: &Patch<P>) -> Result<ActionPayload> {
    #[allow(unreachable_patterns)]
    let (patch_type, patch) = match patch {
        Patch::Json(operations) => (PatchType::Json, serde_json::to_value(operations)?),
        Patch::Merge(p) => (PatchType::Merge, serde_json::to_value(p)?),
        Patch::Strategic(p) => (PatchType::Strategic, serde_json::to_value(p)?),
        Patch::Apply(p) => (PatchType::Apply, serde_json::to_value(p)?),
        _ => return Err(Error::Unsupported("unknown patch type".to_string())),
    };
    Ok(ActionPayload::Patch {
        name: name.to_string(),
        patch_type,
        patch,
    })
}

fn unexpected_reply(verb: Verb, reply: &Reply) -> Error {
    Error::Internal(format!(
        "{} was answered with a {} reply",
        verb,
        reply.kind()
    ))
}

fn decode_object<K: DeserializeOwned>(verb: Verb, reply: Reply) -> Result<K> {
    match reply {
        Reply::Object(value) => Ok(serde_json::from_value(value)?),
        other => Err(unexpected_reply(verb, &other)),
    }
}

fn decode_list<K: DeserializeOwned>(verb: Verb, reply: Reply) -> Result<Vec<K>> {
    match reply {
        Reply::List(values) => values
            .into_iter()
            .map(|v: Value| serde_json::from_value(v).map_err(Error::from))
            .collect(),
        other => Err(unexpected_reply(verb, &other)),
    }
}

/// Typed view over a watch subscription
pub struct Watch<K> {
    subscription: Subscription,
    _kind: PhantomData<fn() -> K>,
}

impl<K: DeserializeOwned> Watch<K> {
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            _kind: PhantomData,
        }
    }

    pub async fn recv(&mut self) -> Option<Result<WatchEvent<K>>> {
        let event = self.subscription.recv().await?;
        Some(event.and_then(WatchEvent::decode))
    }

    pub fn try_recv(&mut self) -> Result<Option<WatchEvent<K>>> {
        self.subscription
            .try_recv()?
            .map(WatchEvent::decode)
            .transpose()
    }

    pub fn stop(&mut self) {
        self.subscription.stop();
    }

    pub fn into_subscription(self) -> Subscription {
        self.subscription
    }
}

impl<K: DeserializeOwned> Stream for Watch<K> {
    type Item = Result<WatchEvent<K>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.subscription)
            .poll_next(cx)
            .map(|event| event.map(|e| e.and_then(WatchEvent::decode)))
    }
}
