//! Action-recording fake clientset for testing kube-rs code.
//!
//! Based on the fake clientsets and object tracker from client-go's testing
//! package: every call made through a resource client is recorded as an
//! [`Action`], run through an ordered chain of [`Reactor`]s, and, unless a
//! reactor answers it, applied to an in-memory [`ObjectTracker`] whose
//! mutations are streamed to live watches.
//!
//! # Examples
//!
//! ## Recording and asserting actions
//!
//! ```rust
//! use kube_fake_clientset::{FakeClientset, Verb};
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use kube::api::PostParams;
//!
//! let clientset = FakeClientset::new();
//! let config_maps = clientset.namespaced::<ConfigMap>("default");
//!
//! let mut cm = ConfigMap::default();
//! cm.metadata.name = Some("settings".to_string());
//! config_maps.create(&PostParams::default(), &cm).unwrap();
//! assert!(config_maps.get("missing").is_err());
//!
//! let verbs: Vec<Verb> = clientset.actions().iter().map(|a| a.verb()).collect();
//! assert_eq!(verbs, vec![Verb::Create, Verb::Get]);
//! ```
//!
//! ## Injecting failures with a reactor
//!
//! ```rust
//! use kube_fake_clientset::{Error, FakeClientset, Reactor};
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use kube::api::PostParams;
//!
//! let clientset = FakeClientset::new();
//! clientset.prepend_reactor(Reactor::new("create", "configmaps", |_| {
//!     Err(Error::Internal("etcd unavailable".into()))
//! }));
//!
//! let mut cm = ConfigMap::default();
//! cm.metadata.name = Some("settings".to_string());
//! let result = clientset
//!     .namespaced::<ConfigMap>("default")
//!     .create(&PostParams::default(), &cm);
//! assert!(matches!(result, Err(Error::Internal(_))));
//! ```

mod action;
mod builder;
mod clientset;
mod error;
mod fake;
mod reactor;
mod resource;
pub mod selector;
mod tracker;
mod utils;
mod watch;

#[cfg(test)]
mod action_test;
#[cfg(test)]
mod test_fixtures;
#[cfg(test)]
mod tracker_test;

pub use action::{
    Action, ActionHistory, ActionPayload, ActionRequest, ListOptions, PatchType, Preconditions,
    Verb,
};
pub use builder::FakeBuilder;
#[doc(hidden)]
pub use clientset::rest_client_unsupported;
pub use clientset::FakeClientset;
pub use error::{Error, Result};
pub use fake::Fake;
pub use kube::Client;
pub use reactor::{default_reaction, ReactionContext, ReactionFunc, Reactor, ReactorChain, Reply};
pub use resource::{ResourceClient, Watch};
pub use tracker::{ObjectKey, ObjectTracker, GVK, GVR};
pub use watch::{
    BucketState, Broadcaster, EventType, Subscription, WatchEvent, DEFAULT_WATCH_CAPACITY,
};
