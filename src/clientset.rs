//! Clientset dispatchers handing out resource clients bound to one fake

use crate::fake::Fake;
use crate::resource::ResourceClient;
use crate::tracker::ObjectTracker;
use crate::{Action, Error, Reactor, Result};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Entry point of a fake clientset
///
/// Every client handed out shares this clientset's [`Fake`], so actions from
/// all of them land in one history and all of them see one store.
///
/// # Example
///
/// ```
/// use kube_fake_clientset::FakeClientset;
/// use k8s_openapi::api::core::v1::ConfigMap;
/// use kube::api::PostParams;
///
/// let clientset = FakeClientset::new();
/// let config_maps = clientset.namespaced::<ConfigMap>("default");
///
/// let mut cm = ConfigMap::default();
/// cm.metadata.name = Some("settings".to_string());
/// config_maps.create(&PostParams::default(), &cm).unwrap();
///
/// assert_eq!(clientset.actions().len(), 1);
/// ```
#[derive(Clone)]
pub struct FakeClientset {
    fake: Arc<Fake>,
}

impl FakeClientset {
    pub fn new() -> Self {
        Self::from_fake(Arc::new(Fake::default()))
    }

    pub fn from_fake(fake: Arc<Fake>) -> Self {
        Self { fake }
    }

    pub fn builder() -> crate::FakeBuilder {
        crate::FakeBuilder::new()
    }

    pub fn fake(&self) -> &Arc<Fake> {
        &self.fake
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        self.fake.tracker()
    }

    /// Client for a namespaced kind bound to `namespace`
    ///
    /// Cluster-scoped kinds are rejected at compile time; use [`all`](Self::all)
    /// for those.
    ///
    /// ```compile_fail
    /// use k8s_openapi::api::core::v1::Node;
    /// use kube_fake_clientset::FakeClientset;
    ///
    /// let clientset = FakeClientset::new();
    /// let nodes = clientset.namespaced::<Node>("default");
    /// ```
    pub fn namespaced<K>(&self, namespace: &str) -> ResourceClient<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Serialize + DeserializeOwned,
    {
        ResourceClient::namespaced(Arc::clone(&self.fake), namespace)
    }

    /// Client for a cluster-scoped kind, or a namespaced kind across all namespaces
    pub fn all<K>(&self) -> ResourceClient<K>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        ResourceClient::all(Arc::clone(&self.fake))
    }

    pub fn add_reactor(&self, reactor: Reactor) {
        self.fake.add_reactor(reactor);
    }

    pub fn prepend_reactor(&self, reactor: Reactor) {
        self.fake.prepend_reactor(reactor);
    }

    pub fn append_reactor(&self, reactor: Reactor) {
        self.fake.append_reactor(reactor);
    }

    pub fn actions(&self) -> Vec<Action> {
        self.fake.actions()
    }

    pub fn clear_actions(&self) {
        self.fake.clear_actions();
    }

    /// A fake clientset has no transport; this always fails with `Unsupported`
    pub fn rest_client(&self) -> Result<kube::Client> {
        Err(rest_client_unsupported())
    }
}

impl Default for FakeClientset {
    fn default() -> Self {
        Self::new()
    }
}

#[doc(hidden)]
pub fn rest_client_unsupported() -> Error {
    Error::Unsupported("a fake clientset has no REST client".to_string())
}

/// Generate a per-API-group dispatcher with one factory method per kind
///
/// Namespaced kinds get a `fn(&self, namespace: &str)` factory, cluster-scoped
/// kinds a `fn(&self)` one. The generated type also carries a `rest_client()`
/// that fails with `Unsupported`.
///
/// ```
/// use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
/// use k8s_openapi::api::core::v1::{Namespace, Pod};
/// use kube_fake_clientset::{fake_api_group, FakeClientset};
///
/// fake_api_group! {
///     pub struct FakeWorkloads {
///         namespaced deployments: Deployment,
///         namespaced daemon_sets: DaemonSet,
///         namespaced pods: Pod,
///         cluster namespaces: Namespace,
///     }
/// }
///
/// let clientset = FakeClientset::new();
/// let workloads = FakeWorkloads::from(&clientset);
/// assert!(workloads.pods("default").get("missing").unwrap_err().is_not_found());
/// assert!(workloads.rest_client().is_err());
/// ```
#[macro_export]
macro_rules! fake_api_group {
    (@factory namespaced $method:ident $kind:ty) => {
        pub fn $method(&self, namespace: &str) -> $crate::ResourceClient<$kind> {
            $crate::ResourceClient::namespaced(::std::sync::Arc::clone(&self.fake), namespace)
        }
    };

    (@factory cluster $method:ident $kind:ty) => {
        pub fn $method(&self) -> $crate::ResourceClient<$kind> {
            $crate::ResourceClient::all(::std::sync::Arc::clone(&self.fake))
        }
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $group:ident {
            $( $scope:ident $method:ident : $kind:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $group {
            fake: ::std::sync::Arc<$crate::Fake>,
        }

        impl $group {
            pub fn new(fake: ::std::sync::Arc<$crate::Fake>) -> Self {
                Self { fake }
            }

            pub fn fake(&self) -> &::std::sync::Arc<$crate::Fake> {
                &self.fake
            }

            $( $crate::fake_api_group!(@factory $scope $method $kind); )*

            /// A fake API group has no transport; this always fails with `Unsupported`
            pub fn rest_client(&self) -> $crate::Result<$crate::Client> {
                Err($crate::rest_client_unsupported())
            }
        }

        impl ::std::convert::From<&$crate::FakeClientset> for $group {
            fn from(clientset: &$crate::FakeClientset) -> Self {
                Self::new(::std::sync::Arc::clone(clientset.fake()))
            }
        }
    };
}
