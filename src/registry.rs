//! Method registry (component B).
//!
//! Rust has no runtime reflection, so the dispatchable-method predicate
//! is enforced by construction: a target registers handlers explicitly
//! through [`RegistryBuilder::method`], the way `xiaolou86-pathfinder`'s
//! `RpcRouterBuilder::register` (and `codex`'s own `CodexClientBuilder`)
//! expose a fluent registration API instead of scanning a type.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cancellation::CancellationToken;
use crate::error::RpcError;

/// Suffix used by the async-suffix aliasing rule.
const ASYNC_SUFFIX: &str = "Async";

pub type Invoker = Arc<
    dyn Fn(Vec<Value>, Option<CancellationToken>) -> BoxFuture<'static, Result<Value, RpcError>>
        + Send
        + Sync,
>;

/// A single declared parameter. `decodable` answers "would this JSON
/// value deserialize into my declared type", which is how overload
/// candidates are disqualified during binding without needing runtime
/// type introspection. Trailing parameters with
/// `has_default` may be omitted by the caller; omitted values are passed
/// to the handler as `Value::Null`, so optional parameter types should be
/// `Option<T>` or otherwise accept `null`.
pub struct ParamSpec {
    pub name: &'static str,
    pub has_default: bool,
    pub type_name: &'static str,
    decodable: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl ParamSpec {
    pub fn required<T: DeserializeOwned>(name: &'static str) -> Self {
        ParamSpec {
            name,
            has_default: false,
            type_name: std::any::type_name::<T>(),
            decodable: Arc::new(|v: &Value| serde_json::from_value::<T>(v.clone()).is_ok()),
        }
    }

    pub fn optional<T: DeserializeOwned>(name: &'static str) -> Self {
        ParamSpec {
            has_default: true,
            ..ParamSpec::required::<T>(name)
        }
    }

    pub(crate) fn accepts(&self, value: &Value) -> bool {
        (self.decodable)(value)
    }
}

/// A registry record: external name, arity range, parameter descriptors,
/// whether the handler accepts a cancellation token, and the invoker.
pub struct MethodEntry {
    pub external_name: String,
    pub params: Vec<ParamSpec>,
    pub accepts_cancellation: bool,
    pub invoke: Invoker,
}

impl MethodEntry {
    pub fn min_arity(&self) -> usize {
        self.params.iter().take_while(|p| !p.has_default).count()
    }

    pub fn max_arity(&self) -> usize {
        self.params.len()
    }

    /// Signature identity used to decide override-vs-overload when a name
    /// is registered twice. Same arity and same declared types replaces
    /// the earlier entry (models a derived method shadowing/overriding a
    /// base one); any other difference appends a new overload candidate.
    fn signature(&self) -> Vec<&'static str> {
        self.params.iter().map(|p| p.type_name).collect()
    }
}

/// The populated method table. Entries are keyed by their own physical
/// external name; async-suffix aliasing is resolved at lookup time so
/// that a later registration under the *real* name always takes priority
/// over the alias: if both exist physically, the exact match wins.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Vec<MethodEntry>>,
}

impl MethodRegistry {
    /// True when no target methods were ever registered. The dispatcher
    /// treats this distinctly from an ordinary per-method lookup miss
    /// (`TargetNotSet` vs. `MethodNotFound`).
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Candidate entries for dispatching `name`, resolving the
    /// async-suffix alias when no physical entry exists under `name`.
    pub fn candidates(&self, name: &str) -> Option<&[MethodEntry]> {
        if let Some(entries) = self.methods.get(name) {
            return Some(entries);
        }
        let aliased = format!("{name}{ASYNC_SUFFIX}");
        self.methods.get(&aliased).map(Vec::as_slice)
    }

    fn insert(&mut self, entry: MethodEntry) {
        let entries = self.methods.entry(entry.external_name.clone()).or_default();
        if let Some(existing) = entries
            .iter_mut()
            .find(|existing| existing.signature() == entry.signature())
        {
            *existing = entry;
        } else {
            entries.push(entry);
        }
    }
}

/// Fluent builder for populating a [`MethodRegistry`] declaratively.
#[derive(Default)]
pub struct RegistryBuilder {
    registry: MethodRegistry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder::default()
    }

    /// Register a method. `params` declares arity, defaults, and the
    /// decode check used for overload disambiguation.
    pub fn method<F, Fut>(
        mut self,
        name: impl Into<String>,
        params: Vec<ParamSpec>,
        accepts_cancellation: bool,
        handler: F,
    ) -> Self
    where
        F: Fn(Vec<Value>, Option<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        let invoke: Invoker = Arc::new(move |args, token| Box::pin(handler(args, token)));
        self.registry.insert(MethodEntry {
            external_name: name.into(),
            params,
            accepts_cancellation,
            invoke,
        });
        self
    }

    pub fn build(self) -> MethodRegistry {
        self.registry
    }
}
