//! Event routing by payload shape
//!
//! An [`EventRouter`] serves one event name. It resolves the handler for an
//! inbound payload purely from the set of field names present:
//!
//! 1. no payload, a non-object payload, or `{}` selects the zero-argument handler;
//! 2. otherwise the sorted field names form the observed key, looked up among
//!    the keys every registered [`Signature`] expands to;
//! 3. with no match the namespace's fallback handler receives the raw payload;
//! 4. with no fallback either, dispatch fails with [`RouterError::Dispatch`].
//!
//! Matched handlers receive their arguments positionally, in declared order,
//! with absent optional fields passed as `None`. Tables are built at startup
//! and only read afterwards.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, RouterError};
use crate::signature::{dispatch_key, Signature};

/// Future returned by handler bodies
pub type HandlerFuture = BoxFuture<'static, Result<()>>;

type HandlerFn<C> = dyn Fn(C, Args) -> HandlerFuture + Send + Sync;
type FallbackFn<C> = dyn Fn(C, Option<Value>) -> HandlerFuture + Send + Sync;

/// Arguments extracted from a payload in the handler's declared order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    params: Vec<(String, Option<Value>)>,
}

impl Args {
    pub fn new(params: Vec<(String, Option<Value>)>) -> Self {
        Self { params }
    }

    /// Extract `signature`'s parameters from `payload`
    pub fn extract(signature: &Signature, payload: Option<&Value>) -> Self {
        let params = signature
            .params()
            .iter()
            .map(|p| {
                let value = payload.and_then(|v| v.get(&p.name)).cloned();
                (p.name.clone(), value)
            })
            .collect();
        Self { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Declared name of parameter `i`
    pub fn name(&self, i: usize) -> Option<&str> {
        self.params.get(i).map(|(name, _)| name.as_str())
    }

    /// Raw value of parameter `i`; `None` when the field was absent
    pub fn get(&self, i: usize) -> Option<&Value> {
        self.params.get(i).and_then(|(_, value)| value.as_ref())
    }

    pub fn is_present(&self, i: usize) -> bool {
        self.get(i).is_some()
    }

    /// Deserialize a parameter that must be present and non-null
    pub fn required<T: DeserializeOwned>(&self, i: usize) -> Result<T> {
        let name = self.param_name(i);
        match self.get(i) {
            None | Some(Value::Null) => Err(RouterError::invalid_argument(&name, "missing")),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| RouterError::invalid_argument(&name, e)),
        }
    }

    /// Deserialize a parameter that may be absent or null
    pub fn optional<T: DeserializeOwned>(&self, i: usize) -> Result<Option<T>> {
        match self.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| RouterError::invalid_argument(&self.param_name(i), e)),
        }
    }

    /// Loose truthiness: `false`, `0`, `""`, `null` and absence are false
    pub fn truthy(&self, i: usize) -> bool {
        match self.get(i) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        }
    }

    /// Optional number, accepting numeric strings
    pub fn number(&self, i: usize) -> Result<Option<f64>> {
        match self.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| RouterError::invalid_argument(&self.param_name(i), e)),
            Some(other) => Err(RouterError::invalid_argument(
                &self.param_name(i),
                format!("expected a number, got {}", other),
            )),
        }
    }

    /// Optional list index; negative values clamp to 0, fractions truncate
    pub fn index(&self, i: usize) -> Result<Option<usize>> {
        Ok(self.number(i)?.map(|n| if n <= 0.0 { 0 } else { n as usize }))
    }

    /// Optional list position that must be a whole number `>= 0`
    pub fn position(&self, i: usize) -> Result<Option<usize>> {
        match self.number(i)? {
            None => Ok(None),
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 => {
                Ok(Some(n as usize))
            }
            Some(n) => Err(RouterError::invalid_argument(
                &self.param_name(i),
                format!("{} is not a list position", n),
            )),
        }
    }

    fn param_name(&self, i: usize) -> String {
        self.name(i)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", i))
    }
}

/// A unit of behavior bound to the payload shapes of its [`Signature`]
pub struct Handler<C> {
    name: String,
    signature: Signature,
    body: Arc<HandlerFn<C>>,
}

impl<C: Send + 'static> Handler<C> {
    pub fn new<F, Fut>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(C, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            signature,
            body: Arc::new(move |ctx, args| Box::pin(body(ctx, args))),
        }
    }

    pub fn call(&self, ctx: C, args: Args) -> HandlerFuture {
        (self.body)(ctx, args)
    }
}

impl<C> Handler<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl<C> std::fmt::Debug for Handler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Catch-all for payloads no handler matched; receives the raw payload
pub struct Fallback<C> {
    name: String,
    body: Arc<FallbackFn<C>>,
}

impl<C: Send + 'static> Fallback<C> {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(C, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(move |ctx, payload| Box::pin(body(ctx, payload))),
        }
    }

    pub fn call(&self, ctx: C, payload: Option<Value>) -> HandlerFuture {
        (self.body)(ctx, payload)
    }
}

impl<C> Fallback<C> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of [`EventRouter::resolve`]
pub enum Route<'a, C> {
    Handler(&'a Handler<C>),
    Fallback(&'a Fallback<C>),
}

impl<C> Route<'_, C> {
    pub fn name(&self) -> &str {
        match self {
            Route::Handler(h) => h.name(),
            Route::Fallback(f) => f.name(),
        }
    }
}

/// Dispatch table for one event name
pub struct EventRouter<C> {
    namespace: String,
    by_key: HashMap<String, Arc<Handler<C>>>,
    zero_arg: Option<Arc<Handler<C>>>,
    fallback: Option<Fallback<C>>,
}

impl<C: Send + 'static> EventRouter<C> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            by_key: HashMap::new(),
            zero_arg: None,
            fallback: None,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Register a handler under every key its signature expands to.
    ///
    /// Fails without touching the table if any key is already taken.
    pub fn register(&mut self, handler: Handler<C>) -> Result<()> {
        let keys = handler.signature().dispatch_keys()?;

        if keys.is_empty() {
            if self.zero_arg.is_some() {
                return Err(self.duplicate(""));
            }
            self.zero_arg = Some(Arc::new(handler));
            return Ok(());
        }

        if let Some(taken) = keys.iter().find(|k| self.by_key.contains_key(*k)) {
            return Err(self.duplicate(taken));
        }

        debug!(
            "Registered {}::{} for shapes {:?}",
            self.namespace,
            handler.name(),
            keys
        );

        let handler = Arc::new(handler);
        for key in keys {
            self.by_key.insert(key, handler.clone());
        }
        Ok(())
    }

    /// Install the namespace's single fallback handler
    pub fn register_fallback(&mut self, fallback: Fallback<C>) -> Result<()> {
        if self.fallback.is_some() {
            return Err(self.duplicate("<fallback>"));
        }
        self.fallback = Some(fallback);
        Ok(())
    }

    /// Pick the handler for a payload without running it
    pub fn resolve(&self, payload: Option<&Value>) -> Result<Route<'_, C>> {
        let observed = match payload {
            Some(Value::Object(map)) if !map.is_empty() => {
                Some(dispatch_key(map.keys().map(String::as_str)))
            }
            _ => None,
        };

        let handler = match &observed {
            None => self.zero_arg.as_deref(),
            Some(key) => self.by_key.get(key).map(Arc::as_ref),
        };

        if let Some(handler) = handler {
            return Ok(Route::Handler(handler));
        }
        if let Some(fallback) = &self.fallback {
            return Ok(Route::Fallback(fallback));
        }

        Err(RouterError::Dispatch {
            event: self.namespace.clone(),
            key: observed.unwrap_or_default(),
        })
    }

    /// Resolve and run the handler for `payload`
    pub async fn dispatch(&self, ctx: C, payload: Option<Value>) -> Result<()> {
        match self.resolve(payload.as_ref())? {
            Route::Handler(handler) => {
                let args = Args::extract(handler.signature(), payload.as_ref());
                debug!("{} -> {}", self.namespace, handler.name());
                handler.call(ctx, args).await
            }
            Route::Fallback(fallback) => {
                debug!("{} -> {} (fallback)", self.namespace, fallback.name());
                fallback.call(ctx, payload).await
            }
        }
    }

    /// Every registered key, unordered
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    pub fn has_zero_arg(&self) -> bool {
        self.zero_arg.is_some()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    fn duplicate(&self, key: &str) -> RouterError {
        RouterError::DuplicateHandlerSignature {
            namespace: self.namespace.clone(),
            key: key.to_string(),
        }
    }
}

/// Event name -> router
pub struct EventTable<C> {
    routers: HashMap<String, EventRouter<C>>,
}

impl<C: Send + 'static> EventTable<C> {
    pub fn new() -> Self {
        Self {
            routers: HashMap::new(),
        }
    }

    /// Router for `event`, created on first use
    pub fn router_mut(&mut self, event: &str) -> &mut EventRouter<C> {
        self.routers
            .entry(event.to_string())
            .or_insert_with(|| EventRouter::new(event))
    }

    pub fn router(&self, event: &str) -> Option<&EventRouter<C>> {
        self.routers.get(event)
    }

    pub fn register(&mut self, event: &str, handler: Handler<C>) -> Result<()> {
        self.router_mut(event).register(handler)
    }

    pub fn register_fallback(&mut self, event: &str, fallback: Fallback<C>) -> Result<()> {
        self.router_mut(event).register_fallback(fallback)
    }

    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.routers.keys().map(String::as_str)
    }

    /// Route `payload` through the router registered for `event`
    pub async fn dispatch(&self, event: &str, ctx: C, payload: Option<Value>) -> Result<()> {
        match self.routers.get(event) {
            Some(router) => router.dispatch(ctx, payload).await,
            None => Err(RouterError::Dispatch {
                event: event.to_string(),
                key: String::new(),
            }),
        }
    }
}

impl<C: Send + 'static> Default for EventTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_accessors() {
        let sig = Signature::parse(["addedTrack", "$insert"]).unwrap();
        let args = Args::extract(&sig, Some(&json!({ "addedTrack": { "src": "x" } })));

        assert_eq!(args.len(), 2);
        assert_eq!(args.name(1), Some("insert"));
        assert!(args.is_present(0));
        assert!(!args.is_present(1));
        assert!(!args.truthy(1));
        assert_eq!(args.optional::<bool>(1).unwrap(), None);
    }

    #[test]
    fn test_truthiness() {
        let args = Args::new(vec![
            ("a".into(), Some(json!(1))),
            ("b".into(), Some(json!(0))),
            ("c".into(), Some(json!("yes"))),
            ("d".into(), Some(json!(""))),
            ("e".into(), Some(json!(null))),
        ]);
        let truth: Vec<bool> = (0..5).map(|i| args.truthy(i)).collect();
        assert_eq!(truth, vec![true, false, true, false, false]);
    }

    #[test]
    fn test_index_and_number() {
        let args = Args::new(vec![
            ("cIndex".into(), Some(json!(-1))),
            ("cTime".into(), Some(json!("12.5"))),
            ("bad".into(), Some(json!([1]))),
        ]);
        assert_eq!(args.index(0).unwrap(), Some(0));
        assert_eq!(args.number(1).unwrap(), Some(12.5));
        assert!(matches!(
            args.number(2),
            Err(RouterError::InvalidArgument { name, .. }) if name == "bad"
        ));
    }

    #[test]
    fn test_position_is_strict() {
        let args = Args::new(vec![
            ("removeIndex".into(), Some(json!(-1))),
            ("removeIndex".into(), Some(json!(1.5))),
            ("removeIndex".into(), Some(json!("2"))),
            ("newIndex".into(), None),
        ]);
        assert!(matches!(
            args.position(0),
            Err(RouterError::InvalidArgument { .. })
        ));
        assert!(args.position(1).is_err());
        assert_eq!(args.position(2).unwrap(), Some(2));
        assert_eq!(args.position(3).unwrap(), None);
    }

    #[test]
    fn test_required_missing() {
        let args = Args::new(vec![("removeIndex".into(), None)]);
        assert!(matches!(
            args.required::<usize>(0),
            Err(RouterError::InvalidArgument { name, reason }) if name == "removeIndex" && reason == "missing"
        ));
    }
}
