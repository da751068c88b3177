//! Callable values that can be registered, passed as arguments, and invoked remotely.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Result of invoking a function.
///
/// `Value` is sent back to the caller as a result frame, whatever the value is
/// (`0`, `""` and `null` included). `Pending` means the function answered nothing
/// directly; it may still reply through a callback it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    Pending,
}

impl Outcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Pending => None,
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::Pending
    }
}

/// Async function trait - implement this for functions that need their own state
#[async_trait]
pub trait Function: Send + Sync + 'static {
    async fn call(&self, args: Vec<Arg>) -> Result<Outcome>;
}

/// Sync function trait - for plain CPU-bound functions
pub trait SyncFunction: Send + Sync + 'static {
    fn call(&self, args: Vec<Arg>) -> Result<Outcome>;
}

struct AsyncFnAdapter<F>(F);

#[async_trait]
impl<F, Fut> Function for AsyncFnAdapter<F>
where
    F: Fn(Vec<Arg>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    async fn call(&self, args: Vec<Arg>) -> Result<Outcome> {
        (self.0)(args).await
    }
}

/// Adapter to allow a SyncFunction to be used where Function is expected
struct SyncToAsyncAdapter<T: SyncFunction>(T);

#[async_trait]
impl<T: SyncFunction> Function for SyncToAsyncAdapter<T> {
    async fn call(&self, args: Vec<Arg>) -> Result<Outcome> {
        self.0.call(args)
    }
}

struct SyncFnAdapter<F>(F);

impl<F> SyncFunction for SyncFnAdapter<F>
where
    F: Fn(Vec<Arg>) -> Result<Outcome> + Send + Sync + 'static,
{
    fn call(&self, args: Vec<Arg>) -> Result<Outcome> {
        (self.0)(args)
    }
}

/// An invocable value with an optional name.
///
/// Cloning is cheap and clones share identity (see [`Callable::ptr_eq`]).
#[derive(Clone)]
pub struct Callable {
    name: Option<Arc<str>>,
    inner: Arc<dyn Function>,
}

impl Callable {
    /// Named async function.
    pub fn new<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Arg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        Self::from_function(Some(name), AsyncFnAdapter(f))
    }

    /// Async function without a name. Dropped when a registry is built from a list.
    pub fn anonymous<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Arg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        Self::from_function(None, AsyncFnAdapter(f))
    }

    /// Named sync function.
    pub fn from_sync<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Arg>) -> Result<Outcome> + Send + Sync + 'static,
    {
        Self::from_function(Some(name), SyncToAsyncAdapter(SyncFnAdapter(f)))
    }

    pub fn from_sync_function<T: SyncFunction>(name: Option<&str>, f: T) -> Self {
        Self::from_function(name, SyncToAsyncAdapter(f))
    }

    pub fn from_function<T: Function>(name: Option<&str>, f: T) -> Self {
        Self {
            name: name.filter(|n| !n.is_empty()).map(Arc::from),
            inner: Arc::new(f),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub async fn call(&self, args: Vec<Arg>) -> Result<Outcome> {
        self.inner.call(args).await
    }

    /// True if both handles refer to the same underlying function.
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// A single call argument: plain data, or a function passed by reference.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Function(Callable),
}

impl Arg {
    pub fn is_function(&self) -> bool {
        matches!(self, Arg::Function(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            Arg::Function(_) => None,
        }
    }

    pub fn as_function(&self) -> Option<&Callable> {
        match self {
            Arg::Function(f) => Some(f),
            Arg::Value(_) => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Callable> for Arg {
    fn from(callable: Callable) -> Self {
        Arg::Function(callable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Doubler;

    impl SyncFunction for Doubler {
        fn call(&self, args: Vec<Arg>) -> Result<Outcome> {
            let n = args
                .first()
                .and_then(Arg::as_value)
                .and_then(Value::as_i64)
                .unwrap_or(0);
            Ok(json!(n * 2).into())
        }
    }

    #[tokio::test]
    async fn test_async_callable() {
        let add = Callable::new("add", |args: Vec<Arg>| async move {
            let a = args[0].as_value().and_then(Value::as_i64).unwrap_or(0);
            let b = args[1].as_value().and_then(Value::as_i64).unwrap_or(0);
            Ok(Outcome::Value(json!(a + b)))
        });

        assert_eq!(add.name(), Some("add"));
        let out = add.call(vec![json!(2).into(), json!(3).into()]).await.unwrap();
        assert_eq!(out, Outcome::Value(json!(5)));
    }

    #[tokio::test]
    async fn test_sync_callable() {
        let f = Callable::from_sync("noop", |_args| Ok(Outcome::Pending));
        assert_eq!(f.call(vec![]).await.unwrap(), Outcome::Pending);
    }

    #[tokio::test]
    async fn test_sync_function_adapter() {
        let f = Callable::from_sync_function(Some("double"), Doubler);
        let out = f.call(vec![json!(21).into()]).await.unwrap();
        assert_eq!(out.value(), Some(&json!(42)));
    }

    #[test]
    fn test_anonymous_and_empty_names() {
        let f = Callable::anonymous(|_| async { Ok(Outcome::Pending) });
        assert!(f.name().is_none());

        let g = Callable::from_sync_function(Some(""), Doubler);
        assert!(g.name().is_none());
    }

    #[test]
    fn test_clone_shares_identity() {
        let f = Callable::from_sync("f", |_| Ok(Outcome::Pending));
        let g = f.clone();
        let h = Callable::from_sync("f", |_| Ok(Outcome::Pending));
        assert!(f.ptr_eq(&g));
        assert!(!f.ptr_eq(&h));
    }

    #[test]
    fn test_arg_accessors() {
        let v: Arg = json!("fn3").into();
        assert!(!v.is_function());
        assert_eq!(v.as_value(), Some(&json!("fn3")));

        let f: Arg = Callable::from_sync("f", |_| Ok(Outcome::Pending)).into();
        assert!(f.is_function());
        assert!(f.as_value().is_none());
    }

    #[test]
    fn test_outcome_conversions() {
        assert_eq!(Outcome::from(json!(0)), Outcome::Value(json!(0)));
        assert_eq!(Outcome::from(()), Outcome::Pending);
        assert!(Outcome::Pending.value().is_none());
    }
}
