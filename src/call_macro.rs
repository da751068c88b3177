//! Ergonomic call API and argument helpers.
//!
//! ```rust,no_run
//! use netfn::{call, Node};
//! # async fn demo(node: Node, names: Vec<netfn::Callable>) -> netfn::Result<()> {
//! let proxies = node.connect(names, 8021, "localhost");
//!
//! let sum: Option<i64> = call!(proxies, add(10, 20)).await?.outcome().await?.parse()?;
//! # Ok(())
//! # }
//! ```
//!
//! Inside a served function, [`ArgsExtractor`] gives typed access to the arguments:
//!
//! ```rust
//! use netfn::{ArgsExtractor, Callable};
//! use serde_json::json;
//!
//! let double = Callable::new("double", |args| async move {
//!     let args = ArgsExtractor::new(args);
//!     let n: i64 = args.get(0)?;
//!     args.callback(1)?.call(vec![json!(n * 2).into()]).await
//! });
//! ```

use crate::client::{Completion, PendingCall, Stub};
use crate::error::{NetFnError, Result};
use crate::function::{Arg, Callable};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Typed access to the arguments a function was called with.
#[derive(Debug, Clone)]
pub struct ArgsExtractor {
    args: Vec<Arg>,
}

impl ArgsExtractor {
    pub fn new(args: Vec<Arg>) -> Self {
        Self { args }
    }

    fn at(&self, index: usize) -> Result<&Arg> {
        self.args.get(index).ok_or_else(|| {
            NetFnError::InvalidArgument(format!("Missing argument at index {}", index))
        })
    }

    /// Get the value at `index`, converted to `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        match self.at(index)? {
            Arg::Value(v) => serde_json::from_value(v.clone()).map_err(NetFnError::JsonError),
            Arg::Function(_) => Err(NetFnError::InvalidArgument(format!(
                "Argument {} is a function, expected a value",
                index
            ))),
        }
    }

    /// Get the function at `index`.
    pub fn callback(&self, index: usize) -> Result<Callable> {
        match self.at(index)? {
            Arg::Function(f) => Ok(f.clone()),
            Arg::Value(_) => Err(NetFnError::InvalidArgument(format!(
                "Argument {} is a value, expected a function",
                index
            ))),
        }
    }

    /// Remove the argument at `index` and convert it; later arguments shift down.
    pub fn take<T: DeserializeOwned>(&mut self, index: usize) -> Result<T> {
        let value = self.get(index)?;
        self.args.remove(index);
        Ok(value)
    }

    pub fn remaining(&self) -> &[Arg] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Types usable directly as call arguments.
pub trait IntoArg {
    fn into_arg(self) -> Arg;
}

impl IntoArg for Arg {
    fn into_arg(self) -> Arg {
        self
    }
}

impl IntoArg for Callable {
    fn into_arg(self) -> Arg {
        Arg::Function(self)
    }
}

impl IntoArg for &Callable {
    fn into_arg(self) -> Arg {
        Arg::Function(self.clone())
    }
}

impl IntoArg for Value {
    fn into_arg(self) -> Arg {
        Arg::Value(self)
    }
}

macro_rules! into_value_arg {
    ($($t:ty),*) => {
        $(
            impl IntoArg for $t {
                fn into_arg(self) -> Arg {
                    Arg::Value(Value::from(self))
                }
            }
        )*
    };
}

into_value_arg!(i64, i32, u64, u32, f64, bool, String, &str);

/// Other serializable types go through `serde_json::to_value(x)?.into()`, which
/// reports serialization failures.
impl<T: Into<Value>> IntoArg for Vec<T> {
    fn into_arg(self) -> Arg {
        Arg::Value(Value::from(self))
    }
}

/// Argument tuples accepted by [`Stub::call_with`].
pub trait CallArgs {
    fn into_args(self) -> Vec<Arg>;
}

impl CallArgs for () {
    fn into_args(self) -> Vec<Arg> {
        vec![]
    }
}

impl CallArgs for Vec<Arg> {
    fn into_args(self) -> Vec<Arg> {
        self
    }
}

macro_rules! tuple_call_args {
    ($($name:ident),+) => {
        impl<$($name: IntoArg),+> CallArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Arg> {
                let ($($name,)+) = self;
                vec![$($name.into_arg()),+]
            }
        }
    };
}

tuple_call_args!(A);
tuple_call_args!(A, B);
tuple_call_args!(A, B, C);
tuple_call_args!(A, B, C, D);
tuple_call_args!(A, B, C, D, E);
tuple_call_args!(A, B, C, D, E, F);

impl Stub {
    /// [`call`](Stub::call) with a tuple of arguments.
    pub async fn call_with<A: CallArgs>(&self, args: A) -> Result<PendingCall> {
        self.call(args.into_args()).await
    }
}

impl Completion {
    /// Convert the returned value to `T`; `None` if the call closed without one.
    pub fn parse<T: DeserializeOwned>(self) -> Result<Option<T>> {
        self.into_value()
            .map(serde_json::from_value)
            .transpose()
            .map_err(NetFnError::JsonError)
    }
}

/// Call a remote function.
///
/// `call!(proxies, name(args...))` calls the stub `name` of a [`Proxies`](crate::Proxies);
/// `call!(stub, (args...))` calls a single [`Stub`]. Arguments are anything
/// implementing [`IntoArg`], including [`Callable`]s. Evaluates to the future
/// returned by `call`.
#[macro_export]
macro_rules! call {
    ($proxies:expr, $func:ident($($arg:expr),* $(,)?)) => {
        $proxies.call(stringify!($func), vec![$($crate::IntoArg::into_arg($arg)),*])
    };
    ($stub:expr, ($($arg:expr),* $(,)?)) => {
        $stub.call(vec![$($crate::IntoArg::into_arg($arg)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Outcome;
    use serde_json::json;

    fn noop() -> Callable {
        Callable::from_sync("noop", |_| Ok(Outcome::Pending))
    }

    #[test]
    fn test_args_extractor_get() {
        let args = ArgsExtractor::new(vec![json!(10).into(), json!(20).into()]);
        let a: i64 = args.get(0).unwrap();
        let b: i64 = args.get(1).unwrap();
        assert_eq!(a, 10);
        assert_eq!(b, 20);
    }

    #[test]
    fn test_args_extractor_take() {
        let mut args = ArgsExtractor::new(vec![json!(10).into(), json!(20).into()]);
        let a: i64 = args.take(0).unwrap();
        let b: i64 = args.take(0).unwrap();
        assert_eq!((a, b), (10, 20));
        assert!(args.is_empty());
    }

    #[test]
    fn test_args_extractor_missing() {
        let args = ArgsExtractor::new(vec![json!(10).into()]);
        assert!(matches!(args.get::<i64>(1), Err(NetFnError::InvalidArgument(_))));
    }

    #[test]
    fn test_args_extractor_callback() {
        let cb = noop();
        let args = ArgsExtractor::new(vec![json!(1).into(), cb.clone().into()]);

        assert!(args.callback(1).unwrap().ptr_eq(&cb));
        assert!(args.callback(0).is_err());
        assert!(args.get::<i64>(1).is_err());
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_args_extractor_type_mismatch() {
        let args = ArgsExtractor::new(vec![json!("hello").into()]);
        assert!(matches!(args.get::<i64>(0), Err(NetFnError::JsonError(_))));
        assert_eq!(args.get::<String>(0).unwrap(), "hello");
    }

    #[test]
    fn test_into_arg_primitives() {
        assert_eq!(5i64.into_arg().as_value(), Some(&json!(5)));
        assert_eq!(true.into_arg().as_value(), Some(&json!(true)));
        assert_eq!("hello".into_arg().as_value(), Some(&json!("hello")));
        assert_eq!(2.5f64.into_arg().as_value(), Some(&json!(2.5)));
        assert_eq!(vec![1, 2].into_arg().as_value(), Some(&json!([1, 2])));
        assert_eq!(
            vec![json!({"a": 1}), json!(null)].into_arg().as_value(),
            Some(&json!([{"a": 1}, null]))
        );
        assert_eq!(vec!["x", "y"].into_arg().as_value(), Some(&json!(["x", "y"])));
        assert!(noop().into_arg().is_function());
    }

    #[test]
    fn test_call_args_tuples() {
        assert!(().into_args().is_empty());

        let args = (1i64, "x", noop()).into_args();
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].as_value(), Some(&json!(1)));
        assert_eq!(args[1].as_value(), Some(&json!("x")));
        assert!(args[2].is_function());
    }

    #[test]
    fn test_completion_parse() {
        let sum: Option<i64> = Completion::Returned(json!(5)).parse().unwrap();
        assert_eq!(sum, Some(5));

        let none: Option<i64> = Completion::Closed.parse().unwrap();
        assert_eq!(none, None);

        assert!(Completion::Returned(json!("x")).parse::<i64>().is_err());
    }

    #[tokio::test]
    async fn test_call_macro_forms() {
        use crate::test_utils::{add_fn, double_fn, silent_node};
        use std::sync::{Arc, Mutex};

        let server_node = silent_node();
        let adder = server_node.listen(vec![add_fn()], 0, "127.0.0.1").await.unwrap();
        let doubler = server_node.listen(double_fn(), 0, "127.0.0.1").await.unwrap();

        let node = silent_node();
        let proxies = node.connect(vec![add_fn()], adder.port(), "127.0.0.1");
        let sum: Option<i64> = call!(proxies, add(2, 3))
            .await
            .unwrap()
            .outcome()
            .await
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(sum, Some(5));

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let cb = Callable::from_sync("cb", move |args| {
            *sink.lock().unwrap() = args[0].as_value().cloned();
            Ok(Outcome::Pending)
        });
        let stub = node.connect(double_fn(), doubler.port(), "127.0.0.1");
        let stub = stub.single().unwrap();
        call!(stub, (10, cb)).await.unwrap().outcome().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(json!(20)));

        let pending = stub.call_with((7, noop())).await.unwrap();
        pending.outcome().await.unwrap();
    }
}
