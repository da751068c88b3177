use crate::callbacks::{CallbackTable, CallbackToken};
use crate::error::{NetFnError, Result};
use crate::function::{Arg, Callable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to a function the sender holds, encoded as `{"$fn": "fn<N>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackRef {
    #[serde(rename = "$fn")]
    pub token: CallbackToken,
}

/// An argument as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireArg {
    Callback(CallbackRef),
    Literal(Value),
}

impl WireArg {
    pub fn callback(token: CallbackToken) -> Self {
        WireArg::Callback(CallbackRef { token })
    }
}

impl From<Value> for WireArg {
    fn from(value: Value) -> Self {
        WireArg::Literal(value)
    }
}

/// One callback delivery inside an invoke frame: `[token, args]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation(pub CallbackToken, pub Vec<WireArg>);

/// The three frames exchanged between a stub and a dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Call the function named `key`.
    Request { key: String, args: Vec<WireArg> },
    /// Invoke functions previously passed to the peer.
    Invoke { invocations: Vec<Invocation> },
    /// Return value of the call.
    Result { result: Value },
}

impl Message {
    pub fn request(key: &str, args: Vec<WireArg>) -> Self {
        Message::Request {
            key: key.to_string(),
            args,
        }
    }

    pub fn invoke(token: CallbackToken, args: Vec<WireArg>) -> Self {
        Message::Invoke {
            invocations: vec![Invocation(token, args)],
        }
    }

    pub fn result(result: Value) -> Self {
        Message::Result { result }
    }

    /// Name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request { .. } => "request",
            Message::Invoke { .. } => "invoke",
            Message::Result { .. } => "result",
        }
    }

    pub fn pack(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(NetFnError::from)
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| NetFnError::InvalidMessage(e.to_string()))
    }
}

/// Replace every function argument with a freshly reserved token.
pub fn encode_args(table: &CallbackTable, args: Vec<Arg>) -> Vec<WireArg> {
    args.into_iter()
        .map(|arg| match arg {
            Arg::Value(v) => WireArg::Literal(v),
            Arg::Function(f) => WireArg::callback(table.reserve(f)),
        })
        .collect()
}

/// Replace every callback reference with a local proxy built by `make_proxy`.
pub fn decode_args<F>(args: Vec<WireArg>, mut make_proxy: F) -> Vec<Arg>
where
    F: FnMut(CallbackToken) -> Callable,
{
    args.into_iter()
        .map(|arg| match arg {
            WireArg::Literal(v) => Arg::Value(v),
            WireArg::Callback(r) => Arg::Function(make_proxy(r.token)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Outcome;
    use serde_json::json;

    fn token(s: &str) -> CallbackToken {
        CallbackToken::parse(s).unwrap()
    }

    fn noop(name: &str) -> Callable {
        Callable::from_sync(name, |_| Ok(Outcome::Pending))
    }

    #[test]
    fn test_request_wire_shape() {
        let msg = Message::request(
            "double",
            vec![json!(10).into(), WireArg::callback(token("fn1"))],
        );
        let packed = msg.pack().unwrap();
        let value: Value = serde_json::from_slice(&packed).unwrap();
        assert_eq!(value, json!({"key": "double", "args": [10, {"$fn": "fn1"}]}));
    }

    #[test]
    fn test_invoke_wire_shape() {
        let msg = Message::invoke(token("fn3"), vec![json!(20).into()]);
        let value: Value = serde_json::from_slice(&msg.pack().unwrap()).unwrap();
        assert_eq!(value, json!({"invocations": [["fn3", [20]]]}));
    }

    #[test]
    fn test_result_wire_shape() {
        let packed = Message::result(json!(5)).pack().unwrap();
        let value: Value = serde_json::from_slice(&packed).unwrap();
        assert_eq!(value, json!({"result": 5}));
    }

    #[test]
    fn test_unpack_each_variant() {
        let req = Message::unpack(br#"{"key":"add","args":[2,3]}"#).unwrap();
        assert_eq!(req, Message::request("add", vec![json!(2).into(), json!(3).into()]));

        let raw = br#"{"invocations":[["fn1",[{"$fn":"fn2"}]],["fn4",[]]]}"#;
        let inv = Message::unpack(raw).unwrap();
        match inv {
            Message::Invoke { invocations } => {
                assert_eq!(invocations.len(), 2);
                assert_eq!(invocations[0].0, token("fn1"));
                assert_eq!(invocations[0].1, vec![WireArg::callback(token("fn2"))]);
                assert_eq!(invocations[1].0, token("fn4"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let res = Message::unpack(br#"{"result":null}"#).unwrap();
        assert_eq!(res, Message::result(Value::Null));
    }

    #[test]
    fn test_unpack_zero_result_is_a_result() {
        assert_eq!(Message::unpack(br#"{"result":0}"#).unwrap(), Message::result(json!(0)));
    }

    #[test]
    fn test_unpack_malformed() {
        assert!(matches!(Message::unpack(b"not json"), Err(NetFnError::InvalidMessage(_))));
        assert!(Message::unpack(br#"{"unknown":1}"#).is_err());
        assert!(Message::unpack(br#"{"invocations":[["nope",[]]]}"#).is_err());
    }

    #[test]
    fn test_token_shaped_strings_stay_literal() {
        let raw = br#"{"key":"echo","args":["fn12",{"$fn":"banana"},{"$fn":"fn1","x":1}]}"#;
        let msg = Message::unpack(raw).unwrap();
        match msg {
            Message::Request { args, .. } => {
                assert_eq!(args[0], WireArg::Literal(json!("fn12")));
                assert_eq!(args[1], WireArg::Literal(json!({"$fn": "banana"})));
                assert_eq!(args[2], WireArg::Literal(json!({"$fn": "fn1", "x": 1})));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_encode_args_reserves_functions() {
        let table = CallbackTable::new();
        let cb = noop("cb");
        let wire = encode_args(&table, vec![json!(1).into(), cb.clone().into(), json!("x").into()]);

        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0], WireArg::Literal(json!(1)));
        assert_eq!(wire[2], WireArg::Literal(json!("x")));
        let reserved = match &wire[1] {
            WireArg::Callback(r) => r.token.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert!(table.consume(&reserved).unwrap().ptr_eq(&cb));
    }

    #[test]
    fn test_encode_plain_args_leaves_table_empty() {
        let table = CallbackTable::new();
        encode_args(&table, vec![json!(2).into(), json!(3).into()]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_decode_after_encode_preserves_shape() {
        let table = CallbackTable::new();
        let nested = json!({"a": [1, 2, {"b": null}], "fn": "fn1"});
        let args: Vec<Arg> = vec![
            nested.clone().into(),
            noop("first").into(),
            json!(false).into(),
            noop("second").into(),
        ];

        let mut seen = Vec::new();
        let proxy = noop("proxy");
        let decoded = decode_args(encode_args(&table, args), |t| {
            seen.push(t);
            proxy.clone()
        });

        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0].as_value(), Some(&nested));
        assert!(decoded[1].as_function().unwrap().ptr_eq(&proxy));
        assert_eq!(decoded[2].as_value(), Some(&json!(false)));
        assert!(decoded[3].is_function());
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
    }
}
