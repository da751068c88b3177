//! One-shot tokens for functions that cross the wire as arguments.

use crate::function::Callable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const TOKEN_PREFIX: &str = "fn";

/// Reference to a function held in a peer's [`CallbackTable`], of the form `fn<N>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CallbackToken(String);

impl CallbackToken {
    fn from_counter(n: u64) -> Self {
        Self(format!("{}{}", TOKEN_PREFIX, n))
    }

    /// Parse a token, rejecting anything that is not `fn` followed by digits.
    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix(TOKEN_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CallbackToken {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid callback token '{}'", value))
    }
}

impl From<CallbackToken> for String {
    fn from(token: CallbackToken) -> Self {
        token.0
    }
}

/// Functions this process has handed to peers, keyed by the token the peer holds.
///
/// Shared by the client and server roles of one [`Node`](crate::Node). Each entry
/// is delivered at most once: [`consume`](Self::consume) removes it.
pub struct CallbackTable {
    next: AtomicU64,
    entries: Mutex<HashMap<CallbackToken, Callable>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CallbackToken, Callable>> {
        // Entries are plain inserts/removes, a panicking holder cannot leave them torn.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `callable` under a fresh token.
    pub fn reserve(&self, callable: Callable) -> CallbackToken {
        let token = CallbackToken::from_counter(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries().insert(token.clone(), callable);
        token
    }

    /// Remove and return the function behind `token`, if it is still outstanding.
    pub fn consume(&self, token: &CallbackToken) -> Option<Callable> {
        self.entries().remove(token)
    }

    pub fn contains(&self, token: &CallbackToken) -> bool {
        self.entries().contains_key(token)
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Number of outstanding tokens.
    pub fn len(&self) -> usize {
        self.entries().len()
    }
}

impl Default for CallbackTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field("next", &self.next.load(Ordering::Relaxed))
            .field("outstanding", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Outcome;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn noop() -> Callable {
        Callable::from_sync("noop", |_| Ok(Outcome::Pending))
    }

    #[test]
    fn test_tokens_start_at_one() {
        let table = CallbackTable::new();
        assert_eq!(table.reserve(noop()).as_str(), "fn1");
        assert_eq!(table.reserve(noop()).as_str(), "fn2");
    }

    #[test]
    fn test_reserve_yields_distinct_tokens() {
        let table = CallbackTable::new();
        let tokens: HashSet<_> = (0..100).map(|_| table.reserve(noop())).collect();
        assert_eq!(tokens.len(), 100);
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn test_tokens_not_reused_after_consume() {
        let table = CallbackTable::new();
        let first = table.reserve(noop());
        assert!(table.consume(&first).is_some());
        let second = table.reserve(noop());
        assert_ne!(first, second);
    }

    #[test]
    fn test_consume_is_one_shot() {
        let table = CallbackTable::new();
        let f = noop();
        let token = table.reserve(f.clone());
        assert!(table.contains(&token));

        let got = table.consume(&token).unwrap();
        assert!(got.ptr_eq(&f));
        assert!(!table.contains(&token));
        assert!(table.consume(&token).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_consume_unknown_token() {
        let table = CallbackTable::new();
        let token = CallbackToken::parse("fn99").unwrap();
        assert!(table.consume(&token).is_none());
    }

    #[test]
    fn test_concurrent_reserve_and_consume() {
        let table = Arc::new(CallbackTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| table.reserve(noop()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let tokens: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<_> = tokens.iter().cloned().collect();
        assert_eq!(unique.len(), 400);

        let consumed = tokens.iter().filter(|t| table.consume(t).is_some()).count();
        assert_eq!(consumed, 400);
        assert!(table.is_empty());
    }

    #[test]
    fn test_token_parse() {
        assert!(CallbackToken::parse("fn1").is_some());
        assert!(CallbackToken::parse("fn123").is_some());
        assert!(CallbackToken::parse("fn").is_none());
        assert!(CallbackToken::parse("fnx").is_none());
        assert!(CallbackToken::parse("function").is_none());
        assert!(CallbackToken::parse("1fn").is_none());
    }

    #[test]
    fn test_token_serde() {
        let token = CallbackToken::parse("fn7").unwrap();
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"fn7\"");
        let back: CallbackToken = serde_json::from_str("\"fn7\"").unwrap();
        assert_eq!(back, token);
        assert!(serde_json::from_str::<CallbackToken>("\"hello\"").is_err());
    }
}
