use std::collections::BTreeMap;

/// A decoded bencode value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// i<number>e
    Int(i64),
    /// <length>:<contents>
    Bytes(Vec<u8>),
    /// l<values>e
    List(Vec<Value>),
    /// d<key-value pairs>e
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up `key` if this is a dictionary
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?.get(key.as_bytes())
    }

    /// Non-negative integer under `key`
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key)?.as_int().and_then(|i| u64::try_from(i).ok())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }
}
