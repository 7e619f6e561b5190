use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use snafu::Snafu;
use spanmetrics_common::{collections::FastIndexMap, hash::OrderIndependentHasher};

/// An attribute value.
///
/// Mirrors the value types supported by OpenTelemetry attributes. When serialized, values are tagged by type in the
/// same way as the OTLP JSON encoding, such as `{"stringValue": "checkout"}`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub enum AttributeValue {
    /// A string.
    #[serde(rename = "stringValue")]
    Str(String),

    /// A boolean.
    #[serde(rename = "boolValue")]
    Bool(bool),

    /// A signed 64-bit integer.
    #[serde(rename = "intValue")]
    Int(i64),

    /// A 64-bit floating point number.
    #[serde(rename = "doubleValue")]
    Double(f64),

    /// Raw bytes, encoded as standard base64 when serialized.
    #[serde(rename = "bytesValue", with = "base64_bytes")]
    Bytes(Vec<u8>),

    /// An ordered list of values.
    #[serde(rename = "arrayValue")]
    Array(Vec<AttributeValue>),

    /// A nested map of values.
    #[serde(rename = "kvlistValue")]
    Map(AttributeMap),

    /// No value.
    #[default]
    #[serde(rename = "empty")]
    Empty,
}

impl AttributeValue {
    /// Returns the string form of this value.
    ///
    /// Strings are returned verbatim, booleans as `true`/`false`, integers in decimal, doubles in their shortest
    /// round-trip decimal form, bytes as standard base64, arrays and maps as JSON, and an empty value as `""`.
    pub fn to_string_form(&self) -> Cow<'_, str> {
        match self {
            Self::Str(s) => Cow::Borrowed(s.as_str()),
            Self::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Self::Int(i) => Cow::Owned(i.to_string()),
            Self::Double(d) => Cow::Owned(format_double(*d)),
            Self::Bytes(bytes) => Cow::Owned(BASE64.encode(bytes)),
            Self::Array(_) | Self::Map(_) => Cow::Owned(self.to_json().to_string()),
            Self::Empty => Cow::Borrowed(""),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bytes(bytes) => Value::String(BASE64.encode(bytes)),
            Self::Array(values) => Value::Array(values.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect()),
            Self::Empty => Value::Null,
        }
    }
}

fn format_double(value: f64) -> String {
    if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Str(s) => s.hash(state),
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Double(d) => d.to_bits().hash(state),
            Self::Bytes(bytes) => bytes.hash(state),
            Self::Array(values) => values.hash(state),
            Self::Map(map) => map.digest().hash(state),
            Self::Empty => {}
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{de::Error as _, Deserialize as _, Deserializer, Serializer};

    use super::BASE64;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

/// An insertion-ordered map of attribute names to values.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AttributeMap(FastIndexMap<String, AttributeValue>);

impl AttributeMap {
    /// Creates an empty `AttributeMap`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty `AttributeMap` with room for `capacity` attributes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(FastIndexMap::with_capacity_and_hasher(capacity, Default::default()))
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Inserts an attribute, returning the previous value for the same key, if any.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<AttributeValue>
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        self.0.insert(key.into(), value.into())
    }

    /// Copies every attribute from `other` into this map, overwriting existing values for the same key.
    pub fn merge_from(&mut self, other: &AttributeMap) {
        for (key, value) in other.iter() {
            self.0.insert(key.to_string(), value.clone());
        }
    }

    /// Returns the number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the attributes, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a 128-bit digest of the map that does not depend on insertion order.
    pub fn digest(&self) -> u128 {
        let mut hasher = OrderIndependentHasher::new();
        for (key, value) in self.iter() {
            hasher.add((key, value));
        }
        hasher.finish()
    }

    /// Returns a 128-bit digest covering only the attributes named in `keys`, ignoring insertion order.
    ///
    /// Names in `keys` that are not present are ignored.
    pub fn digest_of<S: AsRef<str>>(&self, keys: &[S]) -> u128 {
        let mut hasher = OrderIndependentHasher::new();
        for (key, value) in self.iter() {
            if keys.iter().any(|k| k.as_ref() == key) {
                hasher.add((key, value));
            }
        }
        hasher.finish()
    }
}

impl<K, V> FromIterator<(K, V)> for AttributeMap
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// An error parsing a hex-encoded identifier.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum IdParseError {
    /// The identifier had the wrong number of characters.
    #[snafu(display("expected {} hex characters, got {}", expected, actual))]
    InvalidLength {
        /// Expected number of characters.
        expected: usize,

        /// Actual number of characters.
        actual: usize,
    },

    /// The identifier contained a non-hex character.
    #[snafu(display("identifier contains non-hex characters"))]
    InvalidCharacter,
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
        pub struct $name([u8; $len]);

        impl $name {
            /// The all-zero identifier.
            pub const EMPTY: Self = Self([0; $len]);

            /// Creates an identifier from raw bytes.
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes of the identifier.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns `true` if every byte is zero.
            pub fn is_empty(&self) -> bool {
                self.0 == [0; $len]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            /// Parses a lowercase or uppercase hex string. An empty string parses as the all-zero identifier.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    return Ok(Self::EMPTY);
                }
                if s.len() != $len * 2 {
                    return Err(IdParseError::InvalidLength { expected: $len * 2, actual: s.len() });
                }
                if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(IdParseError::InvalidCharacter);
                }

                let mut bytes = [0; $len];
                for (i, byte) in bytes.iter_mut().enumerate() {
                    *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| IdParseError::InvalidCharacter)?;
                }
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <Cow<'de, str>>::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

define_id!(
    /// A 16-byte trace identifier.
    TraceId,
    16
);

define_id!(
    /// An 8-byte span identifier.
    SpanId,
    8
);
