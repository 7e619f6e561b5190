//! Series keys built from resolved dimension values.

use std::{fmt, sync::Arc};

use crate::dimensions::{DimensionResolver, DimensionScope, SpanContext};

const KEY_SEPARATOR: u8 = 0x00;

/// Identity of a single series within a resource.
///
/// The key is the string forms of the resolved dimension values, in order, joined by a NUL byte. Unresolved
/// dimensions contribute nothing, not even a separator.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SeriesKey(Arc<[u8]>);

impl SeriesKey {
    /// Returns the raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
impl From<&str> for SeriesKey {
    fn from(s: &str) -> Self {
        Self(Arc::from(s.as_bytes()))
    }
}

impl fmt::Debug for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeriesKey({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Builds series keys, reusing a single scratch buffer.
#[derive(Debug, Default)]
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    /// Creates a new `KeyBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the key for the given span context.
    pub fn build(&mut self, resolver: &DimensionResolver, ctx: &SpanContext<'_>, scope: DimensionScope) -> SeriesKey {
        self.buf.clear();

        let buf = &mut self.buf;
        let mut first = true;
        resolver.visit(ctx, scope, |_, value| {
            if !first {
                buf.push(KEY_SEPARATOR);
            }
            first = false;
            value.append_to(buf);
        });

        SeriesKey(Arc::from(self.buf.as_slice()))
    }
}
