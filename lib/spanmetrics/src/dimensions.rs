//! Dimension resolution.
//!
//! A series is identified by the values of its dimensions: up to four built-in dimensions derived from the span itself,
//! followed by any configured dimensions looked up in span and resource (or event) attributes.

use crate::data_model::{AttributeMap, AttributeValue, Span};

/// Resource attribute holding the service name.
pub const SERVICE_NAME_KEY: &str = "service.name";

const SPAN_NAME_KEY: &str = "span.name";
const SPAN_KIND_KEY: &str = "span.kind";
const STATUS_CODE_KEY: &str = "status.code";

/// A dimension derived directly from the span and its service, rather than from attributes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BuiltinDimension {
    /// `service.name`
    ServiceName,

    /// `span.name`
    SpanName,

    /// `span.kind`
    SpanKind,

    /// `status.code`
    StatusCode,
}

impl BuiltinDimension {
    /// All built-in dimensions, in key order.
    pub const ALL: [Self; 4] = [Self::ServiceName, Self::SpanName, Self::SpanKind, Self::StatusCode];

    /// Returns the attribute name of the dimension.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ServiceName => SERVICE_NAME_KEY,
            Self::SpanName => SPAN_NAME_KEY,
            Self::SpanKind => SPAN_KIND_KEY,
            Self::StatusCode => STATUS_CODE_KEY,
        }
    }

    /// Returns the built-in dimension with the given attribute name, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    fn value<'a>(&self, service_name: &'a str, span: &'a Span) -> &'a str {
        match self {
            Self::ServiceName => service_name,
            Self::SpanName => &span.name,
            Self::SpanKind => span.kind.as_str(),
            Self::StatusCode => span.status.code.as_str(),
        }
    }
}

/// A configured dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct Dimension {
    /// Attribute name to look up.
    pub name: String,

    /// Value to use when the attribute is absent from both the span and the resource (or event).
    pub default: Option<AttributeValue>,
}

impl Dimension {
    /// Creates a dimension with no default value.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// Sets the default value.
    pub fn with_default<V: Into<AttributeValue>>(mut self, default: V) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Resolves the value of `dimension`.
///
/// Span attributes take precedence over `fallback_attributes` (the resource attributes, or for events, the event
/// attributes merged over the resource attributes), which take precedence over the configured default. Returns `None`
/// only when all three are absent: a present empty string still resolves.
pub fn resolve<'a>(
    dimension: &'a Dimension, span_attributes: &'a AttributeMap, fallback_attributes: &'a AttributeMap,
) -> Option<&'a AttributeValue> {
    span_attributes
        .get(&dimension.name)
        .or_else(|| fallback_attributes.get(&dimension.name))
        .or(dimension.default.as_ref())
}

/// The resolved value of a single dimension.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResolvedValue<'a> {
    /// A built-in dimension's string value.
    Builtin(&'a str),

    /// A configured dimension's attribute value.
    Attribute(&'a AttributeValue),
}

impl ResolvedValue<'_> {
    /// Appends the string form of the value to `buf`.
    pub fn append_to(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Builtin(s) => buf.extend_from_slice(s.as_bytes()),
            Self::Attribute(value) => buf.extend_from_slice(value.to_string_form().as_bytes()),
        }
    }

    /// Returns an owned attribute value.
    pub fn to_attribute_value(&self) -> AttributeValue {
        match self {
            Self::Builtin(s) => AttributeValue::Str(s.to_string()),
            Self::Attribute(value) => (*value).clone(),
        }
    }
}

/// Which metric family dimensions are being resolved for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DimensionScope {
    /// `calls` and `duration`: built-ins and span dimensions.
    Span,

    /// `events`: built-ins, span dimensions, and event dimensions.
    Event,
}

/// The inputs that dimension values are resolved from.
#[derive(Clone, Copy, Debug)]
pub struct SpanContext<'a> {
    /// Value of the resource's `service.name` attribute, in string form.
    pub service_name: &'a str,

    /// The span.
    pub span: &'a Span,

    /// Resource attributes, or for events, the event attributes merged over the resource attributes.
    pub attributes: &'a AttributeMap,
}

/// Resolves the ordered dimension values of spans.
#[derive(Clone, Debug)]
pub struct DimensionResolver {
    builtins: Vec<BuiltinDimension>,
    span_dimensions: Vec<Dimension>,
    event_dimensions: Vec<Dimension>,
}

impl DimensionResolver {
    /// Creates a new `DimensionResolver`.
    ///
    /// Names in `excluded` that match a built-in dimension remove it; other names are ignored.
    pub fn new<S: AsRef<str>>(excluded: &[S], span_dimensions: Vec<Dimension>, event_dimensions: Vec<Dimension>) -> Self {
        let builtins = BuiltinDimension::ALL
            .into_iter()
            .filter(|builtin| !excluded.iter().any(|name| name.as_ref() == builtin.name()))
            .collect();

        Self {
            builtins,
            span_dimensions,
            event_dimensions,
        }
    }

    /// Returns the built-in dimensions in use.
    pub fn builtins(&self) -> &[BuiltinDimension] {
        &self.builtins
    }

    /// Visits each resolved dimension, in key order, as a name/value pair.
    ///
    /// Built-ins come first in fixed order, then span dimensions in declaration order, then (for
    /// [`DimensionScope::Event`] only) event dimensions. Dimensions that do not resolve are skipped.
    pub fn visit<'a, F>(&'a self, ctx: &SpanContext<'a>, scope: DimensionScope, mut visitor: F)
    where
        F: FnMut(&'a str, ResolvedValue<'a>),
    {
        for builtin in &self.builtins {
            visitor(builtin.name(), ResolvedValue::Builtin(builtin.value(ctx.service_name, ctx.span)));
        }

        let event_dimensions = match scope {
            DimensionScope::Span => &[][..],
            DimensionScope::Event => &self.event_dimensions[..],
        };

        for dimension in self.span_dimensions.iter().chain(event_dimensions) {
            if let Some(value) = resolve(dimension, &ctx.span.attributes, ctx.attributes) {
                visitor(&dimension.name, ResolvedValue::Attribute(value));
            }
        }
    }

    /// Materializes the attribute map for the resolved dimensions.
    pub fn build_attributes(&self, ctx: &SpanContext<'_>, scope: DimensionScope) -> AttributeMap {
        let capacity = self.builtins.len()
            + self.span_dimensions.len()
            + match scope {
                DimensionScope::Span => 0,
                DimensionScope::Event => self.event_dimensions.len(),
            };

        let mut attributes = AttributeMap::with_capacity(capacity);
        self.visit(ctx, scope, |name, value| {
            attributes.insert(name, value.to_attribute_value());
        });
        attributes
    }
}
