//! Binder-source markers attached to properties, parameters and types.

use std::fmt;

use serde::Deserialize;

/// Where a raw value originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    Query,
    Header,
    Route,
    Form,
    Body,
}

impl BindingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Header => "header",
            Self::Route => "route",
            Self::Form => "form",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binding instruction declared on a property, an action parameter, or a type
/// (class-level, applying wherever the type is used).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinderMarker {
    /// Bind from the query string only. With `force_bind` the node is bound
    /// even when no query value exists under its prefix.
    FromQuery { force_bind: bool },
    /// Bind a scalar from a request header. `name` overrides the header name,
    /// which otherwise is the property or parameter name.
    FromHeader { name: Option<String> },
    /// Bind from route values only.
    FromRoute,
    /// Bind from form values only.
    FromForm,
    /// Read the whole value from the request body.
    FromBody { force_bind: bool },
    /// Bind regardless of whether any source holds a value.
    BindAlways,
}

impl BinderMarker {
    pub fn from_query() -> Self {
        Self::FromQuery { force_bind: false }
    }

    pub fn forced_query() -> Self {
        Self::FromQuery { force_bind: true }
    }

    pub fn from_header(name: impl Into<String>) -> Self {
        Self::FromHeader {
            name: Some(name.into()),
        }
    }

    pub fn from_body() -> Self {
        Self::FromBody { force_bind: false }
    }

    pub fn forced_body() -> Self {
        Self::FromBody { force_bind: true }
    }

    /// Value source the marker restricts binding to, if any.
    pub fn source(&self) -> Option<BindingSource> {
        match self {
            Self::FromQuery { .. } => Some(BindingSource::Query),
            Self::FromHeader { .. } => Some(BindingSource::Header),
            Self::FromRoute => Some(BindingSource::Route),
            Self::FromForm => Some(BindingSource::Form),
            Self::FromBody { .. } => Some(BindingSource::Body),
            Self::BindAlways => None,
        }
    }

    /// True when the node must be bound without a discoverable value.
    ///
    /// Headers are always bound: an absent header yields an empty value.
    pub fn forces_binding(&self) -> bool {
        match self {
            Self::FromQuery { force_bind } | Self::FromBody { force_bind } => *force_bind,
            Self::FromHeader { .. } | Self::BindAlways => true,
            Self::FromRoute | Self::FromForm => false,
        }
    }
}

/// Convenience for optional markers carried through the binder.
pub(crate) fn forces(marker: Option<&BinderMarker>) -> bool {
    marker.is_some_and(BinderMarker::forces_binding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_force_flags_force_query_and_body() {
        assert!(!BinderMarker::from_query().forces_binding());
        assert!(BinderMarker::forced_query().forces_binding());
        assert!(!BinderMarker::from_body().forces_binding());
        assert!(BinderMarker::forced_body().forces_binding());
    }

    #[test]
    fn header_and_always_markers_force() {
        assert!(BinderMarker::from_header("Accept").forces_binding());
        assert!(BinderMarker::BindAlways.forces_binding());
        assert!(!BinderMarker::FromRoute.forces_binding());
        assert_eq!(BinderMarker::BindAlways.source(), None);
        assert_eq!(
            BinderMarker::from_header("Accept").source(),
            Some(BindingSource::Header)
        );
    }
}
