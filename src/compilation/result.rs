use std::fmt;
use std::sync::Arc;

/// Handle to a compiled view type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledType(Arc<str>);

impl CompiledType {
    pub fn new(full_name: impl Into<Arc<str>>) -> Self {
        Self(full_name.into())
    }

    pub fn full_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompiledType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of compiling one view.
///
/// Generated source travels only with the result of the compile that
/// produced it; cache hits carry the type alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationResult {
    compiled_type: Option<CompiledType>,
    compiled_content: Option<String>,
    messages: Vec<String>,
}

impl CompilationResult {
    pub fn successful(compiled_type: CompiledType) -> Self {
        Self {
            compiled_type: Some(compiled_type),
            compiled_content: None,
            messages: Vec::new(),
        }
    }

    pub fn uncached(compiled_type: CompiledType, compiled_content: impl Into<String>) -> Self {
        Self {
            compiled_type: Some(compiled_type),
            compiled_content: Some(compiled_content.into()),
            messages: Vec::new(),
        }
    }

    pub fn failed<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            compiled_type: None,
            compiled_content: None,
            messages: messages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.compiled_type.is_some()
    }

    pub fn compiled_type(&self) -> Option<&CompiledType> {
        self.compiled_type.as_ref()
    }

    pub fn compiled_content(&self) -> Option<&str> {
        self.compiled_content.as_deref()
    }

    /// Diagnostics of a failed compile.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}
