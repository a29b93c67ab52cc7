use std::fmt::Display;

/// Failure categories of an analysis.
///
/// Only [`AnalysisError::Syntax`] makes a whole analysis fail. The others are
/// raised while building one subtree and end up as placeholder nodes or
/// fallback strings, so that sibling subtrees are still analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    Syntax(String),
    RecursionLimitReached(String),
    CyclicReference(String),
    Rendering(String),
}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Syntax(msg) => write!(f, "SQL parse error: {}", msg),
            AnalysisError::RecursionLimitReached(msg)
            | AnalysisError::CyclicReference(msg)
            | AnalysisError::Rendering(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}
