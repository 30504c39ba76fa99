//! Falls back to substring matching on a step's reported code/message
//! when the executor didn't self-classify its failure.

use orch_domain::enums::ErrorType;

/// Classify an unstructured failure. Executors that already know their
/// error's `ErrorType` should report it directly rather than relying
/// on this.
#[must_use]
pub fn classify_error(code: Option<&str>, message: &str) -> ErrorType {
    let haystack = format!("{} {}", code.unwrap_or(""), message).to_lowercase();

    let patterns: &[(&str, ErrorType)] = &[
        ("timeout", ErrorType::TimeoutError),
        ("timed out", ErrorType::TimeoutError),
        ("schema", ErrorType::SchemaError),
        ("validation", ErrorType::ValidationError),
        ("invalid", ErrorType::ValidationError),
        ("llm", ErrorType::LlmError),
        ("model", ErrorType::LlmError),
        ("completion", ErrorType::LlmError),
        ("git", ErrorType::GitError),
        ("merge conflict", ErrorType::GitError),
        ("network", ErrorType::NetworkError),
        ("connection", ErrorType::NetworkError),
        ("dns", ErrorType::NetworkError),
        ("database", ErrorType::DbError),
        ("sql", ErrorType::DbError),
        ("postgres", ErrorType::DbError),
        ("resource", ErrorType::ResourceError),
        ("quota", ErrorType::ResourceError),
        ("memory", ErrorType::ResourceError),
        ("execution", ErrorType::ExecutionError),
    ];

    patterns
        .iter()
        .find(|(needle, _)| haystack.contains(needle))
        .map_or(ErrorType::UnknownError, |(_, kind)| *kind)
}
