//! Endpoint URLs for OpenAI-compatible providers.

const CHAT_COMPLETIONS: &str = "chat/completions";

/// Join `endpoint` onto `base_url` with exactly one slash between them.
///
/// ```
/// use simpl::utils::url::join_endpoint;
///
/// assert_eq!(
///     join_endpoint("http://localhost:11434/v1/", "/models"),
///     "http://localhost:11434/v1/models"
/// );
/// ```
pub fn join_endpoint(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim().trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// The streaming chat endpoint under `base_url`.
///
/// A base URL that already names the endpoint is used as-is, so pasting the
/// full URL from provider docs into `ai.base_url` still works.
pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with(CHAT_COMPLETIONS) {
        base.to_string()
    } else {
        join_endpoint(base, CHAT_COMPLETIONS)
    }
}
