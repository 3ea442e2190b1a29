//! Input validation for outgoing messages and server settings

use reqwest::Url;

/// Longest text body accepted for a single message.
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Validates an outgoing message. A message needs text or a file.
///
/// Returns the sanitized text to send.
pub fn validate_outgoing(content: &str, has_file: bool) -> Result<String, String> {
    let content = sanitize_content(content);

    if content.is_empty() && !has_file {
        return Err("Message cannot be empty".to_string());
    }

    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(format!(
            "Message too long (max {} characters)",
            MAX_CONTENT_CHARS
        ));
    }

    Ok(content)
}

/// Trims surrounding whitespace and strips NUL and carriage returns
pub fn sanitize_content(content: &str) -> String {
    content
        .trim()
        .chars()
        .filter(|&c| c != '\r' && c != '\0')
        .collect()
}

/// Validates the chat server base URL (http or https with a host)
pub fn validate_server_url(url: &str) -> Result<Url, String> {
    if url.trim().is_empty() {
        return Err("Server URL cannot be empty".to_string());
    }

    let parsed = Url::parse(url.trim()).map_err(|e| format!("Invalid server URL: {}", e))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("Unsupported URL scheme: {}", parsed.scheme()));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("Server URL must include a host".to_string());
    }

    Ok(parsed)
}
