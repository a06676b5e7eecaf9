use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::error::{ClientError, Result};

/// Join an endpoint path onto a base URL, keeping any base path prefix
pub fn make_url(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    let prefix = base_url.path().trim_end_matches('/');
    url.set_path(&format!("{prefix}{path}"));
    url
}

/// Media type of a response, if declared
pub fn content_type(response: &reqwest::Response) -> Option<&str> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Turn a non-success response into `ClientError::Gateway`
pub async fn handle_error(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = parse_error_body(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());

    tracing::debug!(status = status.as_u16(), %message, "request rejected");

    Err(ClientError::Gateway {
        status: status.as_u16(),
        message,
    })
}

/// Extract `detail` or `error` from an error body, falling back to the raw text
pub fn parse_error_body(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }

    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return Some(body.to_owned());
    };

    let field = json
        .get("detail")
        .filter(|v| !v.is_null())
        .or_else(|| json.get("error").filter(|v| !v.is_null()));

    let message = match field {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(other) => other
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| other.to_string(), str::to_owned),
        None => body.to_owned(),
    };

    Some(message)
}
