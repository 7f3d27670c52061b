//! Detection of the CLI's synthetic authentication errors.
//!
//! Without credentials the CLI does not fail outright. It emits an assistant
//! message from the sentinel model `<synthetic>` with zero usage whose text
//! tells the user to log in, followed by an error result of the same shape.
//! Both the text and the zero usage must match: the same words can appear in
//! real model output.

use crate::protocol::{AssistantMessage, ResultMessage, Usage};
use crate::Error;

/// Model name the CLI puts on messages it generates itself.
pub const SYNTHETIC_MODEL: &str = "<synthetic>";

const AUTH_ERROR_MARKER: &str = "Invalid API key";
const LOGIN_HINT_MARKER: &str = "/login";

/// Check whether text reads like the CLI's missing-credentials notice.
pub fn is_auth_error_text(text: &str) -> bool {
    text.contains(AUTH_ERROR_MARKER) && text.contains(LOGIN_HINT_MARKER)
}

fn zero_usage(usage: Option<&Usage>) -> bool {
    usage.map_or(true, Usage::is_zero)
}

/// Check whether an assistant message is a synthetic auth notice to suppress.
pub fn is_synthetic_auth_assistant(message: &AssistantMessage) -> bool {
    let content = &message.message;
    content.model == SYNTHETIC_MODEL
        && zero_usage(content.usage.as_ref())
        && is_auth_error_text(&content.text())
}

/// Translate a synthetic auth result into the error that ends the stream.
pub fn synthetic_auth_result(result: &ResultMessage) -> Option<Error> {
    if !result.is_error() || !zero_usage(result.usage.as_ref()) {
        return None;
    }
    let text = result.result.as_deref()?;
    is_auth_error_text(text).then(|| Error::AuthenticationRequired {
        detail: text.trim().to_string(),
    })
}
