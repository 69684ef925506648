//! Message validation rules.

use callhub_core::error::AppError;
use callhub_core::types::ChatId;

/// Maximum chat id length.
const MAX_CHAT_ID_LEN: usize = 128;

/// Validates a raw inbound frame before decoding.
pub fn validate_inbound(raw: &str, max_bytes: usize) -> Result<(), AppError> {
    if raw.len() > max_bytes {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {max_bytes} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    Ok(())
}

/// Validates a chat room id.
pub fn validate_chat_id(chat_id: &ChatId) -> Result<(), AppError> {
    if chat_id.is_blank() || chat_id.as_str().len() > MAX_CHAT_ID_LEN {
        return Err(AppError::validation("Invalid chat id length"));
    }

    if !chat_id
        .as_str()
        .chars()
        .all(|c| c.is_alphanumeric() || c == ':' || c == '-' || c == '_')
    {
        return Err(AppError::validation("Chat id contains invalid characters"));
    }

    Ok(())
}
