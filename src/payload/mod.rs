//! Provider payload construction for the HTTP channel.
//!
//! Each provider expects a different request body shape. The engine branches
//! on the configured provider kind and renders the documented shape; custom
//! providers bring their own template with `{variable}` placeholders. A
//! missing or unrenderable custom template falls back to the generic shape.

use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::config::{HttpChannelConfig, ProviderKind};
use crate::store::MessageId;

/// Sender id used when the tenant has not configured one.
const DEFAULT_SENDER_ID: &str = "MessageHub";

/// Inputs for payload rendering.
#[derive(Debug, Clone)]
pub struct PayloadInput<'a> {
    pub message_id: MessageId,
    pub tenant_key: &'a str,
    pub recipient: &'a str,
    pub content: &'a str,
}

/// Build the JSON request body for the configured provider.
pub fn build_payload(input: &PayloadInput<'_>, config: &HttpChannelConfig) -> String {
    let sender = config.sender_id.as_deref().unwrap_or(DEFAULT_SENDER_ID);
    let timestamp = Utc::now().to_rfc3339();

    let body = match config.provider {
        ProviderKind::Generic => json!({
            "to": input.recipient,
            "text": input.content,
            "from": sender,
            "timestamp": timestamp,
        }),
        ProviderKind::Twilio => json!({
            "To": input.recipient,
            "From": sender,
            "Body": input.content,
        }),
        ProviderKind::Vonage => json!({
            "api_key": config.api_key,
            "api_secret": config.api_secret.as_deref().unwrap_or_default(),
            "to": input.recipient,
            "from": sender,
            "text": input.content,
            "type": "text",
        }),
        ProviderKind::MessageBird => json!({
            "recipients": [input.recipient],
            "originator": sender,
            "body": input.content,
            "params": { "datacoding": "auto" },
        }),
        ProviderKind::TextMagic => json!({
            "text": input.content,
            "phones": input.recipient,
            "from": sender,
        }),
        ProviderKind::Custom => {
            return render_custom(input, config, sender, &timestamp);
        }
    };

    body.to_string()
}

/// Render a custom template, falling back to the generic shape when the
/// template is absent or produces invalid JSON.
fn render_custom(
    input: &PayloadInput<'_>,
    config: &HttpChannelConfig,
    sender: &str,
    timestamp: &str,
) -> String {
    let template = match config.payload_template.as_deref() {
        Some(t) => t,
        None => {
            warn!(
                tenant = %input.tenant_key,
                "custom provider without payload template, falling back to generic"
            );
            return generic_fallback(input, sender, timestamp);
        }
    };

    let rendered = substitute(template, input, config, sender, timestamp);

    // The rendered template must be a well-formed JSON document.
    if serde_json::from_str::<serde_json::Value>(&rendered).is_err() {
        warn!(
            tenant = %input.tenant_key,
            "custom payload template rendered invalid JSON, falling back to generic"
        );
        return generic_fallback(input, sender, timestamp);
    }

    rendered
}

fn generic_fallback(input: &PayloadInput<'_>, sender: &str, timestamp: &str) -> String {
    json!({
        "to": input.recipient,
        "text": input.content,
        "from": sender,
        "timestamp": timestamp,
    })
    .to_string()
}

/// Replace `{variable}` placeholders. Values are JSON-escaped so templates
/// can place them inside string literals.
fn substitute(
    template: &str,
    input: &PayloadInput<'_>,
    config: &HttpChannelConfig,
    sender: &str,
    timestamp: &str,
) -> String {
    let escape = |s: &str| {
        let quoted = serde_json::Value::String(s.to_string()).to_string();
        quoted[1..quoted.len() - 1].to_string()
    };

    let message_id = input.message_id.to_string();
    let vars: [(&str, String); 7] = [
        ("recipient", escape(input.recipient)),
        ("message", escape(input.content)),
        ("senderId", escape(sender)),
        ("apiKey", escape(&config.api_key)),
        ("timestamp", escape(timestamp)),
        ("messageId", escape(&message_id)),
        ("tenantId", escape(input.tenant_key)),
    ];

    let mut rendered = template.to_string();
    for (name, value) in vars {
        rendered = rendered.replace(&format!("{{{name}}}"), &value);
    }
    rendered
}
