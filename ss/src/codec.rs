//! Channel codec for tenant lifecycle events
//!
//! Wire format (plain text, no version field):
//!
//! ```text
//! {tenant}:{kind}
//! {tenant}:{kind}:{base64(utf8(json(settings)))}
//! ```
//!
//! Decoding never fails. Foreign or malformed strings come back as
//! [`ParseResult::Ignored`], and a `Reload` whose snapshot cannot be read comes back as
//! [`ParseResult::Degraded`] so the receiver can fall back to its own storage.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::debug;

use crate::domain::{EventKind, ShellEvent, TenantSettings};

/// Token separator on the wire
pub const SEPARATOR: char = ':';

/// Errors raised while encoding an outbound event
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Tenant name is empty")]
    EmptyTenantName,

    #[error("Tenant name '{0}' contains the separator ':'")]
    InvalidTenantName(String),

    #[error("Payload belongs to tenant '{found}', event targets '{expected}'")]
    TenantMismatch { expected: String, found: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why an inbound snapshot could not be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Payload is not valid base64: {0}")]
    Base64(String),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(String),

    #[error("Payload is not valid settings JSON: {0}")]
    Json(String),

    #[error("Payload belongs to tenant '{found}', event targets '{expected}'")]
    TenantMismatch { expected: String, found: String },
}

/// Why an inbound message was discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Fewer than two non-empty tokens
    TooFewTokens(usize),
    /// Kind token is neither `Initialize` nor `Reload`
    UnknownKind(String),
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewTokens(count) => write!(f, "expected at least 2 tokens, found {}", count),
            Self::UnknownKind(kind) => write!(f, "unknown event kind '{}'", kind),
        }
    }
}

/// Result of decoding a raw channel message
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// Well-formed event
    Event(ShellEvent),
    /// Reload whose payload was unusable; `event` carries no payload
    Degraded { event: ShellEvent, error: PayloadError },
    /// Not an event this protocol understands
    Ignored(IgnoreReason),
}

impl ParseResult {
    pub fn event(&self) -> Option<&ShellEvent> {
        match self {
            Self::Event(event) | Self::Degraded { event, .. } => Some(event),
            Self::Ignored(_) => None,
        }
    }

    pub fn into_event(self) -> Option<ShellEvent> {
        match self {
            Self::Event(event) | Self::Degraded { event, .. } => Some(event),
            Self::Ignored(_) => None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored(_))
    }
}

/// Encode an event for the channel
pub fn encode(event: &ShellEvent) -> Result<String, CodecError> {
    debug!(tenant = %event.tenant, kind = %event.kind, has_payload = event.payload.is_some(), "encode: called");
    if event.tenant.is_empty() {
        return Err(CodecError::EmptyTenantName);
    }
    if event.tenant.contains(SEPARATOR) {
        return Err(CodecError::InvalidTenantName(event.tenant.clone()));
    }

    match &event.payload {
        Some(settings) if event.kind == EventKind::Reload => {
            if settings.name != event.tenant {
                return Err(CodecError::TenantMismatch {
                    expected: event.tenant.clone(),
                    found: settings.name.clone(),
                });
            }
            let payload = encode_payload(settings)?;
            Ok(format!("{}{SEPARATOR}{}{SEPARATOR}{}", event.tenant, event.kind, payload))
        }
        _ => Ok(format!("{}{SEPARATOR}{}", event.tenant, event.kind)),
    }
}

/// Decode a raw channel message
pub fn decode(raw: &str) -> ParseResult {
    debug!(len = raw.len(), "decode: called");
    let tokens: Vec<&str> = raw.split(SEPARATOR).filter(|t| !t.is_empty()).collect();
    if tokens.len() < 2 {
        debug!(count = tokens.len(), "decode: too few tokens");
        return ParseResult::Ignored(IgnoreReason::TooFewTokens(tokens.len()));
    }

    let tenant = tokens[0].to_string();
    let kind = match tokens[1].parse::<EventKind>() {
        Ok(kind) => kind,
        Err(_) => {
            debug!(kind = tokens[1], "decode: unknown kind");
            return ParseResult::Ignored(IgnoreReason::UnknownKind(tokens[1].to_string()));
        }
    };

    let payload_token = match (kind, tokens.get(2)) {
        (EventKind::Reload, Some(token)) => *token,
        (EventKind::Initialize, _) => return ParseResult::Event(ShellEvent::initialize(tenant)),
        (EventKind::Reload, None) => return ParseResult::Event(ShellEvent::reload(tenant)),
    };

    match decode_payload(payload_token) {
        Ok(settings) if settings.name == tenant => ParseResult::Event(ShellEvent::reload_with(settings)),
        Ok(settings) => ParseResult::Degraded {
            error: PayloadError::TenantMismatch {
                expected: tenant.clone(),
                found: settings.name,
            },
            event: ShellEvent::reload(tenant),
        },
        Err(error) => {
            debug!(%error, "decode: payload unusable, degrading to payload-less reload");
            ParseResult::Degraded {
                event: ShellEvent::reload(tenant),
                error,
            }
        }
    }
}

/// Serialize a settings snapshot into its text-safe payload token
pub fn encode_payload(settings: &TenantSettings) -> Result<String, CodecError> {
    let json = serde_json::to_vec(settings)?;
    Ok(STANDARD.encode(json))
}

/// Parse a payload token back into a settings snapshot
pub fn decode_payload(token: &str) -> Result<TenantSettings, PayloadError> {
    let bytes = STANDARD
        .decode(token)
        .map_err(|e| PayloadError::Base64(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| PayloadError::Utf8(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| PayloadError::Json(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantState;
    use proptest::prelude::*;
    use serde_json::Value;

    fn snapshot() -> TenantSettings {
        TenantSettings::new("tenant")
            .with_state(TenantState::Running)
            .with_value("host", "tenant.example.com")
            .with_value("features", serde_json::json!(["blog", "media"]))
    }

    #[test]
    fn test_encode_without_payload() {
        assert_eq!(encode(&ShellEvent::initialize("alpha")).unwrap(), "alpha:Initialize");
        assert_eq!(encode(&ShellEvent::reload("alpha")).unwrap(), "alpha:Reload");
    }

    #[test]
    fn test_encode_with_payload_has_three_tokens() {
        let raw = encode(&ShellEvent::reload_with(snapshot())).unwrap();
        let tokens: Vec<&str> = raw.split(':').collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], "tenant");
        assert_eq!(tokens[1], "Reload");
        assert_eq!(decode_payload(tokens[2]).unwrap(), snapshot());
    }

    #[test]
    fn test_encode_rejects_unroundtrippable_names() {
        assert!(matches!(
            encode(&ShellEvent::reload("")),
            Err(CodecError::EmptyTenantName)
        ));
        assert!(matches!(
            encode(&ShellEvent::reload("a:b")),
            Err(CodecError::InvalidTenantName(_))
        ));

        let mut event = ShellEvent::reload_with(snapshot());
        event.tenant = "other".to_string();
        assert!(matches!(encode(&event), Err(CodecError::TenantMismatch { .. })));
    }

    #[test]
    fn test_decode_malformed_messages_never_panic() {
        assert_eq!(decode(""), ParseResult::Ignored(IgnoreReason::TooFewTokens(0)));
        assert_eq!(
            decode("onlyonetoken"),
            ParseResult::Ignored(IgnoreReason::TooFewTokens(1))
        );
        assert_eq!(
            decode("tenant:Bogus"),
            ParseResult::Ignored(IgnoreReason::UnknownKind("Bogus".to_string()))
        );

        match decode("tenant:Reload:not-base64!!") {
            ParseResult::Degraded { event, error } => {
                assert_eq!(event, ShellEvent::reload("tenant"));
                assert!(matches!(error, PayloadError::Base64(_)));
            }
            other => panic!("Expected degraded reload, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_discards_empty_tokens() {
        assert_eq!(
            decode("::alpha::Reload:"),
            ParseResult::Event(ShellEvent::reload("alpha"))
        );
        assert_eq!(decode(":::"), ParseResult::Ignored(IgnoreReason::TooFewTokens(0)));
    }

    #[test]
    fn test_decode_initialize_ignores_payload_token() {
        let payload = encode_payload(&snapshot()).unwrap();
        let raw = format!("tenant:Initialize:{}", payload);
        assert_eq!(decode(&raw), ParseResult::Event(ShellEvent::initialize("tenant")));
    }

    #[test]
    fn test_decode_bad_json_payload_degrades() {
        let token = STANDARD.encode(b"{not json");
        let result = decode(&format!("tenant:Reload:{}", token));
        assert!(matches!(
            result,
            ParseResult::Degraded {
                error: PayloadError::Json(_),
                ..
            }
        ));
        assert_eq!(result.event(), Some(&ShellEvent::reload("tenant")));
    }

    #[test]
    fn test_decode_non_utf8_payload_degrades() {
        let token = STANDARD.encode([0xff, 0xfe, 0xfd]);
        let result = decode(&format!("tenant:Reload:{}", token));
        assert!(matches!(
            result,
            ParseResult::Degraded {
                error: PayloadError::Utf8(_),
                ..
            }
        ));
    }

    #[test]
    fn test_float_values_survive_exactly() {
        for x in [1.0715660391465826e-75, -1.81996730402717e-179, -1.603964615428183e143, 0.1, f64::MAX] {
            let settings = snapshot().with_value("ratio", x);
            let raw = encode(&ShellEvent::reload_with(settings.clone())).unwrap();
            let decoded = decode(&raw).into_event().and_then(|e| e.payload).unwrap();
            assert_eq!(decoded, settings, "value {:e} changed on the wire", x);
            assert_eq!(decoded.value("ratio").and_then(Value::as_f64), Some(x));
        }
    }

    #[test]
    fn test_decode_payload_for_other_tenant_degrades() {
        let token = encode_payload(&TenantSettings::new("someone-else")).unwrap();
        match decode(&format!("tenant:Reload:{}", token)) {
            ParseResult::Degraded { event, error } => {
                assert!(event.payload.is_none());
                assert_eq!(
                    error,
                    PayloadError::TenantMismatch {
                        expected: "tenant".to_string(),
                        found: "someone-else".to_string(),
                    }
                );
            }
            other => panic!("Expected degraded reload, got {:?}", other),
        }
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::from),
            "[ -~]{0,24}".prop_map(Value::from),
        ]
    }

    fn arb_state() -> impl Strategy<Value = TenantState> {
        prop_oneof![
            Just(TenantState::Uninitialized),
            Just(TenantState::Running),
            Just(TenantState::Initializing),
            Just(TenantState::Disabled),
        ]
    }

    fn arb_event() -> impl Strategy<Value = ShellEvent> {
        let name = "[A-Za-z0-9_.-]{1,16}";
        prop_oneof![
            name.prop_map(ShellEvent::initialize),
            name.prop_map(ShellEvent::reload),
            (
                name,
                arb_state(),
                proptest::collection::btree_map("[a-z]{1,8}", arb_value(), 0..6)
            )
                .prop_map(|(name, state, config)| {
                    ShellEvent::reload_with(TenantSettings { name, state, config })
                }),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(event in arb_event()) {
            let raw = encode(&event).unwrap();
            prop_assert_eq!(decode(&raw), ParseResult::Event(event));
        }

        #[test]
        fn prop_decode_total_on_arbitrary_input(raw in "\\PC{0,64}") {
            let _ = decode(&raw);
        }
    }
}
