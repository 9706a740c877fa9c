//! Versioned text codec for session descriptors.
//!
//! Descriptors cross the signaling channel as short safe-text tokens: a
//! one-character scheme marker followed by URL-safe base64 of the payload
//! bytes. Scheme `0` is plain JSON, scheme `1` is deflate-compressed JSON
//! (available behind the `deflate-token` feature). Tokens produced by
//! older builds carry no marker and are bare base64 of the JSON; the
//! decoder still accepts those.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;

use crate::error::DecodeError;

/// Scheme marker for uncompressed payloads.
const SCHEME_PLAIN: char = '0';
/// Scheme marker for deflate-compressed payloads.
const SCHEME_DEFLATE: char = '1';

/// Whether a descriptor opens or answers a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Offer,
    Answer,
}

impl DescriptorKind {
    fn tag(&self) -> &'static str {
        match self {
            DescriptorKind::Offer => "o",
            DescriptorKind::Answer => "a",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "o" | "offer" => Some(DescriptorKind::Offer),
            "a" | "answer" => Some(DescriptorKind::Answer),
            _ => None,
        }
    }
}

impl std::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorKind::Offer => write!(f, "offer"),
            DescriptorKind::Answer => write!(f, "answer"),
        }
    }
}

/// A session description ready to cross the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub kind: DescriptorKind,
    /// The transport-level description body (SDP text).
    pub body: String,
}

impl SessionDescriptor {
    pub fn offer(body: impl Into<String>) -> Self {
        SessionDescriptor {
            kind: DescriptorKind::Offer,
            body: body.into(),
        }
    }

    pub fn answer(body: impl Into<String>) -> Self {
        SessionDescriptor {
            kind: DescriptorKind::Answer,
            body: body.into(),
        }
    }
}

/// An encoded descriptor token, safe to paste through chat or URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload(String);

impl EncodedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for EncodedPayload {
    fn from(s: String) -> Self {
        EncodedPayload(s)
    }
}

impl std::fmt::Display for EncodedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a descriptor into its token form.
///
/// Prefers the deflate scheme when compiled in; a compression failure
/// degrades to the plain scheme rather than failing the encode.
pub fn encode(descriptor: &SessionDescriptor) -> EncodedPayload {
    let json = serde_json::json!({
        "t": descriptor.kind.tag(),
        "s": descriptor.body,
    })
    .to_string();

    #[cfg(feature = "deflate-token")]
    if let Some(compressed) = deflate(json.as_bytes()) {
        let mut token = String::with_capacity(compressed.len() * 4 / 3 + 2);
        token.push(SCHEME_DEFLATE);
        URL_SAFE_NO_PAD.encode_string(&compressed, &mut token);
        return EncodedPayload(token);
    }

    let mut token = String::with_capacity(json.len() * 4 / 3 + 2);
    token.push(SCHEME_PLAIN);
    URL_SAFE_NO_PAD.encode_string(json.as_bytes(), &mut token);
    EncodedPayload(token)
}

/// Decode a token back into a descriptor.
///
/// Strips all whitespace first so tokens mangled by copy/paste or line
/// wrapping still parse.
pub fn decode(token: &str) -> Result<SessionDescriptor, DecodeError> {
    let cleaned: String = token.chars().filter(|c| !c.is_whitespace()).collect();
    let mut chars = cleaned.chars();
    let marker = chars.next().ok_or(DecodeError::InvalidText)?;
    let rest = chars.as_str();

    match marker {
        SCHEME_PLAIN => {
            let bytes = URL_SAFE_NO_PAD
                .decode(rest)
                .map_err(|_| DecodeError::InvalidText)?;
            parse_descriptor(&bytes)
        }
        SCHEME_DEFLATE => {
            let bytes = URL_SAFE_NO_PAD
                .decode(rest)
                .map_err(|_| DecodeError::InvalidText)?;
            let json = inflate(&bytes)?;
            parse_descriptor(&json)
        }
        _ => decode_legacy(&cleaned, marker),
    }
}

/// Legacy tokens are bare base64 of the JSON with no scheme marker. The
/// JSON always opens with `{`, so a legacy token never starts with `0`
/// or `1` and dispatch on the marker is unambiguous.
fn decode_legacy(token: &str, marker: char) -> Result<SessionDescriptor, DecodeError> {
    // Older encoders padded; tokens relayed through URL rewriters may
    // arrive in the URL-safe alphabet instead. Accept both.
    let bytes = STANDARD
        .decode(token)
        .or_else(|_| URL_SAFE_NO_PAD.decode(token))
        .map_err(|_| DecodeError::UnknownScheme(marker))?;
    parse_descriptor(&bytes)
}

fn parse_descriptor(bytes: &[u8]) -> Result<SessionDescriptor, DecodeError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    // Compact form {"t","s"}; legacy encoders wrote {"type","sdp"}.
    let tag = value
        .get("t")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::Malformed("missing descriptor kind".into()))?;
    let kind = DescriptorKind::from_tag(tag)
        .ok_or_else(|| DecodeError::Malformed(format!("unknown descriptor kind {tag:?}")))?;
    let body = value
        .get("s")
        .or_else(|| value.get("sdp"))
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::Malformed("missing description body".into()))?;

    if body.is_empty() {
        return Err(DecodeError::Malformed("empty description body".into()));
    }

    Ok(SessionDescriptor {
        kind,
        body: body.to_string(),
    })
}

#[cfg(feature = "deflate-token")]
fn deflate(bytes: &[u8]) -> Option<Vec<u8>> {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).ok()?;
    encoder.finish().ok()
}

#[cfg(feature = "deflate-token")]
fn inflate(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    let mut out = Vec::new();
    DeflateDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    Ok(out)
}

#[cfg(not(feature = "deflate-token"))]
fn inflate(_bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    Err(DecodeError::UnsupportedScheme("deflate"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SDP: &str = "v=0\r\no=- 46117317 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

    #[test]
    fn test_encode_decode_offer() {
        let descriptor = SessionDescriptor::offer(SAMPLE_SDP);
        let token = encode(&descriptor);
        let decoded = decode(token.as_str()).expect("decode");
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_encode_decode_answer() {
        let descriptor = SessionDescriptor::answer(SAMPLE_SDP);
        let token = encode(&descriptor);
        let decoded = decode(token.as_str()).expect("decode");
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_round_trip_multi_kilobyte_body() {
        // Many-candidate SDP bodies reach tens of kilobytes.
        let candidate = "a=candidate:1234567890 1 udp 2122260223 192.168.1.100 54321 \
                         typ host generation 0 network-id 1\r\n";
        let mut body = String::from(SAMPLE_SDP);
        while body.len() < 50 * 1024 {
            body.push_str(candidate);
        }
        let descriptor = SessionDescriptor::offer(body);
        let decoded = decode(encode(&descriptor).as_str()).expect("decode large token");
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_token_is_safe_text() {
        let token = encode(&SessionDescriptor::offer(SAMPLE_SDP));
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_strips_whitespace() {
        let token = encode(&SessionDescriptor::offer(SAMPLE_SDP)).into_string();
        let mut wrapped = String::new();
        for (i, c) in token.chars().enumerate() {
            if i > 0 && i % 20 == 0 {
                wrapped.push('\n');
            }
            wrapped.push(c);
        }
        let padded = format!("  {wrapped}\t\n");
        let decoded = decode(&padded).expect("decode");
        assert_eq!(decoded.body, SAMPLE_SDP);
    }

    #[test]
    fn test_decode_legacy_compact_json() {
        let json = format!("{{\"t\":\"o\",\"s\":{}}}", serde_json::json!(SAMPLE_SDP));
        let token = STANDARD.encode(json.as_bytes());
        let decoded = decode(&token).expect("decode legacy");
        assert_eq!(decoded.kind, DescriptorKind::Offer);
        assert_eq!(decoded.body, SAMPLE_SDP);
    }

    #[test]
    fn test_decode_legacy_long_field_names() {
        let json = format!(
            "{{\"type\":\"answer\",\"sdp\":{}}}",
            serde_json::json!(SAMPLE_SDP)
        );
        let token = STANDARD.encode(json.as_bytes());
        let decoded = decode(&token).expect("decode legacy");
        assert_eq!(decoded.kind, DescriptorKind::Answer);
        assert_eq!(decoded.body, SAMPLE_SDP);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(""), Err(DecodeError::InvalidText)));
        assert!(decode("!!!not base64!!!").is_err());
        let not_json = STANDARD.encode(b"hello world");
        assert!(matches!(decode(&not_json), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let json = b"{\"t\":\"x\",\"s\":\"v=0\"}";
        let mut token = String::from("0");
        URL_SAFE_NO_PAD.encode_string(json, &mut token);
        assert!(matches!(decode(&token), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_empty_body() {
        let json = b"{\"t\":\"o\",\"s\":\"\"}";
        let mut token = String::from("0");
        URL_SAFE_NO_PAD.encode_string(json, &mut token);
        assert!(matches!(decode(&token), Err(DecodeError::Malformed(_))));
    }

    #[cfg(feature = "deflate-token")]
    #[test]
    fn test_deflate_token_round_trip() {
        let token = encode(&SessionDescriptor::offer(SAMPLE_SDP));
        assert!(token.as_str().starts_with('1'));
        let decoded = decode(token.as_str()).expect("decode");
        assert_eq!(decoded.body, SAMPLE_SDP);
    }

    #[cfg(feature = "deflate-token")]
    #[test]
    fn test_corrupt_deflate_payload() {
        let mut token = String::from("1");
        URL_SAFE_NO_PAD.encode_string(b"\xff\xff\xff\xff", &mut token);
        assert!(matches!(decode(&token), Err(DecodeError::Corrupt(_))));
    }

    #[test]
    fn test_plain_scheme_always_decodes() {
        let json = format!("{{\"t\":\"o\",\"s\":{}}}", serde_json::json!(SAMPLE_SDP));
        let mut token = String::from("0");
        URL_SAFE_NO_PAD.encode_string(json.as_bytes(), &mut token);
        let decoded = decode(&token).expect("decode");
        assert_eq!(decoded.body, SAMPLE_SDP);
    }
}
