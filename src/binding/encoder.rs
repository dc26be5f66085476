use std::io::Write;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use flate2::{Compression, write::DeflateEncoder};
use tracing::debug;

use super::{EncodeError, RELAY_STATE, SamlType};

/// Encode a message for the HTTP-POST binding.
///
/// Produces `<samlType>=<value>` or, with a relay state,
/// `RelayState=<relayState>&<samlType>=<value>`. The message is not compressed.
pub fn encode_post(saml_type: SamlType, message: &str, relay_state: Option<&str>) -> String {
    let encoded = urlencoding::encode(&BASE64.encode(message.as_bytes())).into_owned();
    debug!(%saml_type, len = encoded.len(), "encoded message for HTTP-POST");

    match relay_state {
        Some(relay_state) => format!(
            "{RELAY_STATE}={}&{saml_type}={encoded}",
            urlencoding::encode(relay_state)
        ),
        None => format!("{saml_type}={encoded}"),
    }
}

/// Encode a message for the HTTP-Redirect binding: raw DEFLATE, base64, URL-encoding.
pub fn encode_redirect(message: &str) -> Result<String, EncodeError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(message.as_bytes())?;
    let deflated = encoder.finish()?;

    let encoded = urlencoding::encode(&BASE64.encode(deflated)).into_owned();
    debug!(len = encoded.len(), "encoded message for HTTP-Redirect");
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_post_without_relay_state() {
        let encoded = encode_post(SamlType::Request, "<samlp:AuthnRequest/>", None);

        let expected = urlencoding::encode(&BASE64.encode("<samlp:AuthnRequest/>")).into_owned();
        assert_eq!(encoded, format!("SAMLRequest={expected}"));
    }

    #[test]
    fn test_encode_post_relay_state_first() {
        let encoded = encode_post(SamlType::Response, "<Response/>", Some("a b&c"));

        assert!(encoded.starts_with("RelayState=a%20b%26c&SAMLResponse="));
    }

    #[test]
    fn test_encode_post_url_encodes_base64() {
        // ">>>" base64-encodes to "Pj4+" which contains a '+'
        let encoded = encode_post(SamlType::Request, ">>>", None);
        assert_eq!(encoded, "SAMLRequest=Pj4%2B");
    }

    #[test]
    fn test_encode_redirect_is_raw_deflate() {
        let encoded = encode_redirect("hello hello hello").unwrap();
        let raw = BASE64
            .decode(urlencoding::decode(&encoded).unwrap().as_bytes())
            .unwrap();

        // A zlib stream starts with 0x78; raw deflate carries no such header
        assert_ne!(raw.first(), Some(&0x78));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_encode_redirect_multibyte() {
        let encoded: Result<String, EncodeError> = encode_redirect("Grüße ✓ 日本");
        assert!(encoded.unwrap().is_ascii());

        let error = EncodeError::from(std::io::Error::other("disk full"));
        assert_eq!(error.to_string(), "Deflating the message failed: disk full");
    }
}
