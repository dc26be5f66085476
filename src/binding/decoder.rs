use std::io::Read;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use flate2::read::DeflateDecoder;
use tracing::debug;

use super::DecodeError;

/// Decode an HTTP-POST message value: base64, then UTF-8.
///
/// The value is expected as it appears in the parsed form field, so no URL-decoding is
/// applied. Use [`decode_post_form_value`] for values taken from a raw request body.
pub fn decode_post(token: &str) -> Result<String, DecodeError> {
    let bytes = BASE64.decode(token.trim().as_bytes())?;
    Ok(String::from_utf8(bytes)?)
}

/// URL-decode a raw form value, then [`decode_post`] it.
pub fn decode_post_form_value(value: &str) -> Result<String, DecodeError> {
    let value = url_decode(value)?;
    decode_post(&value)
}

/// Decode an HTTP-Redirect message value: URL-decode, base64, raw inflate, UTF-8.
pub fn decode_redirect(token: &str) -> Result<String, DecodeError> {
    let value = url_decode(token)?;
    if is_linefeed_or_whitespace(&value) {
        debug!("redirect message holds only whitespace");
        return Err(DecodeError::LinefeedOrWhitespace);
    }

    let deflated = BASE64.decode(value.as_bytes())?;
    let mut inflated = Vec::new();
    DeflateDecoder::new(deflated.as_slice())
        .read_to_end(&mut inflated)
        .map_err(DecodeError::Inflate)?;

    Ok(String::from_utf8(inflated)?)
}

fn url_decode(value: &str) -> Result<String, DecodeError> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| DecodeError::UrlDecode(e.to_string()))
}

/// True for a non-empty value made only of space, tab, LF, VT, FF and CR.
pub(crate) fn is_linefeed_or_whitespace(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{SamlType, encode_post, encode_redirect};

    const AUTHN_REQUEST: &str = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_a1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"/>"#;

    #[test]
    fn test_redirect_round_trip() {
        let encoded = encode_redirect(AUTHN_REQUEST).unwrap();
        assert_eq!(decode_redirect(&encoded).unwrap(), AUTHN_REQUEST);
    }

    #[test]
    fn test_redirect_round_trip_empty() {
        let encoded = encode_redirect("").unwrap();
        assert_eq!(decode_redirect(&encoded).unwrap(), "");
    }

    #[test]
    fn test_post_round_trip() {
        let encoded = encode_post(SamlType::Request, AUTHN_REQUEST, None);
        let value = encoded.strip_prefix("SAMLRequest=").unwrap();

        assert_eq!(decode_post_form_value(value).unwrap(), AUTHN_REQUEST);
        let unescaped = urlencoding::decode(value).unwrap();
        assert_eq!(decode_post(&unescaped).unwrap(), AUTHN_REQUEST);
    }

    #[test]
    fn test_post_round_trip_empty() {
        let encoded = encode_post(SamlType::Response, "", None);
        assert_eq!(encoded, "SAMLResponse=");
        assert_eq!(decode_post("").unwrap(), "");
    }

    #[test]
    fn test_multibyte_round_trips() {
        let message = r#"<saml:Attribute Name="greeting">Grüße ✓ 日本</saml:Attribute>"#;

        let redirect = encode_redirect(message).unwrap();
        assert_eq!(decode_redirect(&redirect).unwrap(), message);

        let post = encode_post(SamlType::Response, message, Some("état"));
        let value = post.split_once("&SAMLResponse=").unwrap().1;
        assert_eq!(decode_post_form_value(value).unwrap(), message);
        assert_eq!(decode_post(&urlencoding::decode(value).unwrap()).unwrap(), message);
    }

    #[test]
    fn test_decode_post_invalid_base64() {
        assert!(matches!(
            decode_post("not*base64"),
            Err(DecodeError::Base64Decode(_))
        ));
    }

    #[test]
    fn test_decode_redirect_whitespace() {
        assert!(matches!(
            decode_redirect("%20%0A%09"),
            Err(DecodeError::LinefeedOrWhitespace)
        ));
        assert!(matches!(
            decode_redirect("\r\n"),
            Err(DecodeError::LinefeedOrWhitespace)
        ));
    }

    #[test]
    fn test_decode_redirect_invalid_url_encoding() {
        // %FF does not decode to valid UTF-8
        assert!(matches!(
            decode_redirect("%FF%FE"),
            Err(DecodeError::UrlDecode(_))
        ));
    }

    #[test]
    fn test_decode_redirect_invalid_base64() {
        assert!(matches!(
            decode_redirect("@@@@"),
            Err(DecodeError::Base64Decode(_))
        ));
    }

    #[test]
    fn test_decode_redirect_not_deflated() {
        // Valid base64 of bytes that are not a deflate stream (block type 3 is reserved)
        let token = BASE64.encode([0xFFu8, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            decode_redirect(&token),
            Err(DecodeError::Inflate(_))
        ));
    }

    #[test]
    fn test_whitespace_predicate() {
        assert!(is_linefeed_or_whitespace(" \t\n\x0B\x0C\r"));
        assert!(!is_linefeed_or_whitespace(""));
        assert!(!is_linefeed_or_whitespace(" a "));
    }
}
