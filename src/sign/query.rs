use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::x509::X509;
use tracing::debug;

use super::engine::{sign_detached, verify_detached};
use super::{Result, SignError, SignatureAlgorithm, SignatureService};
use crate::binding::{
    EncodedBindingMessage, RELAY_STATE, RedirectSignature, SIG_ALG, SamlType,
    is_linefeed_or_whitespace,
};
use crate::crypto::strip_whitespace;

const PEM_LINE_LENGTH: usize = 64;

/// Build the octets a Redirect binding signature covers.
///
/// All values must already be in their query string (URL-encoded) form.
pub fn redirect_signing_input(
    saml_type: SamlType,
    payload: &str,
    relay_state: Option<&str>,
    sig_alg: &str,
) -> String {
    let mut input = format!("{}={payload}", saml_type.param_name());
    if let Some(relay_state) = relay_state {
        input.push_str(&format!("&{RELAY_STATE}={relay_state}"));
    }
    input.push_str(&format!("&{SIG_ALG}={sig_alg}"));
    input
}

/// Parse a bare base64 DER certificate by wrapping it in PEM delimiters.
pub fn certificate_from_base64(encoded: &str) -> Result<X509> {
    let body = strip_whitespace(encoded);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in body.as_bytes().chunks(PEM_LINE_LENGTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");

    X509::from_pem(pem.as_bytes()).map_err(|e| {
        debug!("certificate rejected: {e}");
        SignError::InvalidCertificate(e.to_string())
    })
}

impl SignatureService {
    /// Sign an already encoded Redirect binding payload with the local signing identity.
    ///
    /// `relay_state` is taken raw and URL-encoded into the result.
    pub fn sign_uri_string(
        &self,
        saml_type: SamlType,
        payload: &str,
        relay_state: Option<&str>,
    ) -> Result<EncodedBindingMessage> {
        let identity = self.credentials.signing_identity();
        let algorithm = SignatureAlgorithm::for_identity(identity)?;
        debug!(alias = identity.alias(), %algorithm, "signing redirect query string");

        let sig_alg = urlencoding::encode(algorithm.uri()).into_owned();
        let relay_state = relay_state.map(|value| urlencoding::encode(value).into_owned());
        let input = redirect_signing_input(saml_type, payload, relay_state.as_deref(), &sig_alg);

        let raw = sign_detached(algorithm, identity.private_key(), input.as_bytes())?;
        let signature = urlencoding::encode(&BASE64.encode(raw)).into_owned();

        let mut message = EncodedBindingMessage::new(saml_type, payload)
            .with_signature(RedirectSignature { sig_alg, signature });
        if let Some(relay_state) = relay_state {
            message = message.with_relay_state(relay_state);
        }
        Ok(message)
    }

    /// Verify a Redirect binding signature against `certificate` (bare base64 DER).
    ///
    /// `encoded_payload`, `relay_state`, `signature` and `sig_alg` are the values exactly as
    /// they appeared in the query string. A signature that does not match yields
    /// `Ok(false)`; malformed input is an error.
    pub fn validate_signature(
        &self,
        saml_type: SamlType,
        encoded_payload: &str,
        relay_state: Option<&str>,
        signature: Option<&str>,
        sig_alg: Option<&str>,
        certificate: &str,
    ) -> Result<bool> {
        let sig_alg = sig_alg.ok_or(SignError::SigAlgNotProvided)?;
        let signature = signature.ok_or(SignError::SignatureNotProvided)?;

        let input = redirect_signing_input(saml_type, encoded_payload, relay_state, sig_alg);
        let certificate = certificate_from_base64(certificate)?;

        let algorithm = SignatureAlgorithm::from_uri(&urlencoding::decode(sig_alg)?)?;
        let decoded = BASE64.decode(urlencoding::decode(signature)?.as_bytes())?;
        if is_linefeed_or_whitespace(&String::from_utf8_lossy(&decoded)) {
            debug!("redirect signature decodes to whitespace");
            return Err(SignError::LinefeedOrWhitespace);
        }

        let key = certificate.public_key()?;
        let valid = verify_detached(algorithm, &key, input.as_bytes(), &decoded)?;
        debug!(%algorithm, valid, "redirect signature checked");
        Ok(valid)
    }

    /// [`SignatureService::validate_signature`] over the parameters of `message`.
    pub fn validate_message(
        &self,
        message: &EncodedBindingMessage,
        certificate: &str,
    ) -> Result<bool> {
        let signature = message.signature.as_ref();
        self.validate_signature(
            message.saml_type,
            &message.payload,
            message.relay_state.as_deref(),
            signature.map(|s| s.signature.as_str()),
            signature.map(|s| s.sig_alg.as_str()),
            certificate,
        )
    }
}
