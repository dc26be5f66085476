//! SAML signature profile: what an enveloped signature on a protocol message may look like.

use super::{Result, SignError};
use crate::xmldsig::{SamlObject, Signature, XmlError, algorithms};

const ALLOWED_TRANSFORMS: [&str; 3] = [
    algorithms::ENVELOPED_SIGNATURE,
    algorithms::EXC_C14N,
    algorithms::EXC_C14N_WITH_COMMENTS,
];

fn violation(message: impl Into<String>) -> SignError {
    SignError::ProfileViolation(message.into())
}

/// Check `signature`, found under the element at `index`, against the SAML profile.
pub(super) fn validate(object: &SamlObject, index: usize, signature: &Signature) -> Result<()> {
    let node = object
        .element(index)
        .ok_or_else(|| XmlError::NotFound(format!("element #{index}")))?;

    let reference = match signature.signed_info.references.as_slice() {
        [reference] => reference,
        references => {
            return Err(violation(format!(
                "expected exactly one Reference, found {}",
                references.len()
            )));
        }
    };

    match reference.uri.as_deref().unwrap_or_default() {
        "" if index == 0 => {}
        "" => return Err(violation("empty Reference URI on a nested element")),
        uri => {
            let id = uri
                .strip_prefix('#')
                .ok_or_else(|| violation(format!("Reference URI '{uri}' is not local")))?;
            if node.id.as_deref() != Some(id) {
                return Err(violation(format!(
                    "Reference URI '{uri}' does not point at the signed <{}>",
                    node.name
                )));
            }
            if object.find_by_id(id).len() > 1 {
                return Err(violation(format!("ID '{id}' is not unique")));
            }
        }
    }

    let transforms = reference.transforms();
    if let Some(illegal) = transforms
        .iter()
        .find(|transform| !ALLOWED_TRANSFORMS.contains(&transform.algorithm.as_str()))
    {
        return Err(violation(format!("illegal transform {}", illegal.algorithm)));
    }
    if !transforms
        .iter()
        .any(|transform| transform.algorithm == algorithms::ENVELOPED_SIGNATURE)
    {
        return Err(violation("missing the enveloped-signature transform"));
    }
    Ok(())
}
