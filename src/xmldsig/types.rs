//! Serde model of an enveloped `Signature` element.
//!
//! Serialized signatures carry the XML-DSig namespace as their default namespace, so no
//! prefix has to be declared in the enclosing message. Deserialization matches on local
//! names and accepts the usual `ds:` prefixed form as well.

use serde::{Deserialize, Serialize};

/// Generic XML element with algorithm attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmElement {
    #[serde(rename = "@Algorithm")]
    pub algorithm: String,
}

impl AlgorithmElement {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
        }
    }
}

pub type CanonicalizationMethod = AlgorithmElement;
pub type SignatureMethod = AlgorithmElement;
pub type DigestMethod = AlgorithmElement;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusiveNamespaces {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,
    #[serde(rename = "@PrefixList", default)]
    pub prefix_list: String,
}

impl InclusiveNamespaces {
    pub fn prefixes(&self) -> Vec<String> {
        self.prefix_list
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(rename = "@Algorithm")]
    pub algorithm: String,
    #[serde(
        rename = "InclusiveNamespaces",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub inclusive_namespaces: Option<InclusiveNamespaces>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transforms {
    #[serde(rename = "Transform", default)]
    pub transforms: Vec<Transform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "@URI", default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "Transforms", default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Transforms>,
    #[serde(rename = "DigestMethod")]
    pub digest_method: DigestMethod,
    #[serde(rename = "DigestValue")]
    pub digest_value: String,
}

impl Reference {
    pub fn transforms(&self) -> &[Transform] {
        self.transforms
            .as_ref()
            .map_or(&[], |transforms| transforms.transforms.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInfo {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,
    #[serde(rename = "CanonicalizationMethod")]
    pub canonicalization_method: CanonicalizationMethod,
    #[serde(rename = "SignatureMethod")]
    pub signature_method: SignatureMethod,
    #[serde(rename = "Reference", default)]
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureValue {
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509Data {
    #[serde(rename = "X509Certificate", default)]
    pub certificates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    #[serde(rename = "X509Data", default)]
    pub x509_data: Vec<X509Data>,
}

impl KeyInfo {
    /// Base64 certificates in document order
    pub fn certificates(&self) -> impl Iterator<Item = &str> {
        self.x509_data
            .iter()
            .flat_map(|data| data.certificates.iter().map(String::as_str))
    }
}

/// Complete XML Signature element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,
    #[serde(rename = "SignedInfo")]
    pub signed_info: SignedInfo,
    #[serde(rename = "SignatureValue")]
    pub signature_value: SignatureValue,
    #[serde(rename = "KeyInfo", default, skip_serializing_if = "Option::is_none")]
    pub key_info: Option<KeyInfo>,
}
