use crate::crypto::errors::CryptoResult;
use openssl::hash::MessageDigest;
use openssl::x509::X509Ref;

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(length: usize) -> CryptoResult<Vec<u8>> {
    let mut buf = vec![0u8; length];
    openssl::rand::rand_bytes(&mut buf)?;
    Ok(buf)
}

/// Lowercase hex SHA-1 fingerprint of a certificate, used to identify credentials in logs
pub fn certificate_fingerprint(cert: &X509Ref) -> CryptoResult<String> {
    Ok(hex::encode(cert.digest(MessageDigest::sha1())?))
}

/// Strip every whitespace character, as found in line-wrapped base64 element text
pub fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_random_bytes() -> CryptoResult<()> {
        let first = generate_random_bytes(32)?;
        let second = generate_random_bytes(32)?;
        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn test_strip_whitespace() {
        assert_eq!(strip_whitespace(" MIIB\r\n  Ag==\t"), "MIIBAg==");
        assert_eq!(strip_whitespace(""), "");
    }
}
