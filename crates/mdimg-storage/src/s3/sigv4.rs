//! AWS Signature Version 4 request signing.
//!
//! Only what S3-compatible PUT/DELETE requests need: a canonical request with
//! signed headers, the string to sign and the derived signing key.

use hmac::{Hmac, Mac};
use mdimg_core::StorageError;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// SHA-256 of the empty string.
pub(crate) const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Configuration(format!("invalid signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode an object key for the canonical URI.
///
/// Each `/`-separated segment is encoded on its own, so separators survive.
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Request parts covered by the signature.
#[derive(Debug, Clone)]
pub(crate) struct CanonicalRequest<'a> {
    pub method: &'a str,
    /// Already URI-encoded path.
    pub path: &'a str,
    /// Already encoded and sorted query string, or empty.
    pub query: &'a str,
    /// Header names lowercase, values trimmed.
    pub headers: Vec<(String, String)>,
    pub payload_hash: &'a str,
}

impl CanonicalRequest<'_> {
    fn sorted_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(n, v)| (n.to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        headers.sort();
        headers
    }

    pub fn signed_headers(&self) -> String {
        self.sorted_headers()
            .into_iter()
            .map(|(n, _)| n)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn render(&self) -> String {
        let headers = self.sorted_headers();
        let canonical_headers: String = headers
            .iter()
            .map(|(n, v)| format!("{n}:{v}\n"))
            .collect();
        format!(
            "{}\n{}\n{}\n{canonical_headers}\n{}\n{}",
            self.method,
            self.path,
            self.query,
            self.signed_headers(),
            self.payload_hash
        )
    }
}

/// Signing key for `date` (`YYYYMMDD`).
pub(crate) fn signing_key(
    secret_access_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, StorageError> {
    let k_date = hmac(format!("AWS4{secret_access_key}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

/// Credential scope and signing inputs for one request.
#[derive(Debug, Clone)]
pub(crate) struct Signer<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

impl Signer<'_> {
    fn scope(&self, date: &str) -> String {
        format!("{date}/{}/{}/aws4_request", self.region, self.service)
    }

    /// Hex signature of `request` at `amz_date` (`YYYYMMDDTHHMMSSZ`).
    pub fn signature(
        &self,
        request: &CanonicalRequest<'_>,
        amz_date: &str,
    ) -> Result<String, StorageError> {
        let date = amz_date.get(..8).ok_or_else(|| {
            StorageError::Configuration(format!("malformed request date '{amz_date}'"))
        })?;
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{}\n{}",
            self.scope(date),
            sha256_hex(request.render().as_bytes())
        );
        let key = signing_key(self.secret_access_key, date, self.region, self.service)?;
        Ok(hex::encode(hmac(&key, string_to_sign.as_bytes())?))
    }

    /// Value of the `Authorization` header for `request`.
    pub fn authorization(
        &self,
        request: &CanonicalRequest<'_>,
        amz_date: &str,
    ) -> Result<String, StorageError> {
        let signature = self.signature(request, amz_date)?;
        let date = amz_date.get(..8).unwrap_or(amz_date);
        Ok(format!(
            "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={signature}",
            self.access_key_id,
            self.scope(date),
            request.signed_headers()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn test_signing_key_matches_published_example() {
        let key = signing_key(SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    fn list_users() -> CanonicalRequest<'static> {
        CanonicalRequest {
            method: "GET",
            path: "/",
            query: "Action=ListUsers&Version=2010-05-08",
            headers: vec![
                ("Host".to_string(), "iam.amazonaws.com".to_string()),
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded; charset=utf-8".to_string(),
                ),
                ("X-Amz-Date".to_string(), "20150830T123600Z".to_string()),
            ],
            payload_hash: EMPTY_PAYLOAD_HASH,
        }
    }

    #[test]
    fn test_canonical_request_layout() {
        let request = list_users();
        assert_eq!(request.signed_headers(), "content-type;host;x-amz-date");
        assert_eq!(
            sha256_hex(request.render().as_bytes()),
            "f536975d06c0309214f805bb90ccff089219ecd68b2577efef23edd43b7e1a59"
        );
    }

    #[test]
    fn test_signature_matches_published_example() {
        let signer = Signer {
            access_key_id: "AKIDEXAMPLE",
            secret_access_key: SECRET,
            region: "us-east-1",
            service: "iam",
        };
        let request = list_users();
        assert_eq!(
            signer.signature(&request, "20150830T123600Z").unwrap(),
            "5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
        let header = signer.authorization(&request, "20150830T123600Z").unwrap();
        assert!(header.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, SignedHeaders=content-type;host;x-amz-date, Signature="
        ));
    }

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(encode_key("images/a b+c.png"), "images/a%20b%2Bc.png");
        assert_eq!(encode_key("~x_y-z."), "~x_y-z.");
        assert_eq!(encode_key("images/t/image_0.png"), "images/t/image_0.png");
    }
}
