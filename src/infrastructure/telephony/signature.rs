//! Webhook request signature validation
//!
//! The provider signs every webhook with an HMAC-SHA1 over the exact
//! callback URL followed by the form parameters sorted by key, base64
//! encoded, using the account's pre-shared auth token. Because reverse
//! proxies rewrite URLs, validation checks the signature against every
//! candidate reconstruction of the callback URL and accepts if any matches.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Compute the expected signature for one candidate URL.
pub fn compute_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    BASE64.encode(signature_bytes(auth_token, url, params))
}

/// Validate a provider-supplied signature against every candidate URL.
/// Comparison is constant-time per candidate.
pub fn validate_signature(
    auth_token: &str,
    provided: &str,
    candidate_urls: &[String],
    params: &[(String, String)],
) -> bool {
    let Ok(provided_bytes) = BASE64.decode(provided.trim()) else {
        return false;
    };
    candidate_urls.iter().any(|url| {
        let mut mac = new_mac(auth_token);
        mac.update(signed_payload(url, params).as_bytes());
        mac.verify_slice(&provided_bytes).is_ok()
    })
}

/// Candidate callback URLs for a request: the URL as the service saw it,
/// and the public-base-rewritten equivalent when a public base is
/// configured (the form the provider actually signed behind a proxy).
pub fn candidate_urls(
    request_url: &str,
    public_base: Option<&str>,
    path_and_query: &str,
) -> Vec<String> {
    let mut candidates = vec![request_url.to_string()];
    if let Some(base) = public_base {
        let rewritten = format!("{}{}", base.trim_end_matches('/'), path_and_query);
        if !candidates.contains(&rewritten) {
            candidates.push(rewritten);
        }
    }
    candidates
}

fn signed_payload(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut data = url.to_string();
    for (key, value) in sorted {
        data.push_str(key);
        data.push_str(value);
    }
    data
}

fn signature_bytes(auth_token: &str, url: &str, params: &[(String, String)]) -> Vec<u8> {
    let mut mac = new_mac(auth_token);
    mac.update(signed_payload(url, params).as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn new_mac(auth_token: &str) -> HmacSha1 {
    // HMAC accepts keys of any length
    HmacSha1::new_from_slice(auth_token.as_bytes()).expect("hmac key")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_signature_accepted() {
        let token = "secret-token";
        let url = "https://app.example.com/voice/inbound";
        let form = params(&[("CallSid", "CA123"), ("From", "+14155550100")]);

        let signature = compute_signature(token, url, &form);
        assert!(validate_signature(
            token,
            &signature,
            &[url.to_string()],
            &form
        ));
    }

    #[test]
    fn test_parameter_order_does_not_matter() {
        let token = "secret-token";
        let url = "https://app.example.com/voice/inbound";
        let a = params(&[("From", "+14155550100"), ("CallSid", "CA123")]);
        let b = params(&[("CallSid", "CA123"), ("From", "+14155550100")]);

        assert_eq!(
            compute_signature(token, url, &a),
            compute_signature(token, url, &b)
        );
    }

    #[test]
    fn test_tampered_params_rejected() {
        let token = "secret-token";
        let url = "https://app.example.com/voice/inbound";
        let form = params(&[("CallSid", "CA123")]);
        let signature = compute_signature(token, url, &form);

        let tampered = params(&[("CallSid", "CA999")]);
        assert!(!validate_signature(
            token,
            &signature,
            &[url.to_string()],
            &tampered
        ));
    }

    #[test]
    fn test_wrong_token_rejected() {
        let url = "https://app.example.com/voice/inbound";
        let form = params(&[("CallSid", "CA123")]);
        let signature = compute_signature("right-token", url, &form);
        assert!(!validate_signature(
            "wrong-token",
            &signature,
            &[url.to_string()],
            &form
        ));
    }

    #[test]
    fn test_public_base_rewrite_accepted() {
        let token = "secret-token";
        // Provider signed the public URL; the request arrived on an
        // internal host behind the proxy.
        let public_url = "https://app.example.com/voice/inbound?x=1";
        let form = params(&[("CallSid", "CA123")]);
        let signature = compute_signature(token, public_url, &form);

        let candidates = candidate_urls(
            "http://10.0.0.5:8080/voice/inbound?x=1",
            Some("https://app.example.com"),
            "/voice/inbound?x=1",
        );
        assert_eq!(candidates.len(), 2);
        assert!(validate_signature(token, &signature, &candidates, &form));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(!validate_signature(
            "token",
            "not base64!!!",
            &["https://example.com/".to_string()],
            &[]
        ));
    }
}
