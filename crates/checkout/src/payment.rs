//! Redirect payment gateway: signed redirect URLs and callback
//! verification.
//!
//! The gateway never gets a server-to-server confirmation channel in
//! this flow; everything rides on the signed query string. The same
//! canonicalization (sort parameters by name, form-encode values, join
//! with `&`) is used both to sign the outgoing redirect and to verify
//! the inbound return callback, with HMAC-SHA512 over the shared
//! secret.

use std::collections::BTreeMap;

use chrono::Utc;
use domain::{Money, OrderCode};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use thiserror::Error;

type HmacSha512 = Hmac<Sha512>;

/// Query parameter carrying the order code.
pub const PARAM_TXN_REF: &str = "txn_ref";
/// Query parameter carrying the gateway's result code.
pub const PARAM_RESPONSE_CODE: &str = "response_code";
/// Query parameter carrying the signature itself.
pub const PARAM_SIGNATURE: &str = "signature";
/// Optional parameter naming the signature algorithm; excluded from
/// the signed set like the signature.
pub const PARAM_SIGNATURE_TYPE: &str = "signature_type";
/// The response code the gateway sends for a successful payment.
pub const SUCCESS_RESPONSE_CODE: &str = "00";

/// Errors from the payment gateway boundary.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway credentials or URLs are not configured.
    #[error("payment gateway not configured: {0}")]
    NotConfigured(&'static str),
}

/// Static configuration for the redirect gateway.
#[derive(Debug, Clone)]
pub struct PaymentGatewayConfig {
    /// Merchant code issued by the gateway.
    pub merchant_code: String,
    /// Shared HMAC secret.
    pub secret: String,
    /// Base URL the buyer is redirected to.
    pub gateway_url: String,
    /// URL the gateway sends the buyer back to.
    pub return_url: String,
}

/// Builds redirect URLs and validates return callbacks.
pub trait PaymentGateway: Send + Sync {
    /// Builds the full redirect URL for an off-site payment.
    fn build_redirect_url(
        &self,
        order_code: &OrderCode,
        amount: Money,
        client_ip: &str,
    ) -> Result<String, PaymentError>;

    /// Recomputes the signature over the canonicalized parameter set and
    /// compares it to the one the gateway sent. Never mutates state.
    fn verify_callback(&self, params: &BTreeMap<String, String>) -> bool;
}

/// Form-encodes a value: unreserved bytes pass through, space becomes
/// `+`, everything else is percent-encoded.
fn form_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// The HMAC-signing redirect gateway implementation.
#[derive(Debug, Clone)]
pub struct RedirectGateway {
    config: PaymentGatewayConfig,
}

impl RedirectGateway {
    /// Creates a gateway from its configuration.
    pub fn new(config: PaymentGatewayConfig) -> Self {
        Self { config }
    }

    /// The canonical signing input: parameters sorted by name,
    /// form-encoded values, joined `name=value&...`. The signature
    /// parameters themselves are excluded.
    fn canonical_query(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .filter(|(k, _)| k.as_str() != PARAM_SIGNATURE && k.as_str() != PARAM_SIGNATURE_TYPE)
            .map(|(k, v)| format!("{}={}", k, form_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Signs a parameter set, returning the lowercase hex digest.
    pub fn sign(&self, params: &BTreeMap<String, String>) -> String {
        let data = Self::canonical_query(params);
        let mut mac = HmacSha512::new_from_slice(self.config.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl PaymentGateway for RedirectGateway {
    fn build_redirect_url(
        &self,
        order_code: &OrderCode,
        amount: Money,
        client_ip: &str,
    ) -> Result<String, PaymentError> {
        if self.config.merchant_code.is_empty() || self.config.secret.is_empty() {
            return Err(PaymentError::NotConfigured("merchant code or secret"));
        }
        if self.config.gateway_url.is_empty() || self.config.return_url.is_empty() {
            return Err(PaymentError::NotConfigured("gateway or return URL"));
        }

        let mut params = BTreeMap::new();
        params.insert("version".to_string(), "2.1.0".to_string());
        params.insert("command".to_string(), "pay".to_string());
        params.insert("merchant".to_string(), self.config.merchant_code.clone());
        params.insert("locale".to_string(), "vn".to_string());
        params.insert("currency".to_string(), "VND".to_string());
        params.insert(PARAM_TXN_REF.to_string(), order_code.to_string());
        params.insert(
            "order_info".to_string(),
            format!("Payment for order {order_code}"),
        );
        params.insert("order_type".to_string(), "other".to_string());
        // The gateway wire format counts in hundredths of a unit.
        params.insert("amount".to_string(), (amount.amount() * 100).to_string());
        params.insert("return_url".to_string(), self.config.return_url.clone());
        params.insert("client_ip".to_string(), client_ip.to_string());
        params.insert(
            "create_date".to_string(),
            Utc::now().format("%Y%m%d%H%M%S").to_string(),
        );

        let signature = self.sign(&params);
        let mut query = Self::canonical_query(&params);
        query.push_str(&format!("&{PARAM_SIGNATURE}={signature}"));

        Ok(format!("{}?{}", self.config.gateway_url, query))
    }

    fn verify_callback(&self, params: &BTreeMap<String, String>) -> bool {
        let Some(provided) = params.get(PARAM_SIGNATURE) else {
            return false;
        };
        let Ok(provided_bytes) = hex::decode(provided) else {
            return false;
        };

        // Constant-time comparison via the MAC's own verifier.
        let mut mac = HmacSha512::new_from_slice(self.config.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(Self::canonical_query(params).as_bytes());
        mac.verify_slice(&provided_bytes).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> RedirectGateway {
        RedirectGateway::new(PaymentGatewayConfig {
            merchant_code: "MERCHANT01".into(),
            secret: "super-secret".into(),
            gateway_url: "https://pay.example.com/gateway".into(),
            return_url: "https://shop.example.com/payment/return".into(),
        })
    }

    #[test]
    fn form_encode_handles_space_and_reserved() {
        assert_eq!(form_encode("Payment for ORD1"), "Payment+for+ORD1");
        assert_eq!(form_encode("a/b&c=d"), "a%2Fb%26c%3Dd");
        assert_eq!(form_encode("safe-._~"), "safe-._~");
    }

    #[test]
    fn redirect_url_carries_signed_sorted_query() {
        let url = gateway()
            .build_redirect_url(&OrderCode::from_string("ORD123"), Money::new(150_000), "1.2.3.4")
            .unwrap();

        assert!(url.starts_with("https://pay.example.com/gateway?"));
        assert!(url.contains("txn_ref=ORD123"));
        assert!(url.contains("amount=15000000"));
        assert!(url.contains(&format!("{PARAM_SIGNATURE}=")));

        // Keys before the signature must be sorted.
        let query = url.split_once('?').unwrap().1;
        let keys: Vec<&str> = query
            .split('&')
            .map(|kv| kv.split_once('=').unwrap().0)
            .collect();
        let mut sorted = keys[..keys.len() - 1].to_vec();
        sorted.sort_unstable();
        assert_eq!(keys[..keys.len() - 1], sorted[..]);
        assert_eq!(*keys.last().unwrap(), PARAM_SIGNATURE);
    }

    #[test]
    fn misconfigured_gateway_refuses_to_build() {
        let gateway = RedirectGateway::new(PaymentGatewayConfig {
            merchant_code: "M".into(),
            secret: "s".into(),
            gateway_url: String::new(),
            return_url: String::new(),
        });
        let err = gateway
            .build_redirect_url(&OrderCode::from_string("ORD1"), Money::new(1_000), "ip")
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotConfigured(_)));
    }

    #[test]
    fn valid_signature_verifies() {
        let gateway = gateway();
        let mut params = BTreeMap::new();
        params.insert(PARAM_TXN_REF.to_string(), "ORD123".to_string());
        params.insert(PARAM_RESPONSE_CODE.to_string(), "00".to_string());
        let signature = gateway.sign(&params);
        params.insert(PARAM_SIGNATURE.to_string(), signature);

        assert!(gateway.verify_callback(&params));
    }

    #[test]
    fn tampered_parameter_fails_verification() {
        let gateway = gateway();
        let mut params = BTreeMap::new();
        params.insert(PARAM_TXN_REF.to_string(), "ORD123".to_string());
        params.insert(PARAM_RESPONSE_CODE.to_string(), "24".to_string());
        let signature = gateway.sign(&params);
        params.insert(PARAM_SIGNATURE.to_string(), signature);

        // Flip the response code after signing.
        params.insert(PARAM_RESPONSE_CODE.to_string(), "00".to_string());
        assert!(!gateway.verify_callback(&params));
    }

    #[test]
    fn missing_or_garbage_signature_fails() {
        let gateway = gateway();
        let mut params = BTreeMap::new();
        params.insert(PARAM_TXN_REF.to_string(), "ORD123".to_string());
        assert!(!gateway.verify_callback(&params));

        params.insert(PARAM_SIGNATURE.to_string(), "not-hex".to_string());
        assert!(!gateway.verify_callback(&params));
    }

    #[test]
    fn signature_type_is_excluded_from_signing() {
        let gateway = gateway();
        let mut params = BTreeMap::new();
        params.insert(PARAM_TXN_REF.to_string(), "ORD123".to_string());
        let signature = gateway.sign(&params);
        params.insert(PARAM_SIGNATURE.to_string(), signature);
        params.insert(PARAM_SIGNATURE_TYPE.to_string(), "HMACSHA512".to_string());

        assert!(gateway.verify_callback(&params));
    }
}
