//! Application configuration loaded from environment variables.

use checkout::PaymentGatewayConfig;

/// Server configuration with development defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `FRONTEND_URL` — where payment-return redirects land
/// - `PAYMENT_MERCHANT_CODE`, `PAYMENT_SECRET`, `PAYMENT_GATEWAY_URL`,
///   `PAYMENT_RETURN_URL` — redirect gateway credentials
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub payment: PaymentGatewayConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// development defaults.
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            frontend_url: env_or("FRONTEND_URL", "http://localhost:5173"),
            payment: PaymentGatewayConfig {
                merchant_code: env_or("PAYMENT_MERCHANT_CODE", "DEVMERCHANT"),
                secret: env_or("PAYMENT_SECRET", "dev-secret"),
                gateway_url: env_or("PAYMENT_GATEWAY_URL", "https://sandbox.gateway.example/pay"),
                return_url: env_or(
                    "PAYMENT_RETURN_URL",
                    "http://localhost:3000/payment/return",
                ),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            frontend_url: "http://localhost:5173".to_string(),
            payment: PaymentGatewayConfig {
                merchant_code: "DEVMERCHANT".to_string(),
                secret: "dev-secret".to_string(),
                gateway_url: "https://sandbox.gateway.example/pay".to_string(),
                return_url: "http://localhost:3000/payment/return".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
