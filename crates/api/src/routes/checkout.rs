//! POST /checkout: the saga's front door.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use checkout::{
    ChannelNotifier, CheckoutOrchestrator, CheckoutOutcome, CheckoutRequest, GuestContact,
    InMemoryCarrierGateway, PaymentReconciler, RedirectGateway,
};
use common::{CartId, CustomerId};
use domain::{Address, PaymentMethod};
use serde::{Deserialize, Serialize};
use store::{Datastore, InventoryLedger};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
///
/// The carrier is the in-memory gateway (the real wire integration
/// lives outside this service's contract); the payment gateway is the
/// HMAC redirect implementation.
pub struct AppState<L, D>
where
    L: InventoryLedger,
    D: Datastore + Clone,
{
    pub orchestrator:
        CheckoutOrchestrator<L, D, InMemoryCarrierGateway, RedirectGateway, ChannelNotifier>,
    pub reconciler:
        PaymentReconciler<L, D, InMemoryCarrierGateway, RedirectGateway, ChannelNotifier>,
    pub frontend_url: String,
}

// -- Request/response types --

#[derive(Deserialize)]
pub struct CheckoutRequestBody {
    pub customer_id: Option<String>,
    pub session_id: Option<String>,
    pub cart_id: Option<String>,
    pub payment_method: String,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub loyalty_points: u32,

    // Guest delivery details, required when no customer_id is supplied.
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub province: Option<String>,
    pub district: Option<String>,
    pub ward: Option<String>,
    pub address_detail: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

fn parse_uuid_field(value: Option<&str>, field: &str) -> Result<Option<uuid::Uuid>, ApiError> {
    value
        .map(|raw| {
            uuid::Uuid::parse_str(raw)
                .map_err(|e| ApiError::BadRequest(format!("invalid {field}: {e}")))
        })
        .transpose()
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or("127.0.0.1")
        .to_string()
}

impl CheckoutRequestBody {
    fn into_request(self, headers: &HeaderMap) -> Result<CheckoutRequest, ApiError> {
        let payment_method = PaymentMethod::parse(&self.payment_method).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown payment method {}", self.payment_method))
        })?;

        let customer_id =
            parse_uuid_field(self.customer_id.as_deref(), "customer_id")?.map(CustomerId::from);
        let cart_id = parse_uuid_field(self.cart_id.as_deref(), "cart_id")?.map(CartId::from);

        let guest_contact = if customer_id.is_none() {
            Some(GuestContact {
                email: self.email.unwrap_or_default(),
                full_name: self.full_name.unwrap_or_default(),
                phone_number: self.phone_number.unwrap_or_default(),
                address: Address {
                    province: self.province.unwrap_or_default(),
                    district: self.district.unwrap_or_default(),
                    ward: self.ward.unwrap_or_default(),
                    detail: self.address_detail.unwrap_or_default(),
                },
            })
        } else {
            None
        };

        Ok(CheckoutRequest {
            customer_id,
            session_token: self.session_id,
            cart_id,
            payment_method,
            coupon_code: self.coupon_code,
            loyalty_points: self.loyalty_points,
            guest_contact,
            client_ip: client_ip(headers),
        })
    }
}

// -- Handler --

/// POST /checkout places an order from a cart.
#[tracing::instrument(skip(state, headers, body))]
pub async fn place<L, D>(
    State(state): State<Arc<AppState<L, D>>>,
    headers: HeaderMap,
    Json(body): Json<CheckoutRequestBody>,
) -> Result<(axum::http::StatusCode, Json<CheckoutResponse>), ApiError>
where
    L: InventoryLedger + 'static,
    D: Datastore + Clone + 'static,
{
    let request = body.into_request(&headers)?;
    let outcome = state.orchestrator.place_order(request).await?;

    let response = match outcome {
        CheckoutOutcome::Placed { order_code } => CheckoutResponse {
            order_code: order_code.to_string(),
            payment_url: None,
        },
        CheckoutOutcome::RedirectToPayment {
            order_code,
            payment_url,
        } => CheckoutResponse {
            order_code: order_code.to_string(),
            payment_url: Some(payment_url),
        },
    };

    Ok((axum::http::StatusCode::CREATED, Json(response)))
}
