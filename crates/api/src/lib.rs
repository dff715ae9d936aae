//! HTTP surface for the storefront checkout pipeline.
//!
//! Two business routes, `POST /checkout` and `GET /payment/return`,
//! plus health and Prometheus metrics, with structured logging via
//! tracing.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    ChannelNotifier, CheckoutOrchestrator, District, LocationDirectory, NotificationEvent,
    PaymentReconciler, Province, RedirectGateway, Ward,
};
use checkout::InMemoryCarrierGateway;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{Datastore, InMemoryInventoryLedger, InMemoryStore, InventoryLedger};
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::checkout::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L, D>(state: Arc<AppState<L, D>>, metrics_handle: PrometheusHandle) -> Router
where
    L: InventoryLedger + 'static,
    D: Datastore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::place::<L, D>))
        .route("/payment/return", get(routes::payment::callback::<L, D>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The in-memory stack behind [`create_default_state`], exposed so the
/// binary and the tests can seed catalog, stock, and customers.
pub struct DefaultStack {
    pub state: Arc<AppState<InMemoryInventoryLedger, InMemoryStore>>,
    pub ledger: InMemoryInventoryLedger,
    pub store: InMemoryStore,
    pub carrier: InMemoryCarrierGateway,
    pub gateway: RedirectGateway,
    pub notifications: UnboundedReceiver<NotificationEvent>,
}

/// Creates application state over the in-memory ledger and datastore.
pub fn create_default_state(config: &Config) -> DefaultStack {
    let ledger = InMemoryInventoryLedger::new();
    let store = InMemoryStore::new();
    let carrier = InMemoryCarrierGateway::new();
    let gateway = RedirectGateway::new(config.payment.clone());
    let (notifier, notifications) = ChannelNotifier::new();
    let locations = Arc::new(default_locations());

    let orchestrator = CheckoutOrchestrator::new(
        ledger.clone(),
        store.clone(),
        carrier.clone(),
        gateway.clone(),
        notifier.clone(),
        locations.clone(),
    );
    let reconciler = PaymentReconciler::new(
        ledger.clone(),
        store.clone(),
        carrier.clone(),
        gateway.clone(),
        notifier,
        locations,
    );

    let state = Arc::new(AppState {
        orchestrator,
        reconciler,
        frontend_url: config.frontend_url.clone(),
    });

    DefaultStack {
        state,
        ledger,
        store,
        carrier,
        gateway,
        notifications,
    }
}

/// A fixed slice of the carrier taxonomy for local runs. Production
/// deployments sync the full list from the carrier at bootstrap.
pub fn default_locations() -> LocationDirectory {
    LocationDirectory::new(vec![Province {
        id: 202,
        name: "Thành phố Hồ Chí Minh".into(),
        districts: vec![
            District {
                id: 1449,
                name: "Quận 7".into(),
                wards: vec![Ward {
                    code: "20706".into(),
                    name: "Phường Tân Phong".into(),
                }],
            },
            District {
                id: 1442,
                name: "Quận 1".into(),
                wards: vec![Ward {
                    code: "20109".into(),
                    name: "Phường Bến Nghé".into(),
                }],
            },
        ],
    }])
}
