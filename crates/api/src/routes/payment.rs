//! GET /payment/return: the gateway's signed return callback.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use checkout::ReconcileOutcome;
use store::{Datastore, InventoryLedger};

use crate::error::ApiError;
use crate::routes::checkout::AppState;

/// GET /payment/return finalizes or unwinds a provisional order, then
/// sends the buyer to the storefront's success or failure page.
#[tracing::instrument(skip(state, params))]
pub async fn callback<L, D>(
    State(state): State<Arc<AppState<L, D>>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response, ApiError>
where
    L: InventoryLedger + 'static,
    D: Datastore + Clone + 'static,
{
    let outcome = state.reconciler.handle_return(&params).await?;

    let target = match outcome {
        ReconcileOutcome::Confirmed { .. } => {
            format!("{}/user-orders?status=success", state.frontend_url)
        }
        ReconcileOutcome::RolledBack { .. } => {
            format!("{}/checkout?status=fail", state.frontend_url)
        }
    };

    Ok(Redirect::to(&target).into_response())
}
