use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Unit of work for the dispatch engine: one ride that needs a captain.
#[derive(Debug, Clone, Copy)]
pub struct DispatchJob {
    pub ride_id: Uuid,
}

pub async fn enqueue_dispatch(state: &AppState, ride_id: Uuid) -> Result<(), AppError> {
    state
        .dispatch_tx
        .send(DispatchJob { ride_id })
        .await
        .map_err(|err| AppError::Internal(format!("dispatch queue send failed: {err}")))?;

    state.metrics.rides_awaiting_dispatch.inc();
    Ok(())
}
