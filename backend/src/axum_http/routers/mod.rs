pub mod bookings;
pub mod payments;

use axum::extract::FromRef;
use std::sync::Arc;

use crate::usecases::bookings::BookingUseCase;
use domain::repositories::service_gateway::ServiceGateway;

#[derive(Clone)]
pub struct AppState {
    pub usecase: Arc<BookingUseCase>,
    pub gateway: Arc<dyn ServiceGateway>,
}

impl FromRef<AppState> for Arc<dyn ServiceGateway> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.gateway)
    }
}
