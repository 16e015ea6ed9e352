// Export route modules
pub mod orchestrate;
pub mod status;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(orchestrate::routes(state.clone()))
        .merge(status::routes(state))
}
