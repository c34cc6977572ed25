//! The session-runner action.

use crate::engine::runner::{self, RunnerOutcome};
use crate::error::EngineError;
use crate::server::AppState;

pub async fn run_bot_logic(state: &AppState) -> Result<RunnerOutcome, EngineError> {
    runner::run_bot_logic(
        state.store.clone(),
        state.market.clone(),
        state.provider.clone(),
        state.mailer.clone(),
    )
    .await
}
