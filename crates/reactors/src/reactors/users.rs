//! User collection reactions.
//!
//! Keep the `user-counts` projection and the user search index in step
//! with the `users` collection. The mirrored body is the full document,
//! sent verbatim.

use serde_json::Value;
use tracing::instrument;

use crate::counters::CounterEngine;
use crate::outbox::{self, SideEffect};
use crate::search::indexes;
use crate::state::AppState;

use super::ReactionError;

/// React to a user document creation.
#[instrument(skip(state, user), fields(user_id = %id))]
pub async fn on_user_created(
    state: &AppState,
    id: &str,
    user: &Value,
) -> Result<(), ReactionError> {
    CounterEngine::new(state.store()).user_created().await?;

    outbox::enqueue(
        state.store(),
        SideEffect::IndexUpsert {
            index: indexes::USERS.to_owned(),
            object_id: id.to_owned(),
            body: user.clone(),
        },
    )
    .await?;

    Ok(())
}

/// React to a user document update: re-mirror only.
#[instrument(skip(state, after), fields(user_id = %id))]
pub async fn on_user_updated(
    state: &AppState,
    id: &str,
    after: &Value,
) -> Result<(), ReactionError> {
    outbox::enqueue(
        state.store(),
        SideEffect::IndexUpsert {
            index: indexes::USERS.to_owned(),
            object_id: id.to_owned(),
            body: after.clone(),
        },
    )
    .await?;

    Ok(())
}

/// React to a user document deletion.
#[instrument(skip(state), fields(user_id = %id))]
pub async fn on_user_deleted(state: &AppState, id: &str) -> Result<(), ReactionError> {
    CounterEngine::new(state.store()).user_deleted().await?;

    outbox::enqueue(
        state.store(),
        SideEffect::IndexRemove {
            index: indexes::USERS.to_owned(),
            object_id: id.to_owned(),
        },
    )
    .await?;

    Ok(())
}
