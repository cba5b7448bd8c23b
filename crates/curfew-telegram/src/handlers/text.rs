use std::sync::Arc;

use teloxide::prelude::*;

use curfew_core::{dispatcher::Verdict, messaging::types::TextMessage};

use crate::router::AppState;

pub async fn handle_text(msg: TextMessage, state: Arc<AppState>) -> ResponseResult<()> {
    let verdict = state.moderation.on_text_message(&msg).await;
    if verdict == Verdict::Deleted {
        tracing::debug!(chat_id = msg.chat_id.0, user_id = msg.user_id.0, "message moderated");
    }
    Ok(())
}
