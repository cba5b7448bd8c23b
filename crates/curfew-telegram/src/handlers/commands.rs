use std::sync::Arc;

use teloxide::prelude::*;

use curfew_core::messaging::types::Command;

use crate::router::AppState;

pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(reply) = state.commands.handle(&cmd).await else {
        return Ok(());
    };

    if let Err(e) = bot
        .send_message(msg.chat.id, reply)
        .reply_to_message_id(msg.id)
        .await
    {
        tracing::warn!(chat_id = cmd.chat_id.0, command = %cmd.name, error = %e, "failed to reply to command");
    }
    Ok(())
}
