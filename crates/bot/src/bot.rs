//! Long-polling loop for the bot.
//!
//! Manual getUpdates polling: one update is processed to completion before
//! the next, which also serializes turns per user. The returned cancellation
//! token stops the loop.

use std::sync::Arc;

use {
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{handlers, machine::SessionMachine};

/// Start polling for updates.
///
/// Verifies the token, clears any webhook, registers the command list, then
/// spawns the polling task. Cancellation of the returned token stops it.
pub async fn start_polling(
    bot: Bot,
    machine: Arc<SessionMachine>,
    owner_id: i64,
) -> anyhow::Result<CancellationToken> {
    let me = bot.get_me().await?;
    info!(username = ?me.username, "bot token verified");

    // Long polling requires no webhook to be registered.
    bot.delete_webhook().send().await?;

    let commands = vec![
        BotCommand::new("start", "Show the main menu"),
        BotCommand::new("help", "What this bot does"),
        BotCommand::new("ping", "Measure bot latency"),
        BotCommand::new("cancel", "Abort the current flow"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        info!("starting polling loop");
        let mut offset: i32 = 0;

        loop {
            if token.is_cancelled() {
                info!("polling stopped");
                break;
            }

            let result = bot
                .get_updates()
                .offset(offset)
                .timeout(30)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                .await;

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                if let Err(e) =
                                    handlers::handle_message(&bot, &machine, msg).await
                                {
                                    error!(error = %e, "error handling message");
                                }
                            },
                            UpdateKind::CallbackQuery(query) => {
                                if let Err(e) =
                                    handlers::handle_callback_query(&bot, &machine, query).await
                                {
                                    error!(error = %e, "error handling callback query");
                                }
                            },
                            other => {
                                debug!("ignoring update kind: {other:?}");
                            },
                        }
                    }
                },
                Err(e) => {
                    // Another process is polling with the same token; there is
                    // no point retrying against it.
                    let is_conflict =
                        matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates));
                    if is_conflict {
                        warn!("another bot instance is polling with this token, stopping");
                        if owner_id != 0 {
                            let _ = bot
                                .send_message(
                                    ChatId(owner_id),
                                    "⚠️ Shutting down: another bot instance is already running \
                                     with this token.",
                                )
                                .await;
                        }
                        token.cancel();
                        break;
                    }

                    warn!(error = %e, "getUpdates failed");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                },
            }
        }
    });

    Ok(cancel)
}
