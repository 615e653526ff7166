//! Update handlers: map inbound Telegram updates onto state-machine events
//! and send the resulting replies.

use std::time::Instant;

use {
    teloxide::{
        RequestError,
        prelude::*,
        types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message},
    },
    tracing::{debug, warn},
};

use crate::{
    machine::{Event, Menu, Reply, SessionMachine},
    texts,
};

const RETRY_AFTER_MAX_RETRIES: usize = 3;

/// Handle one inbound message (called from the polling loop).
pub async fn handle_message(bot: &Bot, machine: &SessionMachine, msg: Message) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let chat_id = msg.chat.id;

    let reply = if let Some(rest) = text.strip_prefix('/') {
        let command = rest.split_whitespace().next().unwrap_or("");
        // Strip the @botname suffix used in group mentions.
        let command = command.split('@').next().unwrap_or(command);
        match command {
            "start" => SessionMachine::main_menu(Some(user.first_name.as_str())),
            "help" => Reply::text(texts::HELP),
            "cancel" => machine.advance(user_id, Event::Cancel).await,
            "ping" => return ping(bot, chat_id).await,
            _ => Reply::text(texts::UNKNOWN_COMMAND),
        }
    } else {
        machine.advance(user_id, Event::Text(text)).await
    };

    send_reply(bot, chat_id, &reply).await
}

/// Handle one inline-keyboard press.
pub async fn handle_callback_query(
    bot: &Bot,
    machine: &SessionMachine,
    query: CallbackQuery,
) -> anyhow::Result<()> {
    // Answer first to dismiss the client-side loading spinner.
    let _ = bot.answer_callback_query(&query.id).await;

    let Some(action) = query.data.as_deref() else {
        return Ok(());
    };
    let Some(chat_id) = query.message.as_ref().map(|m| m.chat().id) else {
        return Ok(());
    };
    let user_id = query.from.id.0 as i64;

    let reply = machine.advance(user_id, Event::Button(action)).await;
    send_reply(bot, chat_id, &reply).await
}

/// `/ping`: measure the round trip by editing the first message in place.
async fn ping(bot: &Bot, chat_id: ChatId) -> anyhow::Result<()> {
    let started = Instant::now();
    let sent = bot.send_message(chat_id, "🏓 Pinging…").await?;
    let latency = started.elapsed().as_millis();
    bot.edit_message_text(chat_id, sent.id, format!("🏓 Pong! {latency}ms"))
        .await?;
    Ok(())
}

/// Send a reply, waiting out Telegram's retry-after responses.
pub(crate) async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply) -> anyhow::Result<()> {
    let mut retries = 0usize;
    loop {
        let mut request = bot.send_message(chat_id, &reply.text);
        if let Some(menu) = &reply.menu {
            request = request.reply_markup(to_markup(menu));
        }
        match request.await {
            Ok(_) => return Ok(()),
            Err(RequestError::RetryAfter(wait)) if retries < RETRY_AFTER_MAX_RETRIES => {
                retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    retries,
                    retry_after_secs = wait.duration().as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait.duration()).await;
            },
            Err(e) => return Err(e.into()),
        }
    }
}

fn to_markup(menu: &Menu) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(menu.rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.action.clone()))
            .collect::<Vec<_>>()
    }))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::{Arc, Mutex},
    };

    use {
        axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
        serde_json::json,
        tokio::sync::oneshot,
    };

    use crate::machine::{Menu, MenuButton};

    #[test]
    fn markup_preserves_rows_and_actions() {
        let menu = Menu::column(vec![
            MenuButton::new("A", "start:telethon"),
            MenuButton::new("B", "start:pyrogram"),
        ]);
        let markup = to_markup(&menu);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].text, "A");
    }

    #[derive(Clone, Default)]
    struct MockApi {
        requests: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    async fn api_handler(
        State(state): State<MockApi>,
        uri: Uri,
        body: Bytes,
    ) -> Json<serde_json::Value> {
        let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        let parsed: serde_json::Value =
            serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        state.requests.lock().unwrap().push((method, parsed));

        Json(json!({
            "ok": true,
            "result": {
                "message_id": 1,
                "date": 0,
                "chat": { "id": 42, "type": "private" },
                "text": "ok"
            }
        }))
    }

    #[tokio::test]
    async fn send_reply_attaches_inline_keyboard() {
        let mock = MockApi::default();
        let requests = Arc::clone(&mock.requests);
        let app = Router::new()
            .route("/{*path}", post(api_handler))
            .with_state(mock);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock api");
        });

        let api_url = url::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        let bot = Bot::new("test-token").set_api_url(api_url);

        let reply = Reply::with_menu(
            "pick one",
            Menu::column(vec![MenuButton::new("Telethon", "start:telethon")]),
        );
        send_reply(&bot, ChatId(42), &reply).await.expect("send");

        {
            let requests = requests.lock().unwrap();
            let (method, body) = requests.last().expect("one request");
            assert_eq!(method, "SendMessage");
            assert_eq!(body["chat_id"], json!(42));
            assert_eq!(body["text"], json!("pick one"));
            let markup: serde_json::Value =
                serde_json::from_str(body["reply_markup"].as_str().unwrap_or_default())
                    .unwrap_or(body["reply_markup"].clone());
            assert_eq!(
                markup["inline_keyboard"][0][0]["callback_data"],
                json!("start:telethon")
            );
        }

        let _ = shutdown_tx.send(());
        server.await.expect("server join");
    }
}
