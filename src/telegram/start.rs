use std::sync::Arc;

use dptree::case;
use teloxide::dispatching::UpdateHandler;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;

use crate::converters;
use crate::storage::{StorageError, UserStorage};
use crate::user::User;

use super::callback::CallbackAction;
use super::{GlobalCommand, GlobalDialogue, HandlerResult, keyboards, texts, util};

pub(super) fn schema() -> UpdateHandler<anyhow::Error> {
    let commands = Update::filter_message().branch(
        teloxide::filter_command::<GlobalCommand, _>()
            .branch(case![GlobalCommand::Start].endpoint(start)),
    );

    let callbacks = Update::filter_callback_query()
        .filter_map(|query: CallbackQuery| query.data.as_deref().and_then(CallbackAction::parse))
        .branch(case![CallbackAction::MainMenu].endpoint(main_menu))
        .branch(case![CallbackAction::Settings].endpoint(settings))
        .branch(case![CallbackAction::DeleteData].endpoint(delete_data));

    dptree::entry().branch(commands).branch(callbacks)
}

/// `/start` works from any dialog state and always lands on the main menu,
/// creating the user record on first contact.
async fn start(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    msg: Message,
) -> HandlerResult {
    util::reset_dialog(&dialogue, &storage).await?;

    let chat_id = msg.chat.id;
    let name = msg.chat.first_name().map(str::to_owned);
    let (user, first_time) = get_or_create(&storage, chat_id).await?;

    let greeting = texts::greeting(user.tz_shift, converters::reference_now());
    bot.send_message(
        chat_id,
        texts::start_text(&greeting, name.as_deref(), first_time),
    )
    .reply_markup(keyboards::main_menu())
    .await?;
    Ok(())
}

async fn main_menu(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    let name = query.from.first_name.clone();
    bot.answer_callback_query(query.id).await?;
    util::reset_dialog(&dialogue, &storage).await?;

    let chat_id = dialogue.chat_id();
    let (user, first_time) = get_or_create(&storage, chat_id).await?;

    let greeting = texts::greeting(user.tz_shift, converters::reference_now());
    let text = texts::start_text(&greeting, Some(&name), first_time);
    util::send_or_edit(&bot, origin, chat_id, &text, keyboards::main_menu()).await
}

async fn settings(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;
    util::reset_dialog(&dialogue, &storage).await?;

    let chat_id = dialogue.chat_id();
    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;

    let text = texts::settings_text(user.city.as_deref());
    util::send_or_edit(&bot, origin, chat_id, &text, keyboards::settings()).await
}

/// "Delete my data": the whole record goes away atomically; the chat keeps a
/// button back to the main menu, which re-creates the user on demand.
async fn delete_data(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;

    let chat_id = dialogue.chat_id();
    dialogue.exit().await?;
    storage.delete(chat_id).await?;

    util::send_or_edit(&bot, origin, chat_id, texts::DATA_DELETED, keyboards::home()).await
}

async fn get_or_create(
    storage: &Arc<dyn UserStorage>,
    chat_id: ChatId,
) -> anyhow::Result<(User, bool)> {
    match storage.get(chat_id).await? {
        Some(user) => Ok((user, false)),
        None => {
            let user = storage.create(chat_id).await?;
            log::info!("Registered a new user {chat_id}");
            Ok((user, true))
        }
    }
}
