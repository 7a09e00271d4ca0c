use std::sync::Arc;

use teloxide::dispatching::dialogue::{InMemStorage, Storage};
use teloxide::payloads::{
    EditMessageReplyMarkupSetters, EditMessageTextSetters, SendMessageSetters,
};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardMarkup, KeyboardRemove, MaybeInaccessibleMessage, Message, MessageId,
};

use crate::storage::{StorageError, UserStorage};

use super::{GlobalDialogue, GlobalState, HandlerResult};

/// Moves the dialog into `state`, keeping the persisted mirror in sync so
/// the dialog survives a restart.
pub(super) async fn set_dialog(
    dialogue: &GlobalDialogue,
    storage: &Arc<dyn UserStorage>,
    state: GlobalState,
) -> HandlerResult {
    storage
        .set_dialog(dialogue.chat_id(), state.to_stored())
        .await?;
    dialogue.update(state).await?;
    Ok(())
}

/// Ends the dialog. A missing user record is tolerated here: `/start` resets
/// the dialog before the record may exist, and data deletion removes it.
pub(super) async fn reset_dialog(
    dialogue: &GlobalDialogue,
    storage: &Arc<dyn UserStorage>,
) -> HandlerResult {
    match storage.set_dialog(dialogue.chat_id(), None).await {
        Ok(()) | Err(StorageError::UserNotFound(_)) => {}
        Err(error) => return Err(error.into()),
    }
    dialogue.exit().await?;
    Ok(())
}

/// Seeds the dialogue storage from the persisted markers of every user.
pub(super) async fn restore_dialogs(
    storage: &Arc<dyn UserStorage>,
    dialogues: &Arc<InMemStorage<GlobalState>>,
) -> anyhow::Result<usize> {
    let mut restored = 0;
    for user in storage.get_all().await? {
        let Some(stored) = user.dialog else { continue };
        Arc::clone(dialogues)
            .update_dialogue(user.id, GlobalState::from_stored(stored))
            .await
            .map_err(|error| {
                anyhow::anyhow!("failed to restore the dialog of {}: {error:?}", user.id)
            })?;
        restored += 1;
    }
    Ok(restored)
}

pub(super) fn try_get_message_from_query(query: &CallbackQuery) -> Option<&Message> {
    query.message.as_ref().and_then(|msg| match msg {
        MaybeInaccessibleMessage::Inaccessible(_) => None,
        MaybeInaccessibleMessage::Regular(message) => Some(message.as_ref()),
    })
}

/// Chat and message id of the message the pressed button was attached to.
pub(super) fn query_origin(query: &CallbackQuery) -> Option<(ChatId, MessageId)> {
    try_get_message_from_query(query).map(|message| (message.chat.id, message.id))
}

/// Edits the origin message when there is one, otherwise sends a new one.
/// Telegram rejects edits that change nothing (same text after pressing the
/// same button twice); that is not worth failing the whole update over.
pub(super) async fn send_or_edit(
    bot: &Bot,
    origin: Option<(ChatId, MessageId)>,
    fallback_chat: ChatId,
    text: &str,
    markup: InlineKeyboardMarkup,
) -> HandlerResult {
    match origin {
        Some((chat_id, message_id)) => {
            if let Err(error) = bot
                .edit_message_text(chat_id, message_id, text)
                .reply_markup(markup)
                .await
            {
                log::debug!("message edit in {chat_id} skipped: {error}");
            }
        }
        None => {
            bot.send_message(fallback_chat, text)
                .reply_markup(markup)
                .await?;
        }
    }
    Ok(())
}

/// Swaps the inline keyboard of a message, tolerating no-op edits.
pub(super) async fn replace_markup(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    markup: InlineKeyboardMarkup,
) {
    if let Err(error) = bot
        .edit_message_reply_markup(chat_id, message_id)
        .reply_markup(markup)
        .await
    {
        log::debug!("keyboard edit in {chat_id} skipped: {error}");
    }
}

/// A reply keyboard can only be dismissed by a message carrying
/// `KeyboardRemove`, so a blank service message is sent and deleted.
pub(super) async fn remove_reply_keyboard(bot: &Bot, chat_id: ChatId) -> HandlerResult {
    let service = bot
        .send_message(chat_id, "ㅤ")
        .reply_markup(KeyboardRemove::new())
        .await?;
    bot.delete_message(chat_id, service.id).await?;
    Ok(())
}

pub(super) async fn delete_message_silently(bot: &Bot, chat_id: ChatId, message_id: MessageId) {
    if let Err(error) = bot.delete_message(chat_id, message_id).await {
        log::debug!("could not delete message {message_id:?} in {chat_id}: {error}");
    }
}
