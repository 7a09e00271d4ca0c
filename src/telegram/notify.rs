use std::sync::Arc;

use chrono::NaiveTime;
use dptree::case;
use teloxide::dispatching::UpdateHandler;
use teloxide::payloads::{
    AnswerCallbackQuerySetters, EditMessageTextSetters, SendMessageSetters,
};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MessageId};

use crate::converters;
use crate::storage::{StorageError, UserStorage};
use crate::user::{ReturnTo, User};

use super::callback::CallbackAction;
use super::{GlobalDialogue, GlobalState, HandlerResult, TimePicker};
use super::{keyboards, location, texts, util};

const DEFAULT_PICKER_HOUR: u32 = 8;
const DEFAULT_PICKER_MINUTE: u32 = 0;

pub(super) fn schema() -> UpdateHandler<anyhow::Error> {
    let callbacks = Update::filter_callback_query()
        .filter_map(|query: CallbackQuery| query.data.as_deref().and_then(CallbackAction::parse))
        .branch(case![CallbackAction::NotifySettings].endpoint(notify_settings))
        .branch(case![CallbackAction::DelNotify(time)].endpoint(del_notify))
        .branch(case![CallbackAction::AddNotify].endpoint(add_notify))
        .branch(
            case![GlobalState::AwaitingNotifyTime(picker)]
                .branch(case![CallbackAction::ShowHours].endpoint(show_hours))
                .branch(case![CallbackAction::ShowMinutes].endpoint(show_minutes))
                .branch(case![CallbackAction::CollapsePicker].endpoint(collapse_picker))
                .branch(case![CallbackAction::PickHour(hour)].endpoint(pick_hour))
                .branch(case![CallbackAction::PickMinute(minute)].endpoint(pick_minute))
                .branch(case![CallbackAction::ConfirmNotify].endpoint(confirm_notify)),
        );

    let messages = Update::filter_message().branch(
        case![GlobalState::AwaitingNotifyTime(picker)]
            .branch(
                dptree::filter_map(|msg: Message| msg.text().and_then(converters::parse_hhmm))
                    .endpoint(receive_time_text),
            )
            .branch(dptree::endpoint(mistake_in_time)),
    );

    dptree::entry().branch(callbacks).branch(messages)
}

/// Text + keyboard of the notification screen for a user.
pub(super) fn list_view(user: &User) -> (String, InlineKeyboardMarkup) {
    let times = user.sorted_notify_times();
    let mut text = if times.is_empty() {
        texts::NO_NOTIFIES.to_string()
    } else {
        texts::current_notifies(&times)
    };
    if user.location.is_none() {
        text = format!("{text}\n\n{}", texts::NO_LOCATION_NOTIFY);
    }
    (text, keyboards::notify_list(&times))
}

async fn notify_settings(
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

    // Notifications make no sense without coordinates; route through the
    // location dialog first and come back here afterwards.
    if user.location.is_none() {
        if let Some((chat_id, message_id)) = origin {
            util::delete_message_silently(&bot, chat_id, message_id).await;
        }
        return location::begin(&bot, &dialogue, &storage, ReturnTo::Notify).await;
    }

    let (text, board) = list_view(&user);
    util::send_or_edit(&bot, origin, chat_id, &text, board).await
}

async fn del_notify(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    time: NaiveTime,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    let chat_id = dialogue.chat_id();

    match storage.remove_notify_time(chat_id, time).await {
        Ok(()) => {
            bot.answer_callback_query(query.id).await?;
        }
        // A stale keyboard can offer a time that is already gone.
        Err(StorageError::NotifyTimeNotFound(_)) => {
            bot.answer_callback_query(query.id)
                .text(texts::NOTIFY_MISSING)
                .show_alert(true)
                .await?;
        }
        Err(error) => return Err(error.into()),
    }

    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;
    let (text, board) = list_view(&user);
    util::send_or_edit(&bot, origin, chat_id, &text, board).await
}

async fn add_notify(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;

    let chat_id = dialogue.chat_id();
    let mut picker = TimePicker {
        hour: DEFAULT_PICKER_HOUR,
        minute: DEFAULT_PICKER_MINUTE,
        prompt_msg_id: None,
    };

    match origin {
        Some((chat_id, message_id)) => {
            picker.prompt_msg_id = Some(message_id.0);
            if let Err(error) = bot
                .edit_message_text(chat_id, message_id, texts::NEW_NOTIFY)
                .reply_markup(keyboards::time_picker(picker.hour, picker.minute))
                .await
            {
                log::debug!("picker edit in {chat_id} skipped: {error}");
            }
        }
        None => {
            let prompt = bot
                .send_message(chat_id, texts::NEW_NOTIFY)
                .reply_markup(keyboards::time_picker(picker.hour, picker.minute))
                .await?;
            picker.prompt_msg_id = Some(prompt.id.0);
        }
    }

    util::set_dialog(&dialogue, &storage, GlobalState::AwaitingNotifyTime(picker)).await
}

async fn show_hours(bot: Bot, picker: TimePicker, query: CallbackQuery) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;
    if let Some((chat_id, message_id)) = origin {
        util::replace_markup(
            &bot,
            chat_id,
            message_id,
            keyboards::hour_picker(picker.hour, picker.minute),
        )
        .await;
    }
    Ok(())
}

async fn show_minutes(bot: Bot, picker: TimePicker, query: CallbackQuery) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;
    if let Some((chat_id, message_id)) = origin {
        util::replace_markup(
            &bot,
            chat_id,
            message_id,
            keyboards::minute_picker(picker.hour, picker.minute),
        )
        .await;
    }
    Ok(())
}

async fn collapse_picker(bot: Bot, picker: TimePicker, query: CallbackQuery) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;
    if let Some((chat_id, message_id)) = origin {
        util::replace_markup(
            &bot,
            chat_id,
            message_id,
            keyboards::time_picker(picker.hour, picker.minute),
        )
        .await;
    }
    Ok(())
}

async fn pick_hour(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    picker: TimePicker,
    hour: u32,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;

    let picker = TimePicker { hour, ..picker };
    util::set_dialog(&dialogue, &storage, GlobalState::AwaitingNotifyTime(picker)).await?;

    // After the hour, offer the minutes right away.
    if let Some((chat_id, message_id)) = origin {
        util::replace_markup(
            &bot,
            chat_id,
            message_id,
            keyboards::minute_picker(picker.hour, picker.minute),
        )
        .await;
    }
    Ok(())
}

async fn pick_minute(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    picker: TimePicker,
    minute: u32,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;

    let picker = TimePicker { minute, ..picker };
    util::set_dialog(&dialogue, &storage, GlobalState::AwaitingNotifyTime(picker)).await?;

    if let Some((chat_id, message_id)) = origin {
        util::replace_markup(
            &bot,
            chat_id,
            message_id,
            keyboards::time_picker(picker.hour, picker.minute),
        )
        .await;
    }
    Ok(())
}

async fn confirm_notify(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    picker: TimePicker,
    query: CallbackQuery,
) -> HandlerResult {
    let time = NaiveTime::from_hms_opt(picker.hour, picker.minute, 0)
        .expect("picker values are always in range");
    let origin = util::query_origin(&query);
    let chat_id = dialogue.chat_id();

    match storage.add_notify_time(chat_id, time).await {
        Ok(()) => {
            bot.answer_callback_query(query.id)
                .text(texts::NOTIFY_SUCCESS)
                .show_alert(true)
                .await?;
        }
        Err(StorageError::DuplicateNotifyTime(_)) => {
            bot.answer_callback_query(query.id)
                .text(texts::NOTIFY_DUPLICATE)
                .show_alert(true)
                .await?;
        }
        Err(error) => return Err(error.into()),
    }

    util::reset_dialog(&dialogue, &storage).await?;
    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;
    let (text, board) = list_view(&user);
    util::send_or_edit(&bot, origin, chat_id, &text, board).await
}

/// Free-text `HH:MM` while the picker is open: same outcome as the confirm
/// button, with the result reported in the prompt message.
async fn receive_time_text(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    picker: TimePicker,
    time: NaiveTime,
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    util::delete_message_silently(&bot, chat_id, msg.id).await;

    let outcome = match storage.add_notify_time(chat_id, time).await {
        Ok(()) => texts::NOTIFY_SUCCESS,
        Err(StorageError::DuplicateNotifyTime(_)) => texts::NOTIFY_DUPLICATE,
        Err(error) => return Err(error.into()),
    };

    util::reset_dialog(&dialogue, &storage).await?;
    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;
    let (text, board) = list_view(&user);
    let text = format!("{outcome}\n\n{text}");

    let origin = picker
        .prompt_msg_id
        .map(|message_id| (chat_id, MessageId(message_id)));
    util::send_or_edit(&bot, origin, chat_id, &text, board).await
}

/// Anything else typed while the picker is open redisplays it with an error.
async fn mistake_in_time(bot: Bot, picker: TimePicker, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    util::delete_message_silently(&bot, chat_id, msg.id).await;

    match picker.prompt_msg_id {
        Some(message_id) => {
            // Repeated garbage input produces the same error text; Telegram
            // rejects the identical edit.
            if let Err(error) = bot
                .edit_message_text(chat_id, MessageId(message_id), texts::NOTIFY_ERROR)
                .reply_markup(keyboards::time_picker(picker.hour, picker.minute))
                .await
            {
                log::debug!("error prompt edit in {chat_id} skipped: {error}");
            }
        }
        None => {
            bot.send_message(chat_id, texts::NOTIFY_ERROR)
                .reply_markup(keyboards::time_picker(picker.hour, picker.minute))
                .await?;
        }
    }
    Ok(())
}
