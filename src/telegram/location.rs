use std::sync::Arc;

use dptree::case;
use teloxide::dispatching::UpdateHandler;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{Location, MessageId};

use crate::api::{ApiError, GeocodeClient, TimezoneClient, WeatherClient};
use crate::storage::{StorageError, UserStorage};
use crate::user::{GeoPoint, ReturnTo};

use super::callback::CallbackAction;
use super::{GlobalDialogue, GlobalState, HandlerResult, LocationPrompt};
use super::{keyboards, notify, texts, util, weather};

pub(super) fn schema() -> UpdateHandler<anyhow::Error> {
    let callbacks = Update::filter_callback_query()
        .filter_map(|query: CallbackQuery| query.data.as_deref().and_then(CallbackAction::parse))
        .branch(case![CallbackAction::SendLocation(return_to)].endpoint(send_location_pressed));

    let messages = Update::filter_message().branch(
        case![GlobalState::AwaitingLocation(prompt)]
            .branch(
                dptree::filter_map(|msg: Message| msg.location().cloned())
                    .endpoint(receive_location),
            )
            .branch(
                dptree::filter(|msg: Message| msg.text() == Some(keyboards::BACK_LABEL))
                    .endpoint(back_pressed),
            )
            .branch(
                dptree::filter_map(|msg: Message| msg.text().map(str::to_owned))
                    .endpoint(receive_city_text),
            ),
    );

    dptree::entry().branch(callbacks).branch(messages)
}

async fn send_location_pressed(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    return_to: ReturnTo,
    query: CallbackQuery,
) -> HandlerResult {
    let origin = util::query_origin(&query);
    bot.answer_callback_query(query.id).await?;
    // The reply keyboard with the location button needs a fresh message, so
    // the screen the button lived on is taken down first.
    if let Some((chat_id, message_id)) = origin {
        util::delete_message_silently(&bot, chat_id, message_id).await;
    }
    begin(&bot, &dialogue, &storage, return_to).await
}

/// Opens the location dialog. Public to the rest of the telegram module:
/// the forecast and notification screens enter it when coordinates are
/// missing.
pub(super) async fn begin(
    bot: &Bot,
    dialogue: &GlobalDialogue,
    storage: &Arc<dyn UserStorage>,
    return_to: ReturnTo,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;

    let text = match return_to {
        ReturnTo::Settings => match user.city.as_deref() {
            Some(city) => format!("{}\n\n{}", texts::current_location(city), texts::LOCATION),
            None => texts::LOCATION.to_string(),
        },
        ReturnTo::Forecast => format!("{}\n\n{}", texts::NO_LOCATION_FORECAST, texts::LOCATION),
        ReturnTo::Notify => format!("{}\n\n{}", texts::NO_LOCATION_NOTIFY, texts::LOCATION),
    };

    let prompt = bot
        .send_message(chat_id, text)
        .reply_markup(keyboards::location_request())
        .await?;

    util::set_dialog(
        dialogue,
        storage,
        GlobalState::AwaitingLocation(LocationPrompt {
            return_to,
            prompt_msg_id: Some(prompt.id.0),
        }),
    )
    .await
}

async fn receive_location(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    weather_client: WeatherClient,
    geocoder: GeocodeClient,
    timezone: TimezoneClient,
    prompt: LocationPrompt,
    msg: Message,
    location: Location,
) -> HandlerResult {
    util::delete_message_silently(&bot, msg.chat.id, msg.id).await;

    let geo = GeoPoint::new(location.longitude, location.latitude);
    let resolved = async {
        let city = geocoder.reverse_geocode(geo).await?;
        let tz_shift = timezone.tz_shift(geo).await?;
        Ok::<_, ApiError>((city, tz_shift))
    }
    .await;

    match resolved {
        Ok((city, tz_shift)) => {
            finish(
                &bot,
                &dialogue,
                &storage,
                &weather_client,
                prompt,
                geo,
                city,
                tz_shift,
            )
            .await
        }
        Err(error) => show_error(&bot, msg.chat.id, &prompt, &error).await,
    }
}

async fn receive_city_text(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    weather_client: WeatherClient,
    geocoder: GeocodeClient,
    timezone: TimezoneClient,
    prompt: LocationPrompt,
    msg: Message,
    text: String,
) -> HandlerResult {
    util::delete_message_silently(&bot, msg.chat.id, msg.id).await;

    let resolved = async {
        let (geo, city) = geocoder.geocode(&text).await?;
        let tz_shift = timezone.tz_shift(geo).await?;
        Ok::<_, ApiError>((geo, city, tz_shift))
    }
    .await;

    match resolved {
        Ok((geo, city, tz_shift)) => {
            finish(
                &bot,
                &dialogue,
                &storage,
                &weather_client,
                prompt,
                geo,
                city,
                tz_shift,
            )
            .await
        }
        Err(error) => show_error(&bot, msg.chat.id, &prompt, &error).await,
    }
}

/// Resolution failed: the user stays in the dialog and the prompt message is
/// rewritten with the error, so the chat does not fill up with retries.
async fn show_error(
    bot: &Bot,
    chat_id: ChatId,
    prompt: &LocationPrompt,
    error: &ApiError,
) -> HandlerResult {
    if !error.is_not_found() {
        log::warn!("location resolution for {chat_id} failed: {error}");
    }
    let text = texts::location_error_text(error);
    match prompt.prompt_msg_id {
        Some(message_id) => {
            // Two unknown cities in a row produce the same text; Telegram
            // rejects such edits and that is fine.
            if let Err(edit_error) = bot
                .edit_message_text(chat_id, MessageId(message_id), text)
                .await
            {
                log::debug!("error prompt edit in {chat_id} skipped: {edit_error}");
            }
        }
        None => {
            bot.send_message(chat_id, text).await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn finish(
    bot: &Bot,
    dialogue: &GlobalDialogue,
    storage: &Arc<dyn UserStorage>,
    weather_client: &WeatherClient,
    prompt: LocationPrompt,
    geo: GeoPoint,
    city: String,
    tz_shift: i32,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    storage
        .set_location(chat_id, geo, city.clone(), tz_shift)
        .await?;

    util::remove_reply_keyboard(bot, chat_id).await?;
    if let Some(message_id) = prompt.prompt_msg_id {
        util::delete_message_silently(bot, chat_id, MessageId(message_id)).await;
    }
    util::reset_dialog(dialogue, storage).await?;

    let confirmation = texts::location_set(&city);
    match prompt.return_to {
        ReturnTo::Settings => {
            let text = format!("{confirmation}\n\n{}", texts::settings_text(Some(&city)));
            bot.send_message(chat_id, text)
                .reply_markup(keyboards::settings())
                .await?;
        }
        ReturnTo::Forecast => {
            weather::send_current(bot, storage, weather_client, chat_id, Some(confirmation))
                .await?;
        }
        ReturnTo::Notify => {
            let user = storage
                .get(chat_id)
                .await?
                .ok_or(StorageError::UserNotFound(chat_id))?;
            let (text, board) = notify::list_view(&user);
            bot.send_message(chat_id, format!("{confirmation}\n\n{text}"))
                .reply_markup(board)
                .await?;
        }
    }
    Ok(())
}

/// The reply-keyboard back button: leave the dialog and return to wherever
/// the user came from.
async fn back_pressed(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    prompt: LocationPrompt,
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    util::delete_message_silently(&bot, chat_id, msg.id).await;
    util::remove_reply_keyboard(&bot, chat_id).await?;
    if let Some(message_id) = prompt.prompt_msg_id {
        util::delete_message_silently(&bot, chat_id, MessageId(message_id)).await;
    }
    util::reset_dialog(&dialogue, &storage).await?;

    let user = storage
        .get(chat_id)
        .await?
        .ok_or(StorageError::UserNotFound(chat_id))?;

    match prompt.return_to {
        ReturnTo::Settings => {
            bot.send_message(chat_id, texts::settings_text(user.city.as_deref()))
                .reply_markup(keyboards::settings())
                .await?;
        }
        ReturnTo::Notify => {
            let (text, board) = notify::list_view(&user);
            bot.send_message(chat_id, text).reply_markup(board).await?;
        }
        ReturnTo::Forecast => {
            let greeting = texts::greeting(user.tz_shift, crate::converters::reference_now());
            let name = msg.chat.first_name().map(str::to_owned);
            bot.send_message(
                chat_id,
                texts::start_text(&greeting, name.as_deref(), false),
            )
            .reply_markup(keyboards::main_menu())
            .await?;
        }
    }
    Ok(())
}
