mod callback;
pub(crate) mod keyboards;
mod location;
mod notify;
mod start;
pub(crate) mod texts;
mod util;
mod weather;

use std::sync::Arc;

use dptree::case;
use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::{self, InMemStorage};
use teloxide::macros::BotCommands;
use teloxide::prelude::*;

use crate::api::{GeocodeClient, TimezoneClient, WeatherClient};
use crate::storage::UserStorage;
use crate::user::{ReturnTo, StoredDialog};

type GlobalDialogue = Dialogue<GlobalState, InMemStorage<GlobalState>>;
type HandlerResult = anyhow::Result<()>;

/// Context of a location dialog: where to route the user once coordinates
/// resolve, and which prompt message to edit on errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocationPrompt {
    pub return_to: ReturnTo,
    pub prompt_msg_id: Option<i32>,
}

/// Partially chosen notification time while the picker dialog is open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimePicker {
    pub hour: u32,
    pub minute: u32,
    pub prompt_msg_id: Option<i32>,
}

#[derive(Default, Clone, Debug, PartialEq)]
enum GlobalState {
    #[default]
    Idle,
    AwaitingLocation(LocationPrompt),
    AwaitingNotifyTime(TimePicker),
}

impl GlobalState {
    fn to_stored(&self) -> Option<StoredDialog> {
        match *self {
            GlobalState::Idle => None,
            GlobalState::AwaitingLocation(prompt) => Some(StoredDialog::AwaitingLocation {
                return_to: prompt.return_to,
                prompt_msg_id: prompt.prompt_msg_id,
            }),
            GlobalState::AwaitingNotifyTime(picker) => Some(StoredDialog::AwaitingNotifyTime {
                hour: picker.hour,
                minute: picker.minute,
                prompt_msg_id: picker.prompt_msg_id,
            }),
        }
    }

    fn from_stored(stored: StoredDialog) -> Self {
        match stored {
            StoredDialog::AwaitingLocation {
                return_to,
                prompt_msg_id,
            } => GlobalState::AwaitingLocation(LocationPrompt {
                return_to,
                prompt_msg_id,
            }),
            StoredDialog::AwaitingNotifyTime {
                hour,
                minute,
                prompt_msg_id,
            } => GlobalState::AwaitingNotifyTime(TimePicker {
                hour,
                minute,
                prompt_msg_id,
            }),
        }
    }
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Поддерживаемые команды:")]
enum GlobalCommand {
    #[command(description = "открыть главное меню")]
    Start,
    #[command(description = "отменить текущее действие")]
    Cancel,
}

pub struct TelegramInteractionInterface;

impl TelegramInteractionInterface {
    pub async fn start(
        bot: Bot,
        storage: Arc<dyn UserStorage>,
        weather: WeatherClient,
        geocoder: GeocodeClient,
        timezone: TimezoneClient,
    ) -> anyhow::Result<()> {
        log::info!("Starting the Telegram interaction interface");

        let dialogues = InMemStorage::<GlobalState>::new();
        let restored = util::restore_dialogs(&storage, &dialogues).await?;
        if restored > 0 {
            log::info!("Restored {restored} in-flight dialog(s) from storage");
        }

        Dispatcher::builder(bot, Self::schema())
            .dependencies(dptree::deps![dialogues, storage, weather, geocoder, timezone])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }

    fn schema() -> UpdateHandler<anyhow::Error> {
        let cancel_handler = Update::filter_message().branch(
            teloxide::filter_command::<GlobalCommand, _>()
                .branch(case![GlobalCommand::Cancel].endpoint(cancel)),
        );

        let invalid_message_handler =
            Update::filter_message().branch(dptree::endpoint(invalid_state));
        let invalid_callback_handler =
            Update::filter_callback_query().branch(dptree::endpoint(invalid_query));

        dialogue::enter::<Update, InMemStorage<GlobalState>, GlobalState, _>()
            .branch(cancel_handler)
            .branch(start::schema())
            .branch(location::schema())
            .branch(notify::schema())
            .branch(weather::schema())
            .branch(invalid_message_handler)
            .branch(invalid_callback_handler)
    }
}

async fn cancel(
    bot: Bot,
    dialogue: GlobalDialogue,
    storage: Arc<dyn UserStorage>,
    msg: Message,
) -> HandlerResult {
    bot.send_message(msg.chat.id, texts::CANCELLED)
        .reply_markup(keyboards::home())
        .await?;
    util::reset_dialog(&dialogue, &storage).await?;
    Ok(())
}

async fn invalid_state(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, texts::UNKNOWN_INPUT).await?;
    Ok(())
}

async fn invalid_query(bot: Bot, query: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(query.id.clone()).await?;
    if let Some(message) = util::try_get_message_from_query(&query) {
        bot.send_message(message.chat.id, texts::UNKNOWN_QUERY)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialog_states_survive_a_persistence_roundtrip() {
        let states = [
            GlobalState::AwaitingLocation(LocationPrompt {
                return_to: ReturnTo::Forecast,
                prompt_msg_id: Some(42),
            }),
            GlobalState::AwaitingNotifyTime(TimePicker {
                hour: 8,
                minute: 30,
                prompt_msg_id: None,
            }),
        ];

        for state in states {
            let stored = state.to_stored().expect("non-idle states are persisted");
            assert_eq!(GlobalState::from_stored(stored), state);
        }
    }

    #[test]
    fn idle_is_not_persisted() {
        assert_eq!(GlobalState::Idle.to_stored(), None);
    }
}
