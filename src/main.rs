mod api;
mod appsettings;
mod converters;
mod scheduling;
mod storage;
mod telegram;
mod user;

use std::sync::Arc;

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

use api::{GeocodeClient, TimezoneClient, WeatherClient};
use appsettings::AppSettings;
use scheduling::WeatherNotifier;
use storage::{JsonUserStorage, UserStorage};
use telegram::TelegramInteractionInterface;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    log::info!("Starting zefirka");

    let settings = AppSettings::load()?;
    let storage: Arc<dyn UserStorage> =
        Arc::new(JsonUserStorage::load(&settings.storage.path).await?);

    let bot = Bot::new(settings.telegram.token.clone());
    let weather = WeatherClient::new(settings.api.weather_key.clone());
    let geocoder = GeocodeClient::new(settings.api.geocode_key.clone());
    let timezone = TimezoneClient::new(settings.api.timezone_key.clone());

    let cancellation_token = CancellationToken::new();
    let notifier = WeatherNotifier::new(bot.clone(), Arc::clone(&storage), weather.clone());
    let notifier_task = notifier.spawn(cancellation_token.child_token());
    log::info!("Started the weather notification sweep");

    notify_admins(&bot, &settings.admins).await;

    TelegramInteractionInterface::start(bot, storage, weather, geocoder, timezone).await?;

    cancellation_token.cancel();
    let _ = notifier_task.await;
    Ok(())
}

/// Tells the admins the bot is back up. A failed delivery to one admin must
/// not get in the way of startup.
async fn notify_admins(bot: &Bot, admins: &[i64]) {
    for admin in admins {
        if let Err(error) = bot
            .send_message(ChatId(*admin), telegram::texts::RESTARTED)
            .await
        {
            log::warn!("could not notify admin {admin}: {error}");
        }
    }
}
