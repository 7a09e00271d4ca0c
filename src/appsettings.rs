use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct TelegramSettings {
    pub token: String,
}

#[derive(Deserialize, Debug)]
pub struct ApiSettings {
    pub weather_key: String,
    pub geocode_key: String,
    pub timezone_key: String,
}

#[derive(Deserialize, Debug)]
pub struct StorageSettings {
    pub path: String,
}

#[derive(Deserialize, Debug)]
pub struct AppSettings {
    pub telegram: TelegramSettings,
    pub api: ApiSettings,
    pub storage: StorageSettings,
    /// Chat ids that receive service messages such as the restart notice.
    #[serde(default)]
    pub admins: Vec<i64>,
}

impl AppSettings {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("appsettings").required(true))
            .add_source(File::with_name("appsettings.local").required(false))
            .add_source(Environment::with_prefix("APP"))
            .build()?;

        settings.try_deserialize()
    }
}
