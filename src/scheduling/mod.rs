mod notifier;

pub use notifier::WeatherNotifier;
