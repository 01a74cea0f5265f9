use std::path::PathBuf;

use clap::Parser;
use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::Deserialize;

/// A model for describing ARGS of the bot.
/// Consists of:
/// 1. Path to config.json with tokens, admins and the upstream URL
/// 2. Directory for per-conversation context files
/// 3. Path to the rotating log file
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, value_name = "FILE", default_value = "config.json")]
    pub config_json_path: PathBuf,
    #[arg(long, value_name = "DIR", default_value = "data/ctx")]
    pub ctx_dir: PathBuf,
    #[arg(long, value_name = "FILE", default_value = "data/log/log.txt")]
    pub log_path: PathBuf,
}

/// A model for describing configuration of the bot.
/// Consists of:
/// 1. Base URL of the upstream schedule service
/// 2. Messenger ids of administrators
/// 3. Bot tokens per platform
/// 4. Optional database address for future storage backends
/// 5. Periods for upstream re-crawl info and context flushing
#[derive(Deserialize, Debug)]
pub struct Config {
    pub schedule_url: String,
    #[serde(default)]
    pub admins: Vec<i64>,
    pub vk_token: Option<String>,
    pub telegram_token: Option<String>,
    pub database_address: Option<String>,
    #[serde(default = "default_update_period_mins")]
    pub update_period_mins: u64,
    #[serde(default = "default_save_period_secs")]
    pub save_period_secs: u64,
}

fn default_update_period_mins() -> u64 {
    10
}

fn default_save_period_secs() -> u64 {
    30
}

/// Merges config.json with `SCHED_`-prefixed environment overrides.
pub fn load(args: &Args) -> Result<Config, figment::Error> {
    Figment::new()
        .merge(Json::file(&args.config_json_path))
        .merge(Env::prefixed("SCHED_"))
        .extract()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_with_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "schedule_url": "https://sched.example.org/",
                "admins": [100500],
                "telegram_token": "42:token"
            }"#,
        )
        .unwrap();
        assert_eq!(config.admins, [100500]);
        assert_eq!(config.update_period_mins, 10);
        assert_eq!(config.save_period_secs, 30);
        assert!(config.vk_token.is_none());
        assert!(config.database_address.is_none());
    }
}
