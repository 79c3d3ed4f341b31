use std::env;

use chrono::{Duration, NaiveTime, Weekday};

use crate::error::{Error, Result};
use crate::shows::Cadence;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub port: u16,
  pub host: String,
  pub cadence: Cadence,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let database_url = env::var("DATABASE_URL")
      .unwrap_or_else(|_| "sqlite://requestline.db".to_string());

    let port = env::var("PORT")
      .unwrap_or_else(|_| "3000".to_string())
      .parse()
      .map_err(|e| Error::Config(format!("invalid PORT: {}", e)))?;

    let host = env::var("HOST")
      .unwrap_or_else(|_| "127.0.0.1".to_string());

    let weekday: Weekday = env::var("SHOW_WEEKDAY")
      .unwrap_or_else(|_| "saturday".to_string())
      .parse()
      .map_err(|_| Error::Config("invalid SHOW_WEEKDAY".to_string()))?;

    let start = NaiveTime::parse_from_str(
      &env::var("SHOW_START").unwrap_or_else(|_| "21:00".to_string()),
      "%H:%M",
    )
    .map_err(|e| Error::Config(format!("invalid SHOW_START: {}", e)))?;

    let duration_minutes: i64 = env::var("SHOW_DURATION_MINUTES")
      .unwrap_or_else(|_| "120".to_string())
      .parse()
      .map_err(|e| Error::Config(format!("invalid SHOW_DURATION_MINUTES: {}", e)))?;

    if duration_minutes <= 0 {
      return Err(Error::Config(
        "SHOW_DURATION_MINUTES must be positive".to_string(),
      ));
    }

    Ok(Self {
      database_url,
      port,
      host,
      cadence: Cadence {
        weekday,
        start,
        duration: Duration::minutes(duration_minutes),
      },
    })
  }

  pub fn bind_address(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }
}
