// storefront/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
  Development,
  Test,
  Production,
}

impl FromStr for AppEnv {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "development" | "dev" | "local" => Ok(AppEnv::Development),
      "test" => Ok(AppEnv::Test),
      "production" | "prod" => Ok(AppEnv::Production),
      other => Err(AppError::Config(format!("Invalid APP_ENV '{}'", other))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
  pub access_token: String,
  pub api_base: String,
  /// Secret used to check `x-signature` on webhooks. Unset disables the check.
  pub webhook_secret: Option<String>,
  pub timeout: Duration,
  pub currency_id: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
  pub host: String,
  pub port: u16,
  pub username: String,
  pub password: String,
  pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
  pub from: String,
  pub admin_email: String,
  pub max_attempts: u32,
  pub retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// Unset runs the service on the in-memory order store.
  pub database_url: Option<String>,
  pub app_env: AppEnv,
  pub app_base_url: String,
  pub mercadopago: MercadoPagoConfig,
  /// Unset logs outgoing mail instead of delivering it.
  pub smtp: Option<SmtpConfig>,
  pub email: EmailConfig,
  pub whatsapp_number: String,
  pub admin_api_token: Option<String>,
  pub allow_cancelled_reentry: bool,
  pub log_format: LogFormat,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds the configuration from any variable source.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let require = |name: &str| get(name).ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", name)));
    let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

    let server_host = or("SERVER_HOST", "127.0.0.1");
    let server_port = parse_num::<u16>("SERVER_PORT", &or("SERVER_PORT", "8080"))?;
    let database_url = get("DATABASE_URL");
    let app_env = or("APP_ENV", "development").parse::<AppEnv>()?;
    let app_base_url = get("APP_BASE_URL")
      .unwrap_or_else(|| format!("http://{}:{}", server_host, server_port))
      .trim_end_matches('/')
      .to_string();

    let mercadopago = MercadoPagoConfig {
      access_token: require("MERCADOPAGO_ACCESS_TOKEN")?,
      api_base: or("MERCADOPAGO_API_BASE", "https://api.mercadopago.com")
        .trim_end_matches('/')
        .to_string(),
      webhook_secret: get("MERCADOPAGO_WEBHOOK_SECRET"),
      timeout: Duration::from_secs(parse_num("MERCADOPAGO_TIMEOUT_SECS", &or("MERCADOPAGO_TIMEOUT_SECS", "10"))?),
      currency_id: or("CURRENCY_ID", "ARS"),
    };

    let smtp = match get("SMTP_HOST") {
      Some(host) => Some(SmtpConfig {
        host,
        port: parse_num("SMTP_PORT", &or("SMTP_PORT", "587"))?,
        username: require("SMTP_USERNAME")?,
        password: require("SMTP_PASSWORD")?,
        timeout: Duration::from_secs(parse_num("SMTP_TIMEOUT_SECS", &or("SMTP_TIMEOUT_SECS", "10"))?),
      }),
      None => None,
    };

    let email = EmailConfig {
      from: or("EMAIL_FROM", "Tienda <no-reply@localhost>"),
      admin_email: require("ADMIN_EMAIL")?,
      max_attempts: parse_num::<u32>("EMAIL_MAX_ATTEMPTS", &or("EMAIL_MAX_ATTEMPTS", "3"))?.max(1),
      retry_backoff: Duration::from_millis(parse_num(
        "EMAIL_RETRY_BACKOFF_MS",
        &or("EMAIL_RETRY_BACKOFF_MS", "500"),
      )?),
    };

    let whatsapp_number = require("WHATSAPP_NUMBER")?;
    let admin_api_token = get("ADMIN_API_TOKEN");
    let allow_cancelled_reentry = parse_num::<bool>(
      "ALLOW_CANCELLED_REENTRY",
      &or("ALLOW_CANCELLED_REENTRY", "true"),
    )?;
    let log_format = match or("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
      "json" => LogFormat::Json,
      "pretty" | "text" => LogFormat::Pretty,
      other => return Err(AppError::Config(format!("Invalid LOG_FORMAT '{}'", other))),
    };

    tracing::info!(
      app_env = ?app_env,
      persistent_store = database_url.is_some(),
      smtp = smtp.is_some(),
      webhook_signatures = mercadopago.webhook_secret.is_some(),
      "Application configuration loaded."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_env,
      app_base_url,
      mercadopago,
      smtp,
      email,
      whatsapp_number,
      admin_api_token,
      allow_cancelled_reentry,
      log_format,
    })
  }
}

fn parse_num<T>(name: &str, raw: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", name, raw, e)))
}
