// storefront/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use std::io;
use std::sync::Arc;
use tienda::config::{AppConfig, LogFormat};
use tienda::services::mailer::{LogMailer, Mailer, SmtpMailer};
use tienda::services::mercadopago::MercadoPagoClient;
use tienda::state::AppState;
use tienda::store::{InMemoryOrderStore, OrderStore, PgOrderStore};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Json => builder.json().init(),
    LogFormat::Pretty => builder.init(),
  }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
  tracing::error!(error = %err, "{}", context);
  io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

async fn build_store(config: &AppConfig) -> io::Result<Arc<dyn OrderStore>> {
  match &config.database_url {
    Some(url) => {
      let store = PgOrderStore::connect(url)
        .await
        .map_err(|e| startup_error("Failed to connect to the database", e))?;
      store
        .migrate()
        .await
        .map_err(|e| startup_error("Failed to run migrations", e))?;
      tracing::info!("Connected to PostgreSQL and applied migrations.");
      Ok(Arc::new(store))
    }
    None => {
      tracing::warn!("DATABASE_URL is not set; orders live in memory and are lost on restart.");
      Ok(Arc::new(InMemoryOrderStore::new()))
    }
  }
}

fn build_mailer(config: &AppConfig) -> io::Result<Arc<dyn Mailer>> {
  match &config.smtp {
    Some(smtp) => {
      let mailer = SmtpMailer::new(smtp, &config.email.from).map_err(|e| startup_error("Invalid SMTP setup", e))?;
      tracing::info!(host = %smtp.host, port = smtp.port, "SMTP transport configured.");
      Ok(Arc::new(mailer))
    }
    None => {
      tracing::warn!("SMTP_HOST is not set; outgoing email is only logged.");
      Ok(Arc::new(LogMailer))
    }
  }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  // Configuration decides the log format, so it loads before the subscriber.
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      init_tracing(LogFormat::Pretty);
      return Err(startup_error("Failed to load application configuration", e));
    }
  };
  init_tracing(app_config.log_format);
  tracing::info!(env = ?app_config.app_env, base_url = %app_config.app_base_url, "Starting storefront server...");

  let store = build_store(&app_config).await?;
  let gateway = MercadoPagoClient::new(&app_config.mercadopago)
    .map_err(|e| startup_error("Failed to build the MercadoPago client", e))?;
  let mailer = build_mailer(&app_config)?;

  let app_state = AppState::new(app_config.clone(), store, Arc::new(gateway), mailer);

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(tienda::web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
