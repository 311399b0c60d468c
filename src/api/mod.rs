pub mod auth;
pub mod error;
pub mod routes;

use crate::auth::TokenIssuer;
use crate::config::Config;
use crate::db::Database;
use crate::reporter::WeeklyReporter;
use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub database: Arc<Database>,
    pub tokens: Arc<TokenIssuer>,
    pub reporter: Arc<WeeklyReporter>,
    pub bcrypt_cost: u32,
    pub admin_token: Option<String>,
}

impl ApiState {
    pub fn new(config: &Config, database: Arc<Database>, reporter: Arc<WeeklyReporter>) -> Result<Self> {
        let tokens = TokenIssuer::new(config.jwt_secret()?, config.token_ttl_days);

        Ok(Self {
            database,
            tokens: Arc::new(tokens),
            reporter,
            bcrypt_cost: config.bcrypt_cost,
            admin_token: config
                .admin_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
        })
    }
}

/// Serves until `shutdown` resolves, then waits for open connections to finish
/// so every clone of the state is released before returning.
pub async fn run_server<F>(config: Arc<Config>, state: ApiState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app: Router = routes::router(state);

    let addr = (config.api_host.as_str(), config.api_port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server: {}:{}", addr.0, addr.1))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read API server address")?;

    info!(address = %local_addr, "DeepFocus API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ApiState, run_server};
    use crate::config::Config;
    use crate::db::Database;
    use crate::mailer::LogMailer;
    use crate::reporter::WeeklyReporter;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn shutdown_releases_state_before_returning() {
        let database = Arc::new(Database::open_in_memory().expect("db"));
        let reporter = Arc::new(WeeklyReporter::new(
            Arc::clone(&database),
            Arc::new(LogMailer),
            "noreply@example.com",
        ));
        let config = Config {
            api_port: 0,
            jwt_secret: Some("shutdown-test-secret-with-enough-length".to_string()),
            ..Config::default()
        };
        let state = ApiState::new(&config, Arc::clone(&database), reporter).expect("state");

        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(run_server(Arc::new(config), state, async move {
            let _ = stopped.await;
        }));

        stop.send(()).expect("signal");
        server.await.expect("join").expect("server");

        let database = Arc::try_unwrap(database)
            .unwrap_or_else(|_| panic!("database still shared after shutdown"));
        database.close().expect("close");
    }
}
