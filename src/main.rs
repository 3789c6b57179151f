/// Waypost - patrol device binding and check-in server
///
/// Field personnel check in at physical patrol points with a device bound
/// to an employee identity. This service owns binding credentials, the
/// bind/login/unbind lifecycle, and duplicate-scan suppression.

mod api;
mod auth;
mod binding;
mod checkin;
mod config;
mod context;
mod db;
mod directory;
mod error;
mod fingerprint;
mod jobs;
mod server;
#[cfg(test)]
mod test_support;

use config::ServerConfig;
use context::AppContext;
use error::PatrolResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> PatrolResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypost=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
 _       __                              __
| |     / /___ ___  ______  ____  _____/ /_
| | /| / / __ `/ / / / __ \/ __ \/ ___/ __/
| |/ |/ / /_/ / /_/ / /_/ / /_/ (__  ) /_
|__/|__/\__,_/\__, / .___/\____/____/\__/
             /____/_/

        Patrol check-in server v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
