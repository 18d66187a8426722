use anyhow::{Context, Result};
use realmd::config::ServerConfig;
use realmd::realms::RealmRegistry;
use realmd::servers::auth::AuthState;
use realmd::store::{mysql, MySqlAccountStore};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/auth.yaml".to_string();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: auth_server [--conf FILE]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            _ => {}
        }
        i += 1;
    }

    let config: ServerConfig = {
        let content = std::fs::read_to_string(&conf_file)
            .with_context(|| format!("Cannot read config: {}", conf_file))?;
        ServerConfig::from_str(&content)
            .with_context(|| format!("Cannot parse config: {}", conf_file))?
    };

    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url())
        .await
        .with_context(|| format!("Cannot connect to DB: {}", config.sql_ip))?;

    // Startup is the only place a realm fetch is fatal: an auth server with
    // no realm list has nothing to offer.
    let realms = mysql::fetch_realms(&pool)
        .await
        .context("Cannot load realm list")?;
    tracing::info!("[auth] [realms_loaded] count={}", realms.len());

    let registry = Arc::new(RealmRegistry::new(realms));
    let _refresh = RealmRegistry::spawn_refresh(
        Arc::clone(&registry),
        pool.clone(),
        config.realm_refresh(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("[auth] [shutdown_requested]");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!("[auth] [started] Auth Server Started");

    let bind = format!("{}:{}", config.listen_ip, config.listen_port);
    let accounts = Arc::new(MySqlAccountStore::new(pool));
    let state = Arc::new(AuthState::new(config, accounts, registry));

    AuthState::run(state, &bind, shutdown_rx).await?;
    Ok(())
}
