use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use matchforge::{MatchServer, ServerConfig};
use matchforge_session::{MemoryStore, PlayerRecord};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };

    let store = MemoryStore::new();
    for account in &config.accounts {
        store.insert_player(PlayerRecord {
            account_id: account.account_id,
            username: account.username.clone(),
            nickname: account.nickname.clone(),
            level: 1,
            pen: config.starting_pen,
            ap: config.starting_ap,
            ..PlayerRecord::default()
        });
    }

    let server = MatchServer::builder()
        .config(config)
        .store(Arc::new(store))
        .build();

    let runner = Arc::clone(&server);
    let serving = tokio::spawn(runner.run());

    // Blocking console loop on its own thread; "exit" stops the server.
    let console = Arc::clone(&server);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line).is_err() {
                break;
            }
            if line.trim().eq_ignore_ascii_case("exit") {
                console.shutdown();
                break;
            }
        }
    });

    serving.await??;
    Ok(())
}
