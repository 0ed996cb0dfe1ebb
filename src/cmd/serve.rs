//! Admin API server command — `signworks serve`.

use anyhow::Result;

use signworks::admin::server::{ServerConfig, start_server};
use signworks::config::SiteConfig;

pub async fn cmd_serve(config: SiteConfig, port: u16, dev: bool, open: bool) -> Result<()> {
    // Spawn browser open before starting the server (which blocks).
    if open && !dev {
        let url = format!("http://localhost:{}", port);
        tokio::spawn(async move {
            // Small delay to let the server start binding
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                eprintln!("Failed to open browser: {}", e);
            }
        });
    }

    start_server(ServerConfig {
        port,
        config,
        dev_mode: dev,
    })
    .await
}
