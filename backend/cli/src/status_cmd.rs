//! `chatitp status`: ask a running server for its health report.

use std::path::Path;

use anyhow::Result;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = chatitp_config::load(config_path).await?;
    let url = format!("http://localhost:{}/api/health", config.server.port);

    println!("ChatITP status: checking {url}...");
    match reqwest::Client::new().get(&url).send().await {
        Ok(resp) => {
            let body: serde_json::Value = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Err(_) => {
            println!("ChatITP is not running on port {}", config.server.port);
        }
    }
    Ok(())
}
