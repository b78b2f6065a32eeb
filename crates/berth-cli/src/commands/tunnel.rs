//! Tunnel commands

use crate::output::{Formattable, OutputFormat, OutputFormatter};
use anyhow::Result;
use berth_core::OrchestratorConfig;
use berth_runtime::{TunnelManager, TunnelProvider, TunnelStatus};

impl Formattable for TunnelStatus {
    fn table_headers() -> Vec<String> {
        vec![
            "Active".to_string(),
            "Provider".to_string(),
            "Public URL".to_string(),
            "Local Port".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.active.to_string(),
            self.provider.clone().unwrap_or_else(|| "-".to_string()),
            self.public_url.clone().unwrap_or_else(|| "-".to_string()),
            self.local_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("Active".to_string(), self.active.to_string()),
            (
                "Provider".to_string(),
                self.provider.clone().unwrap_or_else(|| "-".to_string()),
            ),
            (
                "Public URL".to_string(),
                self.public_url.clone().unwrap_or_else(|| "-".to_string()),
            ),
            (
                "Local Port".to_string(),
                self.local_port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]
    }
}

/// Open a tunnel to the runtime and hold it until interrupted
pub async fn open_tunnel(
    config: &OrchestratorConfig,
    port: Option<u16>,
    provider: TunnelProvider,
    output_format: OutputFormat,
) -> Result<()> {
    let formatter = OutputFormatter::new(output_format);
    let manager = TunnelManager::new(config.tunnel.clone());
    let port = port.unwrap_or(config.service_port);

    formatter.print_progress(&format!("Opening {} tunnel for port {}", provider, port));
    let result = manager.open(provider, port).await;
    formatter.clear_progress();
    result?;

    formatter.print_item(&manager.status().await)?;
    formatter.print_info("Press Ctrl-C to close the tunnel")?;

    tokio::signal::ctrl_c().await?;

    if let Err(e) = manager.close().await {
        formatter.print_warning(&format!("Tunnel did not close cleanly: {}", e))?;
    } else {
        formatter.print_success("Tunnel closed")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_status_formatting() {
        let inactive = TunnelStatus {
            active: false,
            provider: None,
            public_url: None,
            local_port: None,
        };
        assert_eq!(inactive.table_row(), vec!["false", "-", "-", "-"]);

        let active = TunnelStatus {
            active: true,
            provider: Some("cloudflared".to_string()),
            public_url: Some("https://demo.trycloudflare.com".to_string()),
            local_port: Some(62171),
        };
        let pairs = active.key_value_pairs();
        assert_eq!(pairs[1].1, "cloudflared");
        assert_eq!(pairs[2].1, "https://demo.trycloudflare.com");
        assert_eq!(pairs[3].1, "62171");
    }
}
