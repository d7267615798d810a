use anyhow::Result;

use fixembed::Relay;

pub async fn cmd_serve(relay: Relay) -> Result<()> {
    let config = relay.config();
    tracing::info!(
        platforms = relay.registry().len(),
        embed_domain = %config.embed_domain,
        "relay ready"
    );
    fixembed::server::serve(relay).await
}
