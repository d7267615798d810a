use anyhow::Result;

use fixembed::Relay;

/// Print the handler result for `url`. A failed resolution is still a
/// successful run: the JSON carries the error or redirect.
pub async fn cmd_resolve(relay: &Relay, url: &str, pretty: bool) -> Result<()> {
    match relay.dispatch(url) {
        Some(handler) => tracing::info!("🔎 {} handler", handler.platform().display_name()),
        None => tracing::info!("⚠️  No handler for {url}"),
    }

    let result = relay.handle(url).await;
    let json = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}
