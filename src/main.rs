#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hyperliquid_webhook::run().await
}
