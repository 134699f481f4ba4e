//! Certificate issuer entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zkcert_issuer::server::run().await
}
