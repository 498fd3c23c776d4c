use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    beyond::run().await
}
