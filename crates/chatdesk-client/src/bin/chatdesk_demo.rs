use anyhow::Result;
use chatdesk_client::{ChatClientService, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Create and run the client service
    let service = ChatClientService::new(config);
    service.run().await
}
