use configs_builder::ConfigBuilder;
use rabbitmq::{client::LapinBroker, Connector};
use std::{error::Error, sync::Arc};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cfg = ConfigBuilder::new().rabbitmq().build()?;

    let (mut connector, mut events) = Connector::new(LapinBroker::new(&cfg.app.name));
    connector.configure(cfg.rabbitmq);
    let connector = Arc::new(connector);

    let lifecycle = tokio::spawn({
        let connector = connector.clone();
        async move { connector.run().await }
    });

    loop {
        tokio::select! {
            Some(()) = events.connected.recv() => {
                let kinds = connector.kinds().await;
                info!(kinds = ?kinds, "relay is ready");
            }
            Some(()) = events.disconnected.recv() => warn!("broker connection lost"),
            Some(msg) = events.messages.recv() => {
                info!(kind = msg.kind, "{}", String::from_utf8_lossy(&msg.body));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    connector.shutdown();
    lifecycle.await?;

    Ok(())
}
