//! Connect to a VSCP daemon, print what it reports about itself and stream
//! events until Ctrl-C.
//!
//! ```text
//! cargo run --example monitor -- [host] [port] [user] [password]
//! RUST_LOG=vscp_client=debug cargo run --example monitor
//! ```

use vscp_client::{Client, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(vscp_client::protocol::DEFAULT_PORT);
    let user = args.next().unwrap_or_else(|| "admin".to_string());
    let password = args.next().unwrap_or_else(|| "secret".to_string());

    let client = Client::builder()
        .host(host)
        .port(port)
        .on_connection_error(|e| tracing::error!("connection error: {}", e))
        .build();

    client.connect().await?;
    client.login(&user, &password).await?;

    let version = client.get_remote_version().await?;
    tracing::info!("server version {}", version);

    for iface in client.get_interfaces().await? {
        tracing::info!("interface {} type {} {} {}", iface.index, iface.kind, iface.guid, iface.name);
    }

    client.on_event(|event| {
        println!(
            "class={} type={} guid={} data={:02X?}",
            event.vscp_class, event.vscp_type, event.guid, event.data
        );
    });
    client.start_rcv_loop().await?;
    tracing::info!("receiving events, Ctrl-C to stop");

    let _ = tokio::signal::ctrl_c().await;

    client.stop_rcv_loop().await?;
    client.disconnect().await;
    Ok(())
}
