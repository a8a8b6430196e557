#[tokio::main]
async fn main() {
    if let Err(err) = agency_chat_server::app::run().await {
        tracing::error!(error = %err, "server stopped");
        eprintln!("agency-chat-server: {err:#}");
        std::process::exit(1);
    }
}
