//! Entrypoint for the `duck` binary.

#[tokio::main]
async fn main() {
    if let Err(err) = duck_cli::run().await {
        // Errors go to stdout as "<code> [ERR]: <message>".
        println!(
            "{} [ERR]: {err:#}",
            duck_core::WireErrorCode::Generic as u8
        );
        std::process::exit(1);
    }
}
