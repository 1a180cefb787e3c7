//! Binary entry point: parses CLI arguments and runs the driver.

#[tokio::main]
async fn main() {
    // reqwest's rustls backend and the TLS-ALPN-01 responder both need a
    // process-wide default crypto provider; install it before anything
    // touches TLS.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("warning: a rustls crypto provider was already installed");
    }

    if let Err(e) = acmed::cli::run().await {
        eprintln!("acmed: {}", e);
        std::process::exit(1);
    }
}
