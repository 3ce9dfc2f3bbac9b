mod cli;

#[cfg(feature = "server")]
#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = cli::dispatch().await {
        eprintln!("\u{001b}[31merror:\u{001b}[0m {err:?}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "server"))]
fn main() {
    init_tracing();
    if let Err(err) = cli::dispatch_sync() {
        eprintln!("\u{001b}[31merror:\u{001b}[0m {err:?}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
