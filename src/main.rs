use docker_push::cli::{Args, Runner};
use docker_push::logging::Ui;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    let default_filter = if args.verbose { "docker_push=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runner = Runner::new(args);
    if let Err(e) = runner.run().await {
        runner.logger().error(&e.to_string());
        std::process::exit(1);
    }
}
