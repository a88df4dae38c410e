use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = reachctl::Cli::parse();
    reachctl::load_env_file(&cli.env_file);
    reachctl::init_tracing(cli.verbose);
    if let Err(err) = reachctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
