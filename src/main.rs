fn main() {
    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    if cli.show_version {
        println!("digest-tui {}", digest_tui::VERSION);
        return;
    }

    if cli.show_help {
        println!(
            "digest-tui — Browse Slack thread digests from the terminal.\n\n  --server <url>       Backend base URL (overrides the config file)\n  --channel <id>       Channel to open at startup\n  --check-server       Probe the backend health endpoint and exit\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
        );
        return;
    }

    if cli.check_server {
        if let Err(err) = check_server_once(cli.server) {
            eprintln!("Server check failed: {err:?}");
            std::process::exit(1);
        }
        return;
    }

    let options = digest_tui::app::Options {
        server_url: cli.server,
        channel_id: cli.channel,
    };
    if let Err(err) = digest_tui::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

#[derive(Default)]
struct Cli {
    server: Option<String>,
    channel: Option<String>,
    show_version: bool,
    show_help: bool,
    check_server: bool,
}

fn parse_args() -> Result<Cli, String> {
    let mut cli = Cli::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => cli.show_version = true,
            "--help" | "-h" => cli.show_help = true,
            "--check-server" => cli.check_server = true,
            "--server" => match args.next() {
                Some(value) => cli.server = Some(value),
                None => return Err("--server requires a base URL".to_string()),
            },
            "--channel" => match args.next() {
                Some(value) => cli.channel = Some(value),
                None => return Err("--channel requires a channel id".to_string()),
            },
            other => {
                return Err(format!(
                    "Unknown argument: {other}. Run with --help for usage."
                ))
            }
        }
    }
    Ok(cli)
}

fn check_server_once(server: Option<String>) -> anyhow::Result<()> {
    let cfg = digest_tui::config::load(digest_tui::config::LoadOptions::default())?;
    let base_url = server.unwrap_or(cfg.server.base_url);

    let client = digest_tui::api::Client::new(digest_tui::api::ClientConfig {
        base_url: base_url.clone(),
        timeout: cfg.server.timeout,
        http_client: None,
    })?;
    let health = client.health()?;

    anyhow::ensure!(health.ok, "{base_url} reported an unhealthy state");
    anyhow::ensure!(
        health.db,
        "{base_url} is up, but its database is unreachable"
    );
    println!("{base_url} is healthy (database reachable).");
    Ok(())
}
