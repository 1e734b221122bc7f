mod cli;
mod host;

use cli::CliOptions;
use host::EngineHost;
use sp_core::SpidyResult;
use sp_navigation::GateConfig;
use sp_navigation::NavigationGate;
use sp_navigation::config::config_path_from_env;
use std::io::BufRead;
use std::process::ExitCode;
use tracing::debug;
use tracing::error;
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "SPIDY_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

fn main() -> ExitCode {
    let options = match cli::parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("spidy-navgate: {error}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    if options.help {
        println!("{}", cli::USAGE);
        return ExitCode::SUCCESS;
    }

    init_tracing(options.log_filter.as_deref());

    let gate = match load_config(&options).and_then(NavigationGate::new) {
        Ok(gate) => gate,
        Err(error) => {
            eprintln!("spidy-navgate startup error: {error}");
            return ExitCode::from(2);
        }
    };

    let mut host = EngineHost::new(gate, options.trigger, options.main_frame);
    let urls = if options.urls.is_empty() {
        read_stdin_urls()
    } else {
        options.urls.clone()
    };

    for raw_url in urls {
        let report = match host.submit(&raw_url) {
            Ok(report) => report,
            Err(error) => {
                error!(url = %raw_url, %error, "skipping unparsable URL");
                continue;
            }
        };

        if options.json {
            match host::format_json(&report) {
                Ok(line) => println!("{line}"),
                Err(error) => error!(%error, "failed to encode decision record"),
            }
        } else {
            println!("{}", host::format_text(&report));
        }
    }

    if options.stats {
        match serde_json::to_string_pretty(&host.stats()) {
            Ok(stats) => println!("{stats}"),
            Err(error) => error!(%error, "failed to encode navigation stats"),
        }
    }

    ExitCode::SUCCESS
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).ok(),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("spidy-navgate: failed to install log subscriber: {error}");
    }
}

fn load_config(options: &CliOptions) -> SpidyResult<GateConfig> {
    let path = options.config_path.clone().or_else(config_path_from_env);

    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading gate config");
            GateConfig::load(&path)
        }
        None => Ok(GateConfig::default()),
    }
}

fn read_stdin_urls() -> Vec<String> {
    std::io::stdin()
        .lock()
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}
