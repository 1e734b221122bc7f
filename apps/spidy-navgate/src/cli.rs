use sp_core::NavigationTrigger;
use std::path::PathBuf;

pub(crate) const USAGE: &str = "\
usage: spidy-navgate [OPTIONS] [URL...]

Runs each URL through a navigation gate, the way an embedded rendering
engine would. Reads one URL per line from stdin when no URL is given.

options:
  --config PATH     gate config (TOML); defaults to $SPIDY_GATE_CONFIG
  --log FILTER      log filter; defaults to $SPIDY_LOG, then `info`
  --main-frame      treat navigations as main-frame (default: sub-frame)
  --trigger KIND    link-clicked|form-submitted|back-forward|reload|redirect|typed|other
  --json            print one JSON record per decision
  --stats           print navigation statistics at the end
  -h, --help        show this help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliOptions {
    pub config_path: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub main_frame: bool,
    pub trigger: NavigationTrigger,
    pub json: bool,
    pub stats: bool,
    pub help: bool,
    pub urls: Vec<String>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            log_filter: None,
            main_frame: false,
            trigger: NavigationTrigger::LinkClicked,
            json: false,
            stats: false,
            help: false,
            urls: Vec::new(),
        }
    }
}

pub(crate) fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "missing path after --config".to_owned())?;
                options.config_path = Some(PathBuf::from(path));
            }
            "--log" => {
                let filter = args
                    .next()
                    .ok_or_else(|| "missing filter after --log".to_owned())?;
                options.log_filter = Some(filter);
            }
            "--trigger" => {
                let name = args
                    .next()
                    .ok_or_else(|| "missing kind after --trigger".to_owned())?;
                options.trigger = NavigationTrigger::from_name(&name)
                    .ok_or_else(|| format!("unsupported trigger kind `{name}`"))?;
            }
            "--main-frame" => options.main_frame = true,
            "--json" => options.json = true,
            "--stats" => options.stats = true,
            "-h" | "--help" => options.help = true,
            "--" => {
                options.urls.extend(args.by_ref());
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown option `{other}`"));
            }
            _ => options.urls.push(arg),
        }
    }

    Ok(options)
}
