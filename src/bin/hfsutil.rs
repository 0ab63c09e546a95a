use clap::{ArgGroup, Parser};
use hfsutil::mounts::{ProcMounts, Unsupported};
use hfsutil::{Action, Config, Host, Status};
use log::{LevelFilter, Log, Metadata, Record};
use std::io;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "hfsutil")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("action").required(true).args(["probe", "get_uuid", "set_uuid"])))]
struct Cli {
    /// Print the volume name
    #[arg(short = 'p')]
    probe: bool,

    /// Print the volume UUID
    #[arg(short = 'k')]
    get_uuid: bool,

    /// Assign a newly generated volume UUID
    #[arg(short = 's')]
    set_uuid: bool,

    /// Log diagnostics to stderr
    #[arg(short = 'v')]
    verbose: bool,

    /// Device name, such as disk0s2, /dev/fd/3 or an image path
    device: String,

    /// Flags passed along by the daemon (removable, readonly, ...), ignored
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    extra: Vec<String>,
}

impl Cli {
    fn action(&self) -> Action {
        if self.probe {
            Action::Probe
        } else if self.get_uuid {
            Action::GetUuid
        } else {
            Action::SetUuid
        }
    }
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        eprintln!("hfsutil: {}: {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors are reported with the daemon's invalid-argument code.
            return if e.use_stderr() {
                ExitCode::from(Status::Invalid.exit_code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if cli.verbose && log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }

    let config = Config::default();
    let mounts = ProcMounts::from_config(&config);
    let host = Host {
        config: &config,
        mounts: &mounts,
        attributes: &Unsupported,
    };

    let status = hfsutil::ops::run(&host, cli.action(), &cli.device, &mut io::stdout());
    ExitCode::from(status.exit_code())
}
