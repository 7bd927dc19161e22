//! Injector entry point: parse the slash options, then run one injection
//! session against the selected target.

use std::env;
use std::process::ExitCode;

use injector::args::{self, Options, TargetKind};
use injector::logger;
use injector::remote::{InjectionSession, Target};
use log::{error, info};

fn main() -> ExitCode {
    // Keep the logger handle alive for the duration of the run; losing it is
    // not fatal, diagnostics just fall back to the raw error stream.
    let _logger = match logger::init() {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("logging unavailable: {e}");
            None
        }
    };

    let argv: Vec<String> = env::args().skip(1).collect();
    if argv.is_empty() {
        eprintln!("No arguments provided.");
        eprintln!("Run with /? for help.");
        return ExitCode::FAILURE;
    }

    let options = args::parse(argv);
    if options.show_help {
        args::print_help();
        return ExitCode::SUCCESS;
    }

    run(options)
}

fn run(options: Options) -> ExitCode {
    let Some(kind) = options.target else {
        eprintln!("No hook type specified.");
        eprintln!("Run with /? for help.");
        return ExitCode::FAILURE;
    };
    let Some(hook) = options.hook else {
        eprintln!("No payload module specified.");
        eprintln!("Run with /? for help.");
        return ExitCode::FAILURE;
    };
    let Some(application) = options.application else {
        eprintln!("No value supplied for the target option.");
        eprintln!("Run with /? for help.");
        return ExitCode::FAILURE;
    };

    let target = match kind {
        TargetKind::Pid => match args::parse_pid(&application) {
            Ok(pid) => Target::Pid(pid),
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        TargetKind::Executable => Target::Launch {
            executable: application,
            working_directory: options.working_directory,
            arguments: options.command_line_args,
        },
    };

    let session = match InjectionSession::acquire(&target) {
        Ok(session) => session,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match session.run(&hook) {
        Ok(()) => {
            info!("injected {hook}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
