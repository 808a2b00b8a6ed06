// SPDX-License-Identifier: GPL-3.0-or-later

use mktrace::trace::CancellationToken;
use mktrace::{args, config, context, modes};
use std::env;
use std::process::ExitCode;

/// Driver function of the application.
fn main() -> anyhow::Result<ExitCode> {
    // Parse the command line arguments.
    let matches = args::cli().get_matches();
    let arguments = args::Arguments::try_from(matches)?;

    // Initialize the logging system, `RUST_LOG` overrides the verbosity.
    let level = match arguments.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let pkg_name = env!("CARGO_PKG_NAME");
    let pkg_version = env!("CARGO_PKG_VERSION");
    log::info!("{pkg_name} v{pkg_version}");
    let os = env::consts::OS;
    let family = env::consts::FAMILY;
    let arch = env::consts::ARCH;
    log::info!("Running on... {family}/{os} {arch}");
    log::info!("{arguments}");

    // Capture application context.
    let context = context::Context::capture()?;
    log::info!("{context}");
    // Load the configuration.
    let configuration = config::Loader::load(&context, &arguments.config)?;
    log::info!("{configuration}");

    // Termination signals cancel the running configure.
    let cancel = CancellationToken::new();
    for signal in signal_hook::consts::TERM_SIGNALS {
        signal_hook::flag::register(*signal, cancel.flag())?;
    }

    // Run the application.
    let application = modes::Mode::configure(context, arguments, configuration, &cancel)?;
    let result = application.run();
    log::debug!("Exit code: {result:?}");

    Ok(result)
}
