//! onebin launcher
//!
//! Stub executable that the packer fills with resources. On start it installs
//! the embedded runtime (once), refreshes the application files, loads the
//! runtime library, and hands every command-line argument to its entry point.
//! The runtime's exit code becomes the process exit code.
//!
//! The launcher prints nothing of its own unless it fails or `ONEBIN_LOG` is
//! set.

use std::ffi::OsString;
use std::io::Write;

use onebin_core::{resource, Bootstrap, BootstrapError, DynamicLoader};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ONEBIN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn report(err: &anyhow::Error) {
    let choice = if std::env::var_os("NO_COLOR").is_some() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let mut stderr = StandardStream::stderr(choice);
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(Color::Red)).set_bold(true);
    let _ = stderr.set_color(&spec);
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {}", err);

    if let Some(code) = err
        .downcast_ref::<BootstrapError>()
        .and_then(|e| e.source.os_error())
    {
        let _ = writeln!(stderr, "  os error code: {}", code);
    }
}

fn launch(forwarded: &[OsString]) -> anyhow::Result<i32> {
    let source = resource::open_current()?;
    let outcome = Bootstrap::new(&*source, DynamicLoader).run(forwarded)?;
    debug!(exit_code = outcome.exit_code, "runtime returned");
    Ok(outcome.exit_code)
}

fn main() {
    init_tracing();
    let forwarded: Vec<OsString> = std::env::args_os().skip(1).collect();

    // the runtime library and resources are released by the time launch returns
    let code = match launch(&forwarded) {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            1
        }
    };
    std::process::exit(code);
}
