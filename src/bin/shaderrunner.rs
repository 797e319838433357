use shaderrunner::app::{App, CancelToken};
use shaderrunner::config::{Config, RunMode};
use std::sync::OnceLock;

static CANCEL: OnceLock<CancelToken> = OnceLock::new();

/// Signal-safe: only touches an already-initialized `OnceLock` and an
/// `AtomicBool` store via `CancelToken::cancel`.
extern "C" fn handle_sigint(_signum: libc::c_int) {
    if let Some(cancel) = CANCEL.get() {
        cancel.cancel();
    }
}

/// Wires SIGINT to `cancel`, so Ctrl+C during `run_headless` reaches the
/// graceful-shutdown path (spec §5) instead of killing the process outright.
fn install_sigint_handler(cancel: CancelToken) {
    CANCEL.set(cancel).ok();
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_sigint as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = if args.len() == 1 && args[0].ends_with(".json") {
        Config::from_json_file(std::path::Path::new(&args[0]))?
    } else {
        Config::from_args(args)?
    };

    let cancel = CancelToken::new();
    install_sigint_handler(cancel.clone());
    let mode = config.mode;
    let mut app = App::new(&config, cancel)?;

    match mode {
        RunMode::Record | RunMode::Stream => app.run_headless()?,
        RunMode::Live => shaderrunner::app::run_interactive(app, &config.shader_id)?,
    }

    Ok(())
}
