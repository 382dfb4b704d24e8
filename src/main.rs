use std::io::{self, BufRead, Write};

use classroomd::config::Config;
use classroomd::ipc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_env("CLASSROOMD_LOG")
        .unwrap_or_else(|_| EnvFilter::new("classroomd=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let workspace = config.workspace.clone();
    info!(api = %config.api_base_url, "classroomd starting");
    let mut state = ipc::AppState::new(config);

    if let Some(path) = workspace {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            error!("failed to open workspace from environment: {e:#}");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed; exiting");
}
