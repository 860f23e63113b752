use std::path::Path;

use crate::error::{DeployError, DeployResult};

fn run_stem(run: &str) -> DeployResult<&str> {
    Path::new(run)
        .file_stem()
        .and_then(|x| x.to_str())
        .filter(|x| !x.is_empty())
        .ok_or_else(|| DeployError::configuration(format!("invalid run script: {run:?}")))
}

/// The file name of the controller script for a run script,
/// e.g. `worker_controller` for `lib/worker.sh`.
pub fn controller_name(run: &str) -> DeployResult<String> {
    Ok(format!("{}_controller", run_stem(run)?))
}

/// Quotes a value for a POSIX shell.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Generates the controller script for a run script.
///
/// The controller is invoked from the working directory as
/// `controller start -- <machine> <port>`, `controller stop`, or `controller status`.
/// It daemonizes the run script with `nohup`, keeping the process ID in
/// `{basename}.pid` and the combined output in `{basename}.log`.
pub fn controller_script(run: &str) -> DeployResult<String> {
    let stem = run_stem(run)?;
    let run = if Path::new(run).is_absolute() || run.starts_with("./") {
        run.to_string()
    } else {
        format!("./{run}")
    };
    Ok(format!(
        r#"#!/bin/sh
RUN={run}
PID_FILE={pid_file}
LOG_FILE={log_file}

is_running() {{
    [ -f "$PID_FILE" ] && kill -0 "$(cat "$PID_FILE")" 2>/dev/null
}}

case "$1" in
    start)
        shift
        [ "$1" = "--" ] && shift
        if is_running; then
            echo "already running: $(cat "$PID_FILE")"
            exit 0
        fi
        if [ -x "$RUN" ]; then
            nohup "$RUN" "$@" >>"$LOG_FILE" 2>&1 </dev/null &
        else
            nohup sh "$RUN" "$@" >>"$LOG_FILE" 2>&1 </dev/null &
        fi
        echo $! >"$PID_FILE"
        echo "started: $!"
        ;;
    stop)
        if is_running; then
            kill "$(cat "$PID_FILE")"
            echo "stopped: $(cat "$PID_FILE")"
        else
            echo "not running"
        fi
        rm -f "$PID_FILE"
        ;;
    status)
        if is_running; then
            echo "running: $(cat "$PID_FILE")"
        else
            echo "not running"
            exit 1
        fi
        ;;
    *)
        echo "usage: $0 start|stop|status [-- ARGS...]" >&2
        exit 2
        ;;
esac
"#,
        run = shell_quote(&run),
        pid_file = shell_quote(&format!("{stem}.pid")),
        log_file = shell_quote(&format!("{stem}.log")),
    ))
}
