#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use fsevents_agent::core::config::Config;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_fsevents-agent") {
        return PathBuf::from(path);
    }
    let exe_name = if cfg!(windows) {
        "fsevents-agent.exe"
    } else {
        "fsevents-agent"
    };
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name))
        .filter(|path| path.exists())
        .expect("unable to resolve fsevents-agent binary path for integration test")
}

/// Names of the variables the agent reads, cleared for every CLI case.
const AGENT_ENV: &[&str] = &[
    "WATCH_PATHS",
    "FN_STATE_JSON",
    "CACHE_BPS_THRESHOLD",
    "CHECK_FS",
    "FSE_THRESHOLD_SECONDS",
    "FSE_MAX_FILES",
    "FSE_STALE_OPEN_TTL_SECS",
    "FSE_RESTORE_POLICY",
    "FSE_ACTIVITY_LOG",
    "FSE_OUTPUT_FORMAT",
];

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

pub fn run_cli_case_with_env(case_name: &str, args: &[&str], envs: &[(&str, &str)]) -> CmdResult {
    let root = std::env::temp_dir().join("fse-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command.args(args).env("RUST_BACKTRACE", "1");
    for name in AGENT_ENV {
        command.env_remove(name);
    }
    for (name, value) in envs {
        command.env(name, value);
    }
    let output = command.output().expect("execute fsevents-agent command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let log_content = format!(
        "case={case_name}\nbin={}\nargs={args:?}\nenvs={envs:?}\nstatus={}\n\
         ----- stdout -----\n{stdout}\n----- stderr -----\n{stderr}\n",
        bin_path.display(),
        output.status
    );
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Default config with every file under `dir`.
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.watch_list = dir.join("watch.cnf");
    config.paths.state_file = dir.join("state.json");
    config.paths.activity_log = dir.join("activity.jsonl");
    config
}
