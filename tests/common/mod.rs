use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

impl CmdResult {
    /// Parse stdout as a single JSON line.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.stdout.trim()).unwrap_or_else(|e| {
            panic!(
                "stdout is not one JSON line ({e}); log: {}",
                self.log_path.display()
            )
        })
    }
}

/// Isolated host layout: fake docker/systemd config dirs, HOME, and a
/// config file pointing lrh at them.
pub struct Sandbox {
    pub dir: tempfile::TempDir,
    pub config_path: PathBuf,
    pub daemon_json: PathBuf,
    pub journald_conf: PathBuf,
    pub activity_log: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::build("restart = false\n", "")
    }

    /// Container restarts enabled against `service`.
    pub fn with_container_service(service: &str) -> Self {
        Self::build(&format!("restart = true\nservice = {service:?}\n"), "")
    }

    /// `extra` is appended to the generated config file verbatim.
    pub fn with_settings(extra: &str) -> Self {
        Self::build("restart = false\n", extra)
    }

    fn build(container_extra: &str, extra: &str) -> Self {
        let dir = tempfile::tempdir().expect("create sandbox");
        let root = dir.path();
        fs::create_dir_all(root.join("etc/docker")).expect("docker dir");
        fs::create_dir_all(root.join("etc/systemd")).expect("systemd dir");
        fs::create_dir_all(root.join("home")).expect("home dir");

        let daemon_json = root.join("etc/docker/daemon.json");
        let journald_conf = root.join("etc/systemd/journald.conf");
        let activity_log = root.join("home/activity.jsonl");
        let config_path = root.join("lrh.toml");

        let config = format!(
            "[container]\n\
             daemon_config = {daemon:?}\n\
             {container_extra}\
             \n\
             [journal]\n\
             config_file = {journal:?}\n\
             restart = false\n\
             \n\
             [paths]\n\
             activity_log = {log:?}\n\
             {extra}",
            daemon = daemon_json.display().to_string(),
            journal = journald_conf.display().to_string(),
            log = activity_log.display().to_string(),
        );
        fs::write(&config_path, config).expect("write sandbox config");

        Self {
            dir,
            config_path,
            daemon_json,
            journald_conf,
            activity_log,
        }
    }

    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    /// Run lrh with `--config` pointing at the sandbox config.
    pub fn run(&self, case_name: &str, args: &[&str]) -> CmdResult {
        self.run_with_env(case_name, args, &[])
    }

    /// Like [`Sandbox::run`], with extra environment variables set.
    pub fn run_with_env(&self, case_name: &str, args: &[&str], envs: &[(&str, &str)]) -> CmdResult {
        let config = self.config_path.to_string_lossy().to_string();
        let mut full: Vec<&str> = vec!["--config", &config];
        full.extend_from_slice(args);
        run_cli_case_in(case_name, &full, &self.home(), envs)
    }

    pub fn activity_events(&self) -> Vec<serde_json::Value> {
        fs::read_to_string(&self.activity_log)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).expect("activity line is JSON"))
            .collect()
    }
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
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_lrh") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "lrh.exe" } else { "lrh" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve lrh binary path for integration test"),
    }
}

/// Run lrh with a throwaway HOME so default config/log paths stay isolated.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

/// [`run_cli_case`] with extra environment variables, applied after the
/// inherited `LRH_*` variables are cleared.
pub fn run_cli_case_with_env(case_name: &str, args: &[&str], envs: &[(&str, &str)]) -> CmdResult {
    let home = tempfile::tempdir().expect("temp home");
    run_cli_case_in(case_name, args, home.path(), envs)
}

fn run_cli_case_in(
    case_name: &str,
    args: &[&str],
    home: &Path,
    envs: &[(&str, &str)],
) -> CmdResult {
    let root = std::env::temp_dir().join("lrh-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", home)
        .env("RUST_BACKTRACE", "1")
        .env_remove("LRH_OUTPUT_FORMAT");
    for (key, _) in std::env::vars() {
        if key.starts_with("LRH_") {
            command.env_remove(key);
        }
    }
    command.envs(envs.iter().copied());
    let output = command.output().expect("execute lrh command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("env={envs:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
