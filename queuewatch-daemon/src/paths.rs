use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "queuewatch.sock";

pub fn queuewatch_root(home: &Path) -> PathBuf {
    home.join(".queuewatch")
}

pub fn run_dir(home: &Path) -> PathBuf {
    queuewatch_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}
