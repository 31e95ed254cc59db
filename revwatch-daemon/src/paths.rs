use std::path::{Path, PathBuf};

use revwatch_core::paths::revwatch_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    revwatch_root(home).join(DAEMON_SOCKET)
}
