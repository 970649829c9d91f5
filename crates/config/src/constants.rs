//! Fixed locations used when the configuration leaves them unset

pub const LOGS_DIR: &str = "/var/log/dsu";

/// Where the local privileged service keeps partition images
pub const IMAGE_ROOT: &str = "/data/gsi/dsu";

pub const SCRIPT_NAME: &str = "install_dsu.sh";

/// Shell used when executing generated scripts
pub const DEFAULT_SHELL: &str = "/system/bin/sh";
