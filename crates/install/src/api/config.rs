use std::path::PathBuf;

/// Installer configuration
#[derive(Clone, Debug)]
pub struct InstallConfig {
    /// Bytes handed to the privileged executor per write
    pub chunk_size: usize,
    /// Device-side tool named by generated commands
    pub script_tool: String,
    /// Interpreter written into the script shebang
    pub script_shell: String,
    /// Script location when the context names none
    pub script_path: PathBuf,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self::from(&dsu_config::Config::default())
    }
}

impl From<&dsu_config::Config> for InstallConfig {
    fn from(config: &dsu_config::Config) -> Self {
        Self {
            chunk_size: config.install.chunk_size.max(1),
            script_tool: config.script.tool.clone(),
            script_shell: config.script.shell.clone(),
            script_path: config.script_path(),
        }
    }
}

impl InstallConfig {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_script_tool(mut self, tool: impl Into<String>) -> Self {
        self.script_tool = tool.into();
        self
    }

    #[must_use]
    pub fn with_script_shell(mut self, shell: impl Into<String>) -> Self {
        self.script_shell = shell.into();
        self
    }

    #[must_use]
    pub fn with_script_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_path = path.into();
        self
    }
}
