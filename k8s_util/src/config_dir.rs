use std::path::PathBuf;

/// Per-user configuration directory for a tool, e.g. `~/.config/<tool>`.
pub fn tool_config_dir(tool: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(tool))
}

pub fn tool_config_file(tool: &str, file_name: &str) -> Option<PathBuf> {
    tool_config_dir(tool).map(|dir| dir.join(file_name))
}
