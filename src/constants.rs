/// Package name.
pub(crate) const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Default configuration file name.
pub(crate) const CONFIG_NAME: &str = "config.toml";
/// Directory under the destination that receives per-run log files.
pub(crate) const LOG_DIR_NAME: &str = "logs";
