//! Where RelayChat keeps its files.

use std::path::PathBuf;

use crate::constants::APP_NAME;
use crate::error::{RcError, RcResult};

/// `<config_dir>/RelayChat`, e.g. `~/.config/RelayChat` on Linux.
pub fn config_dir() -> RcResult<PathBuf> {
    app_dir(dirs::config_dir(), "config")
}

/// `<data_dir>/RelayChat`, e.g. `~/.local/share/RelayChat` on Linux.
pub fn data_dir() -> RcResult<PathBuf> {
    app_dir(dirs::data_dir(), "data")
}

fn app_dir(base: Option<PathBuf>, kind: &str) -> RcResult<PathBuf> {
    base.map(|base| base.join(APP_NAME))
        .ok_or_else(|| RcError::Config(format!("could not determine {kind} directory")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_dir_appends_app_name() {
        let dir = app_dir(Some(PathBuf::from("/base")), "config").unwrap();
        assert_eq!(dir, PathBuf::from("/base").join(APP_NAME));
    }

    #[test]
    fn test_missing_base_is_config_error() {
        let err = app_dir(None, "data").unwrap_err();
        assert!(matches!(err, RcError::Config(msg) if msg.contains("data directory")));
    }
}
