//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the root of the software checkout.
pub const SW_ROOT_ENV_VAR: &str = "ROBOT_TLM_SW_ROOT";

/// Get the root directory of the software, which contains the `params` and `sessions`
/// directories.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}

/// Retrieve uname information for the machine the software is running on.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_uname() {
        let info = get_uname().unwrap();

        assert!(!info.sysname.is_empty());
        assert!(!info.nodename.is_empty());
    }
}
