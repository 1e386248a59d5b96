//! Session state shared by all commands.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::alias::Aliases;
use crate::options::Options;
use crate::path::Resolver;

pub const FRIENDLY_PROMPT: &str = ">>> ";

#[derive(Debug, Clone)]
pub struct Session {
    /// Absolute and normalized, no trailing slash except `/`.
    pub remote_cwd: String,
    pub local_cwd: PathBuf,
    /// Local folder bound at the board's mount point.
    pub mounted: Option<PathBuf>,
    pub aliases: Aliases,
    pub options: Options,
    /// Lines are magic by default while set.
    pub multi: bool,
    /// Port the board is attached to, as given on the command line.
    pub device_name: String,
    /// Board facts that do not change while connected.
    pub params: BTreeMap<String, String>,
    /// Last prompt printed by the board's REPL.
    pub device_prompt: String,
}

impl Session {
    pub fn new(local_cwd: PathBuf, device_name: impl Into<String>) -> Self {
        Self {
            remote_cwd: "/".to_string(),
            local_cwd,
            mounted: None,
            aliases: Aliases::new(),
            options: Options::default(),
            multi: false,
            device_name: device_name.into(),
            params: BTreeMap::new(),
            device_prompt: FRIENDLY_PROMPT.to_string(),
        }
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.remote_cwd, &self.local_cwd, self.mounted.as_deref())
    }

    /// The board's unique id, once device parameters are loaded.
    pub fn unique_id(&self) -> &str {
        self.params.get("unique_id").map_or("", String::as_str)
    }

    /// The device is waiting for the rest of a compound statement.
    pub fn in_continuation(&self) -> bool {
        self.device_prompt.starts_with("...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathRef;

    #[test]
    fn test_new_session() {
        let session = Session::new(PathBuf::from("/home/me"), "/dev/ttyUSB0");
        assert_eq!(session.remote_cwd, "/");
        assert!(!session.multi);
        assert_eq!(session.unique_id(), "");
        assert!(!session.in_continuation());
    }

    #[test]
    fn test_resolver_uses_both_cwds() {
        let mut session = Session::new(PathBuf::from("/home/me"), "/dev/ttyUSB0");
        session.remote_cwd = "/lib".to_string();
        let r = session.resolver();
        assert_eq!(r.resolve(":a"), PathRef::Remote("/lib/a".to_string()));
        assert_eq!(r.resolve("a"), PathRef::Local(PathBuf::from("/home/me/a")));
    }
}
