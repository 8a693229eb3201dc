//! User accounts and permission strings
//!
//! A permission string is a set of single letters, one per capability:
//!
//! | letter | allows |
//! |--------|--------|
//! | `e` | change directory (CWD, CDUP) |
//! | `l` | list (LIST, MLSD) |
//! | `r` | retrieve (RETR) |
//! | `a` | append |
//! | `d` | delete (DELE) |
//! | `f` | rename |
//! | `m` | make directory (MKD) |
//! | `w` | store (STOR) |
//! | `M` | change mode |
//! | `T` | change modification time |

use log::{info, warn};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::ServerConfig;

const KNOWN_PERMISSIONS: &str = "elradfmwMT";
const ANONYMOUS_NAMES: [&str; 2] = ["anonymous", "ftp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    bits: u16,
}

impl Permissions {
    /// Parse a permission string. Unknown letters are an error; repeats are
    /// harmless.
    pub fn parse(perm: &str) -> Result<Self, String> {
        let mut bits = 0u16;
        for letter in perm.chars() {
            match KNOWN_PERMISSIONS.find(letter) {
                Some(index) => bits |= 1 << index,
                None => return Err(format!("unknown permission letter '{}'", letter)),
            }
        }
        Ok(Self { bits })
    }

    pub fn allows(&self, letter: char) -> bool {
        KNOWN_PERMISSIONS
            .find(letter)
            .is_some_and(|index| self.bits & (1 << index) != 0)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for letter in KNOWN_PERMISSIONS.chars().filter(|l| self.allows(*l)) {
            write!(f, "{}", letter)?;
        }
        Ok(())
    }
}

/// A user the server can log in.
#[derive(Clone)]
pub struct UserAccount {
    pub username: String,
    password: Option<String>,
    pub home: PathBuf,
    pub perm: Permissions,
}

impl fmt::Debug for UserAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAccount")
            .field("username", &self.username)
            .field("home", &self.home)
            .field("perm", &self.perm.to_string())
            .finish()
    }
}

impl UserAccount {
    pub fn is_anonymous(&self) -> bool {
        self.password.is_none()
    }

    fn accepts(&self, password: &str) -> bool {
        match &self.password {
            Some(expected) => expected == password,
            None => true,
        }
    }
}

/// All accounts known to one server.
#[derive(Debug, Default)]
pub struct AccountStore {
    users: HashMap<String, UserAccount>,
    anonymous: Option<UserAccount>,
}

impl AccountStore {
    pub fn from_config(config: &ServerConfig) -> Result<Self, String> {
        let mut users = HashMap::new();
        for user in &config.users {
            let account = UserAccount {
                username: user.username.clone(),
                password: Some(user.password.clone()),
                home: PathBuf::from(&user.home),
                perm: Permissions::parse(&user.perm)?,
            };
            if users.insert(user.username.clone(), account).is_some() {
                warn!("Duplicate user {} in configuration; last entry wins", user.username);
            }
        }

        let anonymous = match &config.anonymous {
            Some(anon) => Some(UserAccount {
                username: "anonymous".to_string(),
                password: None,
                home: PathBuf::from(&anon.home),
                perm: Permissions::parse(&anon.perm)?,
            }),
            None => None,
        };

        info!(
            "Loaded {} user account(s), anonymous login {}",
            users.len(),
            if anonymous.is_some() { "enabled" } else { "disabled" }
        );
        Ok(Self { users, anonymous })
    }

    /// Whether `username` names an account at all, used to answer USER.
    pub fn knows(&self, username: &str) -> bool {
        self.lookup(username).is_some()
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<&UserAccount> {
        self.lookup(username).filter(|account| account.accepts(password))
    }

    fn lookup(&self, username: &str) -> Option<&UserAccount> {
        if ANONYMOUS_NAMES.contains(&username.to_ascii_lowercase().as_str()) {
            return self.anonymous.as_ref();
        }
        self.users.get(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_permissions() {
        let perm = Permissions::parse("elradfmwMT").unwrap();
        for letter in KNOWN_PERMISSIONS.chars() {
            assert!(perm.allows(letter));
        }
        assert_eq!(perm.to_string(), "elradfmwMT");
    }

    #[test]
    fn test_read_only_permissions() {
        let perm = Permissions::parse("elr").unwrap();
        assert!(perm.allows('l'));
        assert!(!perm.allows('w'));
        assert!(!perm.allows('m'));
        assert!(!perm.allows('z'));
    }

    #[test]
    fn test_unknown_letter_rejected() {
        assert!(Permissions::parse("elrx").is_err());
    }

    #[test]
    fn test_authenticate_default_accounts() {
        let store = AccountStore::from_config(&ServerConfig::default()).unwrap();
        assert!(store.authenticate("user", "12345").is_some());
        assert!(store.authenticate("user", "wrong").is_none());
        assert!(store.authenticate("nobody", "12345").is_none());

        let anon = store.authenticate("anonymous", "guest@example.com").unwrap();
        assert!(anon.is_anonymous());
        assert!(!anon.perm.allows('w'));
        assert!(store.knows("FTP"));
    }
}
