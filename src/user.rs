/* User record and access level. */
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLevel {
    Member,
    FullTimeUser,
    User,
    Hiatus,
    Legacy,
}

impl UserLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserLevel::Member => "member",
            UserLevel::FullTimeUser => "fulltimeuser",
            UserLevel::User => "user",
            UserLevel::Hiatus => "hiatus",
            UserLevel::Legacy => "legacy",
        }
    }
}

impl fmt::Display for UserLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownUserLevel;

impl fmt::Display for UnknownUserLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown user level")
    }
}

impl std::error::Error for UnknownUserLevel {}

impl FromStr for UserLevel {
    type Err = UnknownUserLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(UserLevel::Member),
            "fulltimeuser" => Ok(UserLevel::FullTimeUser),
            "user" => Ok(UserLevel::User),
            "hiatus" => Ok(UserLevel::Hiatus),
            "legacy" => Ok(UserLevel::Legacy),
            _ => Err(UnknownUserLevel),
        }
    }
}

/* Minimum length of an auth code. */
pub const MIN_AUTH_CODE_LEN: usize = 6;

/* One enrolled user. `auth_code_hash` is currently the cleartext code
 * (documented weakness, see DESIGN.md). */
#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub contact_info: String,
    pub user_level: UserLevel,
    pub valid_from: Option<DateTime<Local>>,
    pub valid_to: Option<DateTime<Local>>,
    pub auth_code_hash: String,
    pub sponsor: String,
}

impl User {
    pub fn is_anonymous(&self) -> bool {
        self.contact_info.trim().is_empty()
    }
}
