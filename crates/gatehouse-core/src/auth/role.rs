use serde::{Deserialize, Serialize};

/// Refresh endpoint used when the account role is unknown
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";

/// Privilege class of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Standard,
    Elevated,
}

/// Operator account role as issued by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    SuperAdmin,
    UsersAdmin,
    Admin,
}

impl Role {
    /// Parse a role string. Case and surrounding whitespace are ignored.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "superadmin" => Some(Role::SuperAdmin),
            "usersadmin" => Some(Role::UsersAdmin),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "superadmin",
            Role::UsersAdmin => "usersadmin",
            Role::Admin => "admin",
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            Role::SuperAdmin => Tier::Elevated,
            Role::UsersAdmin | Role::Admin => Tier::Standard,
        }
    }

    pub fn refresh_path(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "/api/superadmin/refresh",
            Role::UsersAdmin => "/api/usersadmin/refresh",
            Role::Admin => "/api/admin/refresh",
        }
    }
}

/// Refresh endpoint for an optional role, falling back to the generic route.
pub fn refresh_path(role: Option<Role>) -> &'static str {
    role.map(|r| r.refresh_path()).unwrap_or(DEFAULT_REFRESH_PATH)
}

/// Tier for an optional role. Unknown roles are treated as standard.
pub fn tier_of(role: Option<Role>) -> Tier {
    role.map(|r| r.tier()).unwrap_or_default()
}
