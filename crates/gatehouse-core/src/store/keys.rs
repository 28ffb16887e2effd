use crate::auth::Tier;

/// Where a key lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Lives as long as the tab/process. Login and OTP hand-off state.
    Tab,
    /// Survives restarts. The active session.
    Profile,
}

/// Every key the system persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    AccessToken(Tier),
    RefreshToken,
    Role,
    UserName,
    UserEmail,
    Permissions,
    PendingEmail,
    OtpChallenge,
}

impl StoreKey {
    /// Keys removed together on logout or terminal refresh failure.
    pub const SESSION: [StoreKey; 7] = [
        StoreKey::AccessToken(Tier::Elevated),
        StoreKey::AccessToken(Tier::Standard),
        StoreKey::RefreshToken,
        StoreKey::Role,
        StoreKey::UserName,
        StoreKey::UserEmail,
        StoreKey::Permissions,
    ];

    /// Keys carrying a half-finished login across the OTP step.
    pub const HANDOFF: [StoreKey; 2] = [StoreKey::PendingEmail, StoreKey::OtpChallenge];

    pub fn name(&self) -> &'static str {
        match self {
            StoreKey::AccessToken(Tier::Elevated) => "superadmin_token",
            StoreKey::AccessToken(Tier::Standard) => "admin_token",
            StoreKey::RefreshToken => "refresh_token",
            StoreKey::Role => "role",
            StoreKey::UserName => "user_name",
            StoreKey::UserEmail => "user_email",
            StoreKey::Permissions => "permissions",
            StoreKey::PendingEmail => "pending_email",
            StoreKey::OtpChallenge => "otp_challenge",
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            StoreKey::PendingEmail | StoreKey::OtpChallenge => Scope::Tab,
            _ => Scope::Profile,
        }
    }
}
