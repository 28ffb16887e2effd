//! Navigation targets the session core may force.

/// Where a failed check sends the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Unauthenticated entry point (login).
    Entry,
    /// Authenticated, but lacking the required permission.
    Forbidden,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Entry => "/",
            Route::Forbidden => "/unauthorized",
        }
    }
}

/// Routing collaborator. Implementations perform the actual navigation.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, route: Route);
}
