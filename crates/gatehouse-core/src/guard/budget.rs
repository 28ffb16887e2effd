/// Bound on unauthenticated redirects within one guard mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectBudget {
    used: u32,
    limit: u32,
}

impl RedirectBudget {
    pub fn new(limit: u32) -> Self {
        Self { used: 0, limit }
    }

    /// Record a failed verification. Returns true if a redirect is still
    /// allowed for it.
    pub fn spend(&mut self) -> bool {
        self.used = self.used.saturating_add(1);
        self.used <= self.limit
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}
