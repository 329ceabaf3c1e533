use std::collections::HashMap;

/// Resolves a swimmer name to the account email their results are filed under
pub trait SwimmerDirectory {
    fn email_for(&self, name: &str) -> Option<String>;
}

/// Lists the swimmers a coach can put into a heat
pub trait RosterProvider {
    fn roster(&self) -> Vec<String>;
}

/// Directory kept in memory, mostly for tests and one-off runs
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    emails: HashMap<String, String>,
    order: Vec<String>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_swimmer(mut self, name: &str, email: &str) -> Self {
        self.insert(name, email);
        self
    }

    pub fn insert(&mut self, name: &str, email: &str) {
        if self
            .emails
            .insert(name.to_string(), email.to_string())
            .is_none()
        {
            self.order.push(name.to_string());
        }
    }
}

impl SwimmerDirectory for MemoryDirectory {
    fn email_for(&self, name: &str) -> Option<String> {
        self.emails.get(name).cloned()
    }
}

impl RosterProvider for MemoryDirectory {
    fn roster(&self) -> Vec<String> {
        self.order.clone()
    }
}

/// A directory that knows nobody
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirectory;

impl SwimmerDirectory for NoDirectory {
    fn email_for(&self, _name: &str) -> Option<String> {
        None
    }
}
