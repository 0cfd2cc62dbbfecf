//! Credential-check collaborator interface.

/// Validates login attempts and maps users to their home directories.
/// Where credentials actually live (flash config, hardcoded table) is the
/// implementor's business.
pub trait Authenticator: Send + Sync + 'static {
    fn check(&self, user: &str, password: &str) -> bool;
    /// Home directory for `user`; also the root of everything that user
    /// may touch.
    fn home_dir(&self, user: &str) -> Option<String>;
}

/// The single-account device default.
#[derive(Debug, Clone)]
pub struct SingleUser {
    pub user: String,
    pub password: String,
    pub home: String,
}

impl Authenticator for SingleUser {
    fn check(&self, user: &str, password: &str) -> bool {
        user == self.user && password == self.password
    }

    fn home_dir(&self, user: &str) -> Option<String> {
        (user == self.user).then(|| self.home.clone())
    }
}
