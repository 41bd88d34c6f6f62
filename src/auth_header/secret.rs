//! Secret resolution.
//!
//! The shared secret is looked up by name exactly once while the signer is
//! built. Production reads the process environment; tests hand in a map.

use std::collections::HashMap;

/// Resolves a named secret.
pub trait SecretSource {
    /// Returns the value bound to `name`, if any.
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads secrets from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl SecretSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<T: SecretSource + ?Sized> SecretSource for &T {
    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}
