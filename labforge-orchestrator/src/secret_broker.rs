use rand::distributions::Alphanumeric;
use rand::Rng;

pub const SECRET_LENGTH: usize = 8;

/// Random alphanumeric word of `len` characters.
pub fn random_word(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Hands out one secret per node: generated on first demand, then reused.
///
/// A broker lives for a single node's configuration extraction and is not shared.
pub struct SecretBroker {
    generate: fn(usize) -> String,
    secret: Option<String>,
}

impl Default for SecretBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretBroker {
    pub fn new() -> Self {
        Self::with_generator(random_word)
    }

    pub fn with_generator(generate: fn(usize) -> String) -> Self {
        Self {
            generate,
            secret: None,
        }
    }

    pub fn secret(&mut self) -> &str {
        let generate = self.generate;
        self.secret
            .get_or_insert_with(|| generate(SECRET_LENGTH))
            .as_str()
    }

    pub fn into_secret(self) -> Option<String> {
        self.secret
    }
}
