//! Gravatar URL derivation, matching what the settings page renders

use sha2::{Digest, Sha256};

fn email_hash(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Avatar URL for an email, `size` pixels with `default_image` fallback.
pub fn gravatar_url(email: &str, size: u32, default_image: &str) -> String {
    format!(
        "https://www.gravatar.com/avatar/{}?s={}&d={}",
        email_hash(email),
        size,
        default_image
    )
}

/// The app's standard avatar lookup: 80px identicon.
pub fn default_gravatar_url(email: &str) -> String {
    gravatar_url(email, 80, "identicon")
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-256 of the empty string
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hashes_the_normalized_email() {
        assert_eq!(
            gravatar_url(" Tester-0@Gmail.com ", 80, "identicon"),
            gravatar_url("tester-0@gmail.com", 80, "identicon")
        );
    }

    #[test]
    fn url_carries_size_and_default() {
        let url = gravatar_url("", 128, "404");
        assert_eq!(
            url,
            format!("https://www.gravatar.com/avatar/{EMPTY_SHA256}?s=128&d=404")
        );
    }

    #[test]
    fn default_lookup_is_an_identicon() {
        let url = default_gravatar_url("tester-0@gmail.com");
        assert!(url.ends_with("?s=80&d=identicon"));
    }
}
