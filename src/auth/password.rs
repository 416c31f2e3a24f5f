use bcrypt::{DEFAULT_COST, hash, verify};
use sha2::{Digest, Sha256};
use tracing::debug;

/// bcrypt 只使用前 72 字节
pub const MAX_PASSWORD_BYTES: usize = 72;

/// 存储的哈希格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Bcrypt,
    /// 旧系统迁移过来的 SHA-256 十六进制摘要
    LegacySha256,
}

impl HashScheme {
    pub fn detect(stored: &str) -> Self {
        const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2y$", "$2x$"];
        if BCRYPT_PREFIXES.iter().any(|p| stored.starts_with(p)) {
            HashScheme::Bcrypt
        } else {
            HashScheme::LegacySha256
        }
    }
}

fn truncated(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(MAX_PASSWORD_BYTES)]
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(truncated(password), DEFAULT_COST)
}

/// 校验失败或内部错误都返回 false
pub fn verify_password(password: &str, stored: &str) -> bool {
    match HashScheme::detect(stored) {
        HashScheme::Bcrypt => match verify(truncated(password), stored) {
            Ok(matched) => matched,
            Err(e) => {
                debug!("bcrypt verification failed, trying legacy digest: {}", e);
                verify_legacy(password, stored)
            }
        },
        HashScheme::LegacySha256 => verify_legacy(password, stored),
    }
}

fn verify_legacy(password: &str, stored: &str) -> bool {
    sha256_hex(password).eq_ignore_ascii_case(stored.trim())
}

pub(crate) fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcrypt_round_trip() {
        let hashed = hash_password("Passw0rd!").unwrap();
        assert_eq!(HashScheme::detect(&hashed), HashScheme::Bcrypt);
        assert!(verify_password("Passw0rd!", &hashed));
        assert!(!verify_password("Passw0rd?", &hashed));
    }

    #[test]
    fn bytes_past_the_limit_are_ignored() {
        let base = "a".repeat(MAX_PASSWORD_BYTES);
        let hashed = hash_password(&base).unwrap();
        assert!(verify_password(&format!("{base}tail"), &hashed));

        let mut differs_inside = base.clone();
        differs_inside.replace_range(70..71, "b");
        assert!(!verify_password(&differs_inside, &hashed));
    }

    #[test]
    fn legacy_sha256_digests_still_verify() {
        // sha256("secret")
        let stored = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b";
        assert_eq!(HashScheme::detect(stored), HashScheme::LegacySha256);
        assert!(verify_password("secret", stored));
        assert!(!verify_password("Secret", stored));
    }

    #[test]
    fn malformed_bcrypt_hash_is_a_mismatch() {
        assert!(!verify_password("whatever", "$2b$not-a-real-hash"));
    }
}
