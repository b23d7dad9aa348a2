//! One-time login codes.

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, Rng};
use subtle::ConstantTimeEq;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

#[derive(Clone, Debug)]
pub struct OneTimeCode {
    pub id: i64,
    pub username: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl OneTimeCode {
    /// Valid while unused and strictly before its expiry instant.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}

/// Code about to be persisted; the store assigns the id.
#[derive(Clone, Debug)]
pub struct NewCode {
    pub username: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Six decimal digits, never starting with zero.
#[must_use]
pub fn generate_code() -> String {
    generate_code_with(&mut OsRng)
}

fn generate_code_with<R: Rng>(rng: &mut R) -> String {
    rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Constant-time comparison; slices of different length never match.
#[must_use]
pub fn codes_match(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn generated_codes_are_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let code = generate_code_with(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
        assert_eq!(generate_code().len(), 6);
    }

    #[test]
    fn validity_ends_at_expiry_instant() {
        let now = Utc::now();
        let mut code = OneTimeCode {
            id: 1,
            username: "a@x.com".to_string(),
            code: "123456".to_string(),
            expires_at: now + Duration::minutes(10),
            used: false,
            created_at: now,
        };
        assert!(code.is_valid(now + Duration::minutes(9)));
        assert!(!code.is_valid(now + Duration::minutes(10)));

        code.used = true;
        assert!(!code.is_valid(now));
    }

    #[test]
    fn codes_match_is_exact() {
        assert!(codes_match("123456", "123456"));
        assert!(!codes_match("123456", "123457"));
        assert!(!codes_match("123456", " 123456"));
        assert!(!codes_match("123456", ""));
        assert!(!codes_match("123456", "1234567"));
    }
}
