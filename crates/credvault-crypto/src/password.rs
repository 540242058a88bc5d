//! Random password and username generation

use credvault_core::{Error, Result};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PASSWORD_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 1;
pub const MAX_PASSWORD_LENGTH: usize = 200;

const USERNAME_LENGTH: usize = 20;

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SPECIAL: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const HEX: &str = "0123456789ABCDEF";

pub const EXCLUDES_ALL_CHARACTERS: &str = "The combination of parameters in the request is not allowed. Please validate your input and retry your request.";
pub const INVALID_LENGTH: &str =
    "The provided length is invalid. Valid lengths are between 1 and 200 characters.";

/// Parameters controlling password generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordParameters {
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default)]
    pub exclude_lower: bool,
    #[serde(default)]
    pub exclude_upper: bool,
    #[serde(default)]
    pub exclude_number: bool,
    #[serde(default)]
    pub exclude_special: bool,
    #[serde(default)]
    pub only_hex: bool,
}

fn default_length() -> usize {
    DEFAULT_PASSWORD_LENGTH
}

impl Default for PasswordParameters {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            exclude_lower: false,
            exclude_upper: false,
            exclude_number: false,
            exclude_special: false,
            only_hex: false,
        }
    }
}

impl PasswordParameters {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&self.length) {
            return Err(Error::validation(INVALID_LENGTH));
        }
        if self.character_classes().is_empty() {
            return Err(Error::validation(EXCLUDES_ALL_CHARACTERS));
        }
        Ok(())
    }

    /// Character classes a generated password draws from
    pub fn character_classes(&self) -> Vec<&'static str> {
        if self.only_hex {
            return vec![HEX];
        }

        [
            (LOWERCASE, self.exclude_lower),
            (UPPERCASE, self.exclude_upper),
            (DIGITS, self.exclude_number),
            (SPECIAL, self.exclude_special),
        ]
        .into_iter()
        .filter(|(_, excluded)| !excluded)
        .map(|(class, _)| class)
        .collect()
    }
}

/// Generate a password honoring `params`.
///
/// One character is taken from each included class while the length allows,
/// the rest is drawn from the union of all classes, then the result is shuffled.
pub fn generate_password(params: &PasswordParameters) -> Result<String> {
    params.validate()?;

    let classes: Vec<Vec<char>> = params
        .character_classes()
        .into_iter()
        .map(|class| class.chars().collect())
        .collect();
    let pool: Vec<char> = classes.iter().flatten().copied().collect();

    let mut rng = OsRng;
    let mut chars: Vec<char> = classes
        .iter()
        .take(params.length)
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < params.length {
        chars.push(pool[rng.gen_range(0..pool.len())]);
    }
    chars.shuffle(&mut rng);

    Ok(chars.into_iter().collect())
}

/// Random alphabetic username
pub fn generate_username() -> String {
    let letters: Vec<char> = LOWERCASE.chars().chain(UPPERCASE.chars()).collect();
    let mut rng = OsRng;
    (0..USERNAME_LENGTH)
        .map(|_| letters[rng.gen_range(0..letters.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_any(password: &str, class: &str) -> bool {
        password.chars().any(|c| class.contains(c))
    }

    #[test]
    fn test_default_password() {
        let password = generate_password(&PasswordParameters::default()).unwrap();
        assert_eq!(password.chars().count(), DEFAULT_PASSWORD_LENGTH);
        assert!(contains_any(&password, LOWERCASE));
        assert!(contains_any(&password, UPPERCASE));
        assert!(contains_any(&password, DIGITS));
        assert!(contains_any(&password, SPECIAL));
    }

    #[test]
    fn test_exclusions_are_honored() {
        let params = PasswordParameters {
            length: 64,
            exclude_special: true,
            exclude_number: true,
            ..Default::default()
        };
        for _ in 0..20 {
            let password = generate_password(&params).unwrap();
            assert!(!contains_any(&password, SPECIAL));
            assert!(!contains_any(&password, DIGITS));
            assert!(contains_any(&password, LOWERCASE));
            assert!(contains_any(&password, UPPERCASE));
        }
    }

    #[test]
    fn test_only_hex() {
        let params = PasswordParameters {
            length: 40,
            only_hex: true,
            ..Default::default()
        };
        let password = generate_password(&params).unwrap();
        assert!(password.chars().all(|c| HEX.contains(c)));
    }

    #[test]
    fn test_length_bounds() {
        for length in [1, 200] {
            let params = PasswordParameters {
                length,
                ..Default::default()
            };
            assert_eq!(generate_password(&params).unwrap().chars().count(), length);
        }

        for length in [0, 201] {
            let params = PasswordParameters {
                length,
                ..Default::default()
            };
            let err = generate_password(&params).unwrap_err();
            assert_eq!(err.to_string(), INVALID_LENGTH);
        }
    }

    #[test]
    fn test_excluding_everything_is_rejected() {
        let params = PasswordParameters {
            exclude_lower: true,
            exclude_upper: true,
            exclude_number: true,
            exclude_special: true,
            ..Default::default()
        };
        let err = generate_password(&params).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), EXCLUDES_ALL_CHARACTERS);
    }

    #[test]
    fn test_parameters_reject_unknown_fields() {
        let parsed: std::result::Result<PasswordParameters, _> =
            serde_json::from_str(r#"{"length": 12, "exclude_vowels": true}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_username() {
        let username = generate_username();
        assert_eq!(username.len(), USERNAME_LENGTH);
        assert!(username.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
