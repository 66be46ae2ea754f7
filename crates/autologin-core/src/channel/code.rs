use regex::Regex;
use std::sync::LazyLock;

static CODE_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/code\s+(\d{6,8})$").expect("Invalid regex"));

/// Second-factor code supplied by the operator.
///
/// `Debug` is redacted so the code never ends up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorCode(String);

impl OperatorCode {
    /// Parse a `/code 123456` command; surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        CODE_COMMAND
            .captures(text.trim())
            .and_then(|captures| captures.get(1))
            .map(|digits| Self(digits.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for OperatorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OperatorCode(<{} digits>)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_to_eight_digits() {
        assert_eq!(OperatorCode::parse("/code 123456").unwrap().as_str(), "123456");
        assert_eq!(OperatorCode::parse("/code 12345678").unwrap().as_str(), "12345678");
        assert_eq!(OperatorCode::parse("  /code   654321 \n").unwrap().as_str(), "654321");
    }

    #[test]
    fn rejects_everything_else() {
        for text in [
            "/code 12345",
            "/code 123456789",
            "code 123456",
            "/code 123456 extra",
            "/code abcdef",
            "/code123456",
            "",
        ] {
            assert!(OperatorCode::parse(text).is_none(), "accepted {text:?}");
        }
    }

    #[test]
    fn debug_does_not_leak_digits() {
        let code = OperatorCode::parse("/code 987654").unwrap();
        assert!(!format!("{code:?}").contains("987654"));
    }
}
