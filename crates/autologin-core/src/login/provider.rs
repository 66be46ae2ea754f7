//! GitHub page rules: URL classification and the selectors used on each page.

pub const PROVIDER_DOMAIN: &str = "github.com";
pub const SESSION_COOKIE: &str = "user_session";
pub const LOGGED_IN_COOKIE: &str = "logged_in";

/// "Sign in with GitHub" affordances on the target's sign-in page.
pub const PROVIDER_ENTRY: &[&str] = &[
    r#"button:has-text("GitHub")"#,
    r#"a:has-text("GitHub")"#,
    r#"[data-provider="github"]"#,
];

pub const LOGIN_FIELD: &str = r#"input[name="login"]"#;
pub const PASSWORD_FIELD: &str = r#"input[name="password"]"#;
pub const SUBMIT_BUTTON: &str = r#"input[type="submit"], button[type="submit"]"#;
pub const ERROR_BANNER: &str = ".flash-error";

pub const AUTHORIZE_BUTTONS: &[&str] = &[
    r#"button[name="authorize"]"#,
    r#"button:has-text("Authorize")"#,
];

/// Links that switch the two-factor page to authenticator-code entry.
pub const CODE_MODE_SWITCHES: &[&str] = &[
    r#"a:has-text("Use an authentication app")"#,
    r#"a:has-text("Enter a code")"#,
    r#"button:has-text("Use an authentication app")"#,
    r#"[href*="two-factor/app"]"#,
];

pub const OTP_FIELDS: &[&str] = &[
    r#"input[autocomplete="one-time-code"]"#,
    r#"input[name="app_otp"]"#,
    r#"input[name="otp"]"#,
    "input#app_totp",
    "input#otp",
    r#"input[inputmode="numeric"]"#,
];

pub const VERIFY_BUTTONS: &[&str] = &[
    r#"button:has-text("Verify")"#,
    r#"button[type="submit"]"#,
    r#"input[type="submit"]"#,
];

/// Where the provider flow currently stands, judged by URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPage {
    /// OAuth consent page: the session is already valid.
    Authorize,
    /// Username/password form.
    Credentials,
    Other,
}

pub fn classify(url: &str) -> AuthPage {
    if is_authorize(url) {
        AuthPage::Authorize
    } else if url.contains("github.com/login") || url.contains("github.com/session") {
        AuthPage::Credentials
    } else {
        AuthPage::Other
    }
}

pub fn is_authorize(url: &str) -> bool {
    url.contains("github.com/login/oauth/authorize")
}

pub fn is_device_verification(url: &str) -> bool {
    url.contains("verified-device") || url.contains("device-verification")
}

pub fn is_two_factor(url: &str) -> bool {
    url.contains("two-factor")
}

pub fn is_mobile_push(url: &str) -> bool {
    url.contains("two-factor/mobile")
}

pub fn in_two_factor_flow(url: &str) -> bool {
    url.contains("github.com/sessions/two-factor/")
}

/// The password form itself, not an OAuth page under `/login/`.
pub fn is_plain_login(url: &str) -> bool {
    url.contains("github.com/login") && !url.contains("github.com/login/oauth")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_wins_over_login_prefix() {
        assert_eq!(
            classify("https://github.com/login/oauth/authorize?client_id=abc"),
            AuthPage::Authorize
        );
        assert_eq!(
            classify("https://github.com/login?return_to=%2Flogin%2Foauth"),
            AuthPage::Credentials
        );
        assert_eq!(classify("https://github.com/session"), AuthPage::Credentials);
        assert_eq!(classify("https://run.claw.cloud/"), AuthPage::Other);
    }

    #[test]
    fn two_factor_variants() {
        let push = "https://github.com/sessions/two-factor/mobile?auto=true";
        let app = "https://github.com/sessions/two-factor/app";
        assert!(is_two_factor(push) && is_mobile_push(push));
        assert!(is_two_factor(app) && !is_mobile_push(app));
        assert!(in_two_factor_flow(app));
        assert!(!in_two_factor_flow("https://github.com/login/oauth/authorize"));
    }

    #[test]
    fn plain_login_excludes_oauth_pages() {
        assert!(is_plain_login("https://github.com/login"));
        assert!(!is_plain_login("https://github.com/login/oauth/authorize?x=1"));
    }

    #[test]
    fn device_verification_urls() {
        assert!(is_device_verification("https://github.com/sessions/verified-device"));
        assert!(is_device_verification("https://github.com/login/device-verification"));
        assert!(!is_device_verification("https://github.com/sessions/two-factor/app"));
    }
}
