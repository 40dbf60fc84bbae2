//! Login state machine with bounded retries.
//!
//! Driving a real browser through a login form fails in boring, transient
//! ways: an input not rendered yet, a button not clickable yet, a slow
//! redirect. The authenticator runs the fixed step sequence against a
//! [`LoginFlow`] and retries the whole sequence from navigation on any step
//! failure, up to the attempt ceiling. There is no partial-state carryover
//! between attempts.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::Credentials;
use crate::error::CrawlerError;

pub const MAX_LOGIN_ATTEMPTS: u32 = 3;
/// Budget for each element wait during a login step.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(20);
/// Pause between failed attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// The UI steps of one login attempt, in order. Implementations own the
/// element location and timeout handling; each method returns once the step
/// visibly took effect or fails with the step's error.
pub trait LoginFlow {
    fn navigate_to_login(&mut self) -> Result<(), CrawlerError>;
    fn enter_username(&mut self, username: &str) -> Result<(), CrawlerError>;
    fn advance(&mut self) -> Result<(), CrawlerError>;
    fn enter_password(&mut self, password: &str) -> Result<(), CrawlerError>;
    fn submit(&mut self) -> Result<(), CrawlerError>;
    /// Wait for the post-login landmark that proves the session is in.
    fn confirm_login(&mut self) -> Result<(), CrawlerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Navigating,
    UsernameEntry,
    Advancing,
    PasswordEntry,
    Submitting,
    Verifying,
    Authenticated,
}

impl LoginState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginState::Navigating => "navigating",
            LoginState::UsernameEntry => "username entry",
            LoginState::Advancing => "advancing",
            LoginState::PasswordEntry => "password entry",
            LoginState::Submitting => "submitting",
            LoginState::Verifying => "verifying",
            LoginState::Authenticated => "authenticated",
        }
    }
}

/// Attempt budget and inter-attempt pause. Injectable so tests run without
/// real sleeps or a real browser.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: MAX_LOGIN_ATTEMPTS,
            backoff: RETRY_BACKOFF,
        }
    }
}

/// How a successful login went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginReport {
    pub attempts: u32,
    pub backoffs: u32,
}

pub struct Authenticator {
    policy: RetryPolicy,
}

impl Authenticator {
    pub fn new(policy: RetryPolicy) -> Self {
        Authenticator { policy }
    }

    /// Run the login sequence until it succeeds or the attempt budget is
    /// spent. Exhaustion is fatal for the caller; there is no degraded mode.
    pub async fn login<F: LoginFlow>(
        &self,
        flow: &mut F,
        credentials: &Credentials,
    ) -> Result<LoginReport, CrawlerError> {
        let mut backoffs = 0;

        for attempt in 1..=self.policy.max_attempts {
            println!("Login attempt {}...", attempt);
            match run_attempt(flow, credentials) {
                Ok(()) => {
                    info!(attempt, "login successful");
                    println!("✅ Login successful!\n");
                    return Ok(LoginReport { attempts: attempt, backoffs });
                }
                Err(err) => {
                    warn!(attempt, error = %err, "login attempt failed");
                    eprintln!("Login attempt {} failed: {}", attempt, err);
                    if attempt == self.policy.max_attempts {
                        break;
                    }
                    println!("Retrying login after a short delay...\n");
                    tokio::time::sleep(self.policy.backoff).await;
                    backoffs += 1;
                }
            }
        }

        Err(CrawlerError::LoginExhausted {
            attempts: self.policy.max_attempts,
        })
    }
}

/// One pass through the state sequence. Any step error aborts the attempt;
/// the next attempt starts over from navigation.
fn run_attempt<F: LoginFlow>(
    flow: &mut F,
    credentials: &Credentials,
) -> Result<(), CrawlerError> {
    let mut state = LoginState::Navigating;

    loop {
        state = match state {
            LoginState::Navigating => {
                flow.navigate_to_login()?;
                LoginState::UsernameEntry
            }
            LoginState::UsernameEntry => {
                flow.enter_username(&credentials.username)?;
                println!("Username entered.");
                LoginState::Advancing
            }
            LoginState::Advancing => {
                flow.advance()?;
                println!("Clicked 'Next'.");
                LoginState::PasswordEntry
            }
            LoginState::PasswordEntry => {
                flow.enter_password(&credentials.password)?;
                println!("Password entered.");
                LoginState::Submitting
            }
            LoginState::Submitting => {
                flow.submit()?;
                println!("Clicked 'Log in'.");
                LoginState::Verifying
            }
            LoginState::Verifying => {
                flow.confirm_login()?;
                LoginState::Authenticated
            }
            LoginState::Authenticated => return Ok(()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            mail: None,
            username: "alice".into(),
            password: "hunter2".into(),
        }
    }

    fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: MAX_LOGIN_ATTEMPTS,
            backoff: Duration::ZERO,
        }
    }

    /// Fails every step sequence until `fail_attempts` attempts have been
    /// made, then succeeds. Records the steps it saw.
    struct ScriptedFlow {
        fail_attempts: u32,
        attempt: u32,
        fail_at: LoginState,
        steps: Vec<&'static str>,
    }

    impl ScriptedFlow {
        fn failing(fail_attempts: u32, fail_at: LoginState) -> Self {
            ScriptedFlow {
                fail_attempts,
                attempt: 0,
                fail_at,
                steps: Vec::new(),
            }
        }

        fn step(&mut self, state: LoginState) -> Result<(), CrawlerError> {
            self.steps.push(state.as_str());
            if self.attempt <= self.fail_attempts && state == self.fail_at {
                return Err(CrawlerError::Login {
                    state: state.as_str(),
                    detail: "simulated timeout".into(),
                });
            }
            Ok(())
        }
    }

    impl LoginFlow for ScriptedFlow {
        fn navigate_to_login(&mut self) -> Result<(), CrawlerError> {
            self.attempt += 1;
            self.step(LoginState::Navigating)
        }
        fn enter_username(&mut self, _: &str) -> Result<(), CrawlerError> {
            self.step(LoginState::UsernameEntry)
        }
        fn advance(&mut self) -> Result<(), CrawlerError> {
            self.step(LoginState::Advancing)
        }
        fn enter_password(&mut self, _: &str) -> Result<(), CrawlerError> {
            self.step(LoginState::PasswordEntry)
        }
        fn submit(&mut self) -> Result<(), CrawlerError> {
            self.step(LoginState::Submitting)
        }
        fn confirm_login(&mut self) -> Result<(), CrawlerError> {
            self.step(LoginState::Verifying)
        }
    }

    #[tokio::test]
    async fn succeeds_first_try_without_backoff() {
        let mut flow = ScriptedFlow::failing(0, LoginState::Verifying);
        let report = Authenticator::new(instant_policy())
            .login(&mut flow, &creds())
            .await
            .unwrap();
        assert_eq!(report, LoginReport { attempts: 1, backoffs: 0 });
    }

    #[tokio::test]
    async fn recovers_after_k_failures_with_k_backoffs() {
        for k in 1..MAX_LOGIN_ATTEMPTS {
            let mut flow = ScriptedFlow::failing(k, LoginState::Verifying);
            let report = Authenticator::new(instant_policy())
                .login(&mut flow, &creds())
                .await
                .unwrap();
            assert_eq!(report.attempts, k + 1, "k={k}");
            assert_eq!(report.backoffs, k, "k={k}");
        }
    }

    #[tokio::test]
    async fn exhaustion_is_fatal_and_stops_attempting() {
        let mut flow = ScriptedFlow::failing(MAX_LOGIN_ATTEMPTS, LoginState::UsernameEntry);
        let err = Authenticator::new(instant_policy())
            .login(&mut flow, &creds())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CrawlerError::LoginExhausted { attempts: MAX_LOGIN_ATTEMPTS }
        ));
        assert_eq!(flow.attempt, MAX_LOGIN_ATTEMPTS);
    }

    #[tokio::test]
    async fn each_attempt_restarts_from_navigation() {
        let mut flow = ScriptedFlow::failing(1, LoginState::PasswordEntry);
        Authenticator::new(instant_policy())
            .login(&mut flow, &creds())
            .await
            .unwrap();
        // Attempt 1 dies at password entry, attempt 2 replays the full
        // sequence from navigation.
        assert_eq!(
            flow.steps,
            vec![
                "navigating",
                "username entry",
                "advancing",
                "password entry",
                "navigating",
                "username entry",
                "advancing",
                "password entry",
                "submitting",
                "verifying",
            ]
        );
    }

    #[tokio::test]
    async fn mid_sequence_failure_counts_as_one_attempt() {
        let mut flow = ScriptedFlow::failing(2, LoginState::Submitting);
        let report = Authenticator::new(instant_policy())
            .login(&mut flow, &creds())
            .await
            .unwrap();
        assert_eq!(report.attempts, 3);
    }
}
