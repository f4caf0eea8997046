//! Presentation state machine.
//!
//! The worker drives a single [`AppState`] through [`AppEvent`]s and
//! publishes every change; the presentation layer only renders what it is
//! told and checks [`AppState::is_busy`] before accepting user input.

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppState {
    #[default]
    Login,
    FetchingCaptcha,
    CaptchaLoaded,
    LoggingIn,
    LoginFailed,
    LoggedIn,
    FetchingCourses,
    CoursesLoaded,
    Evaluating,
    EvaluationComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    CaptchaRequested,
    CaptchaReady,
    CaptchaFailed,
    LoginSubmitted,
    LoginSucceeded,
    LoginRejected,
    CoursesRequested,
    CoursesReady { count: usize },
    CoursesFailed,
    EvaluationStarted,
    EvaluationFinished,
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{event:?} is not allowed while {state}")]
pub struct InvalidTransition {
    pub state: AppState,
    pub event: AppEvent,
}

impl AppState {
    /// A request is in flight; user actions must wait.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Self::FetchingCaptcha | Self::LoggingIn | Self::FetchingCourses | Self::Evaluating
        )
    }

    /// States shown on the login screen, as opposed to the course screen.
    pub fn is_login_screen(self) -> bool {
        matches!(
            self,
            Self::Login
                | Self::FetchingCaptcha
                | Self::CaptchaLoaded
                | Self::LoggingIn
                | Self::LoginFailed
        )
    }

    pub fn transition(self, event: AppEvent) -> Result<AppState, InvalidTransition> {
        use AppEvent as E;
        use AppState as S;

        let next = match (self, event) {
            (_, E::LoggedOut) => S::Login,

            (S::Login | S::CaptchaLoaded | S::LoginFailed, E::CaptchaRequested) => {
                S::FetchingCaptcha
            }
            (S::FetchingCaptcha, E::CaptchaReady) => S::CaptchaLoaded,
            (S::FetchingCaptcha, E::CaptchaFailed) => S::LoginFailed,

            (S::Login | S::CaptchaLoaded | S::LoginFailed, E::LoginSubmitted) => S::LoggingIn,
            (S::LoggingIn, E::LoginSucceeded) => S::LoggedIn,
            (S::LoggingIn, E::LoginRejected) => S::LoginFailed,

            (S::LoggedIn | S::CoursesLoaded | S::EvaluationComplete, E::CoursesRequested) => {
                S::FetchingCourses
            }
            (S::FetchingCourses, E::CoursesReady { count: 0 } | E::CoursesFailed) => S::LoggedIn,
            (S::FetchingCourses, E::CoursesReady { .. }) => S::CoursesLoaded,

            (S::CoursesLoaded, E::EvaluationStarted) => S::Evaluating,
            (S::Evaluating, E::EvaluationFinished) => S::EvaluationComplete,

            (state, event) => return Err(InvalidTransition { state, event }),
        };
        Ok(next)
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Login => "login",
            Self::FetchingCaptcha => "fetching captcha",
            Self::CaptchaLoaded => "captcha loaded",
            Self::LoggingIn => "logging in",
            Self::LoginFailed => "login failed",
            Self::LoggedIn => "logged in",
            Self::FetchingCourses => "fetching courses",
            Self::CoursesLoaded => "courses loaded",
            Self::Evaluating => "evaluating",
            Self::EvaluationComplete => "evaluation complete",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[AppEvent]) -> Result<AppState, InvalidTransition> {
        events
            .iter()
            .try_fold(AppState::default(), |state, &event| state.transition(event))
    }

    #[test]
    fn test_full_session() {
        let end = run(&[
            AppEvent::CaptchaRequested,
            AppEvent::CaptchaReady,
            AppEvent::LoginSubmitted,
            AppEvent::LoginSucceeded,
            AppEvent::CoursesRequested,
            AppEvent::CoursesReady { count: 3 },
            AppEvent::EvaluationStarted,
            AppEvent::EvaluationFinished,
            AppEvent::CoursesRequested,
            AppEvent::CoursesReady { count: 0 },
        ]);
        assert_eq!(end, Ok(AppState::LoggedIn));
    }

    #[test]
    fn test_login_rejection_allows_retry() {
        let state = run(&[
            AppEvent::CaptchaRequested,
            AppEvent::CaptchaReady,
            AppEvent::LoginSubmitted,
            AppEvent::LoginRejected,
        ])
        .unwrap();
        assert_eq!(state, AppState::LoginFailed);
        assert_eq!(
            state.transition(AppEvent::CaptchaRequested),
            Ok(AppState::FetchingCaptcha)
        );
        assert_eq!(
            state.transition(AppEvent::LoginSubmitted),
            Ok(AppState::LoggingIn)
        );
    }

    #[test]
    fn test_captcha_failure() {
        assert_eq!(
            run(&[AppEvent::CaptchaRequested, AppEvent::CaptchaFailed]),
            Ok(AppState::LoginFailed)
        );
    }

    #[test]
    fn test_course_fetch_failure_returns_to_logged_in() {
        let state = AppState::FetchingCourses;
        assert_eq!(state.transition(AppEvent::CoursesFailed), Ok(AppState::LoggedIn));
    }

    #[test]
    fn test_busy_states_reject_new_work() {
        for state in [
            AppState::FetchingCaptcha,
            AppState::LoggingIn,
            AppState::FetchingCourses,
            AppState::Evaluating,
        ] {
            assert!(state.is_busy());
            assert!(state.transition(AppEvent::LoginSubmitted).is_err());
            assert!(state.transition(AppEvent::CoursesRequested).is_err());
        }
        assert!(!AppState::CoursesLoaded.is_busy());
    }

    #[test]
    fn test_evaluation_needs_loaded_courses() {
        let err = AppState::LoggedIn
            .transition(AppEvent::EvaluationStarted)
            .unwrap_err();
        assert_eq!(err.state, AppState::LoggedIn);
        assert_eq!(err.to_string(), "EvaluationStarted is not allowed while logged in");
    }

    #[test]
    fn test_logout_from_anywhere() {
        for state in [AppState::Evaluating, AppState::CaptchaLoaded, AppState::LoggedIn] {
            assert_eq!(state.transition(AppEvent::LoggedOut), Ok(AppState::Login));
        }
    }

    #[test]
    fn test_screens() {
        assert!(AppState::LoginFailed.is_login_screen());
        assert!(!AppState::EvaluationComplete.is_login_screen());
    }
}
