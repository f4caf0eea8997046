//! Background task that owns the portal session.
//!
//! The presentation layer never touches the [`PortalClient`] directly: it
//! sends [`Command`]s and renders the [`Update`]s that come back. Every
//! state change travels as a message, so there is no shared status to lock.

use crate::portal::auth::check_login_input;
use crate::portal::{Course, PortalClient, PortalError, Progress, ProgressEvent};
use crate::state::{AppEvent, AppState};
use image::DynamicImage;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 16;

const BUSY_MESSAGE: &str = "操作进行中，请稍候";
const EMPTY_SELECTION_MESSAGE: &str = "请至少选择一门课程进行评教";

/// `command` of an [`Update::Rejected`] answering a [`Command::Login`].
pub const LOGIN_COMMAND: &str = "login";

/// A request from the presentation layer.
pub enum Command {
    FetchCaptcha,
    Login {
        username: String,
        password: String,
        captcha: String,
    },
    FetchCourses,
    /// Evaluate the courses at these 0-based positions of the last
    /// [`Update::Courses`] list.
    Evaluate { selection: Vec<usize> },
    Logout,
    Shutdown,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::FetchCaptcha => "fetch captcha",
            Self::Login { .. } => LOGIN_COMMAND,
            Self::FetchCourses => "fetch courses",
            Self::Evaluate { .. } => "evaluate",
            Self::Logout => "logout",
            Self::Shutdown => "shutdown",
        }
    }

    /// The state event this command starts with, if it is gated by state.
    fn opening_event(&self) -> Option<AppEvent> {
        match self {
            Self::FetchCaptcha => Some(AppEvent::CaptchaRequested),
            Self::Login { .. } => Some(AppEvent::LoginSubmitted),
            Self::FetchCourses => Some(AppEvent::CoursesRequested),
            Self::Evaluate { .. } => Some(AppEvent::EvaluationStarted),
            Self::Logout | Self::Shutdown => None,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Evaluate { selection } => f
                .debug_struct("Evaluate")
                .field("selection", selection)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// A message from the worker to the presentation layer.
#[derive(Debug, Clone)]
pub enum Update {
    State { state: AppState, message: String },
    Captcha(DynamicImage),
    Courses(Vec<Course>),
    Progress(Progress),
    /// A command was refused without changing state.
    Rejected {
        command: &'static str,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("the worker has stopped")]
pub struct WorkerGone;

/// The presentation side of a running [`Worker`].
pub struct WorkerHandle {
    commands: mpsc::Sender<Command>,
    updates: mpsc::UnboundedReceiver<Update>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn send(&self, command: Command) -> Result<(), WorkerGone> {
        self.commands.send(command).await.map_err(|_| WorkerGone)
    }

    /// Next update, or `None` once the worker has stopped.
    pub async fn recv(&mut self) -> Option<Update> {
        self.updates.recv().await
    }

    /// Ask the worker to stop and wait for it. An operation already in
    /// flight runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            error!(error = ?e, "Worker task panicked");
        }
    }
}

pub struct Worker {
    client: PortalClient,
    state: AppState,
    courses: Vec<Course>,
    updates: mpsc::UnboundedSender<Update>,
}

impl Worker {
    pub fn spawn(client: PortalClient) -> WorkerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let worker = Self {
            client,
            state: AppState::default(),
            courses: Vec::new(),
            updates: update_tx,
        };
        let task = tokio::spawn(worker.run(command_rx));

        WorkerHandle {
            commands: command_tx,
            updates: update_rx,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Worker started");
        let updates = self.updates.clone();

        while let Some(command) = commands.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            debug!(?command, state = %self.state, "Handling command");

            // Keep draining the queue while the command runs so that anything
            // sent in the meantime is refused instead of piling up.
            let mut shutdown = false;
            {
                let operation = self.handle(command);
                tokio::pin!(operation);
                loop {
                    tokio::select! {
                        () = &mut operation => break,
                        Some(other) = commands.recv() => {
                            if matches!(other, Command::Shutdown) {
                                shutdown = true;
                            } else {
                                debug!(command = ?other, "Refusing command while busy");
                                let _ = updates.send(Update::Rejected {
                                    command: other.name(),
                                    reason: BUSY_MESSAGE.to_string(),
                                });
                            }
                        }
                    }
                }
            }
            if shutdown {
                break;
            }
        }

        self.client.close();
        info!("Worker stopped");
    }

    async fn handle(&mut self, command: Command) {
        if let Some(event) = command.opening_event()
            && let Err(e) = self.state.transition(event)
        {
            let reason = if self.state.is_busy() {
                BUSY_MESSAGE.to_string()
            } else {
                e.to_string()
            };
            self.publish(Update::Rejected {
                command: command.name(),
                reason,
            });
            return;
        }

        // Blank input never reaches the portal, so the captcha stays usable
        // and the state does not move.
        if let Command::Login {
            username,
            password,
            captcha,
        } = &command
            && let Err(e) = check_login_input(username, password, captcha)
        {
            self.publish(Update::Rejected {
                command: command.name(),
                reason: e.to_string(),
            });
            return;
        }

        match command {
            Command::FetchCaptcha => self.fetch_captcha(None).await,
            Command::Login {
                username,
                password,
                captcha,
            } => self.login(&username, &password, &captcha).await,
            Command::FetchCourses => self.fetch_courses().await,
            Command::Evaluate { selection } => self.evaluate(&selection).await,
            Command::Logout => self.logout().await,
            Command::Shutdown => {}
        }
    }

    fn publish(&self, update: Update) {
        if self.updates.send(update).is_err() {
            debug!("Update receiver dropped");
        }
    }

    /// Apply `event` and announce the new state.
    fn advance(&mut self, event: AppEvent, message: impl Into<String>) {
        match self.state.transition(event) {
            Ok(next) => {
                self.state = next;
                self.publish(Update::State {
                    state: next,
                    message: message.into(),
                });
            }
            Err(e) => warn!(error = %e, "Ignoring out-of-order state event"),
        }
    }

    /// Fetch a captcha. `notice` explains why a fresh one was needed.
    async fn fetch_captcha(&mut self, notice: Option<String>) {
        self.advance(AppEvent::CaptchaRequested, "正在获取验证码...");
        match self.client.fetch_captcha().await {
            Ok(image) => {
                self.publish(Update::Captcha(image));
                let message = match notice {
                    Some(notice) => format!("{notice}，请输入新的验证码"),
                    None => "请输入验证码".to_string(),
                };
                self.advance(AppEvent::CaptchaReady, message);
            }
            Err(e) => {
                warn!(error = %e, "Captcha fetch failed");
                self.advance(AppEvent::CaptchaFailed, format!("获取验证码失败: {e}"));
            }
        }
    }

    async fn login(&mut self, username: &str, password: &str, captcha: &str) {
        self.advance(AppEvent::LoginSubmitted, "正在登录...");
        let notice = match self.client.login(username, password, captcha).await {
            Ok(true) => {
                self.advance(AppEvent::LoginSucceeded, "登录成功");
                self.fetch_courses().await;
                return;
            }
            // Nothing reached the portal, so the current captcha is still valid.
            Err(PortalError::Validation(reason)) => {
                self.advance(AppEvent::LoginRejected, reason);
                return;
            }
            Ok(false) => "登录失败，请检查学号、密码和验证码".to_string(),
            Err(PortalError::Captcha) => "验证码错误".to_string(),
            Err(PortalError::Credentials) => "学号或密码错误".to_string(),
            Err(e) => format!("登录失败: {e}"),
        };
        self.advance(AppEvent::LoginRejected, notice.clone());
        self.fetch_captcha(Some(notice)).await;
    }

    async fn fetch_courses(&mut self) {
        self.advance(AppEvent::CoursesRequested, "正在获取待评教课程...");
        match self.client.fetch_pending_evaluations().await {
            Ok(courses) => {
                let count = courses.len();
                self.courses = courses.clone();
                self.publish(Update::Courses(courses));
                let message = if count == 0 {
                    "没有待评教的课程".to_string()
                } else {
                    format!("共有 {count} 门课程待评教")
                };
                self.advance(AppEvent::CoursesReady { count }, message);
            }
            Err(e) => {
                warn!(error = %e, "Course list fetch failed");
                self.courses.clear();
                self.publish(Update::Courses(Vec::new()));
                self.advance(AppEvent::CoursesFailed, format!("获取课程列表失败: {e}"));
            }
        }
    }

    async fn evaluate(&mut self, selection: &[usize]) {
        let chosen = select_courses(&self.courses, selection);
        if chosen.is_empty() {
            self.publish(Update::State {
                state: self.state,
                message: EMPTY_SELECTION_MESSAGE.to_string(),
            });
            return;
        }

        let total = chosen.len();
        self.advance(
            AppEvent::EvaluationStarted,
            format!("开始评教，共 {total} 门课程"),
        );

        let updates = self.updates.clone();
        let mut failed = 0usize;
        self.client
            .evaluate_all(&chosen, |progress: Progress| {
                if matches!(progress.event, ProgressEvent::Failed { .. }) {
                    failed += 1;
                }
                let _ = updates.send(Update::Progress(progress));
            })
            .await;

        self.advance(
            AppEvent::EvaluationFinished,
            format!("评教结束: 成功 {} 门，失败 {failed} 门", total - failed),
        );
        self.fetch_courses().await;
    }

    /// Close the session, start a fresh one and show a new captcha.
    async fn logout(&mut self) {
        let username = self.client.username().map(str::to_string);
        self.client.close();
        self.courses.clear();

        match PortalClient::new(self.client.config().clone()) {
            Ok(client) => self.client = client,
            Err(e) => {
                error!(error = %e, "Failed to create a new portal session");
                self.advance(AppEvent::LoggedOut, format!("无法创建新会话: {e}"));
                return;
            }
        }

        info!(username = username.as_deref(), "Logged out");
        self.advance(AppEvent::LoggedOut, "已退出登录");
        self.fetch_captcha(None).await;
    }
}

/// Courses at the given positions, in list order, ignoring duplicates and
/// positions past the end.
fn select_courses(courses: &[Course], selection: &[usize]) -> Vec<Course> {
    courses
        .iter()
        .enumerate()
        .filter(|(i, _)| selection.contains(i))
        .map(|(_, course)| course.clone())
        .collect()
}
