use crate::cli::Args;
use crate::config::Config;
use crate::portal::{Course, PortalClient, ProgressEvent};
use crate::render::{self, Selection};
use crate::state::AppState;
use crate::worker::{Command, LOGIN_COMMAND, Update, Worker, WorkerHandle};
use anyhow::Context;
use image::DynamicImage;
use std::io::Write;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use yansi::Paint;

const CAPTCHA_WIDTH: u32 = 72;

/// Interactive terminal session: renders worker updates and turns answers
/// typed on stdin into worker commands.
pub struct App {
    args: Args,
    worker: WorkerHandle,
    input: Lines<BufReader<Stdin>>,
    username: Option<String>,
    password: Option<String>,
    courses: Vec<Course>,
    previous: AppState,
    batches: usize,
}

/// What to do after an update has been handled.
enum Flow {
    Continue,
    Quit,
}

impl App {
    pub fn new(args: Args, config: &Config) -> anyhow::Result<Self> {
        let client = PortalClient::new(config.portal()?).context("Failed to create portal client")?;
        info!(portal = %client.config().base_url, "Portal session created");

        Ok(Self {
            username: preset(args.username.clone(), Field::Username),
            password: preset(args.password.clone(), Field::Password),
            args,
            worker: Worker::spawn(client),
            input: BufReader::new(tokio::io::stdin()).lines(),
            courses: Vec::new(),
            previous: AppState::default(),
            batches: 0,
        })
    }

    pub async fn run(mut self) -> ExitCode {
        let code = match self.drive().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{} {e:#}", "error:".red().bold());
                ExitCode::FAILURE
            }
        };
        self.worker.shutdown().await;
        code
    }

    async fn drive(&mut self) -> anyhow::Result<()> {
        self.send(Command::FetchCaptcha).await?;

        while let Some(update) = self.worker.recv().await {
            if let Flow::Quit = self.handle(update).await? {
                return Ok(());
            }
        }
        anyhow::bail!("worker stopped unexpectedly")
    }

    async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.worker.send(command).await.map_err(anyhow::Error::from)
    }

    async fn handle(&mut self, update: Update) -> anyhow::Result<Flow> {
        match update {
            Update::Captcha(image) => self.show_captcha(&image),
            Update::Courses(courses) => self.courses = courses,
            Update::Progress(progress) => {
                let counter = format!("[{}/{}]", progress.current, progress.total);
                match &progress.event {
                    ProgressEvent::Started => println!("{} {}", counter.dim(), progress),
                    ProgressEvent::Finished => println!("{} {}", counter.dim(), progress.green()),
                    ProgressEvent::Failed { .. } => println!("{} {}", counter.dim(), progress.red()),
                }
            }
            Update::Rejected { command, reason } => {
                println!("{} {command}: {reason}", "!".yellow().bold());
                // The worker refused the input itself; the captcha on screen
                // is still valid, so ask again.
                if command == LOGIN_COMMAND
                    && self.previous.is_login_screen()
                    && !self.previous.is_busy()
                {
                    self.username = None;
                    self.password = None;
                    return self.submit_login().await;
                }
            }
            Update::State { state, message } => {
                let previous = std::mem::replace(&mut self.previous, state);
                self.announce(state, &message);
                return self.on_state(state, previous).await;
            }
        }
        Ok(Flow::Continue)
    }

    fn announce(&self, state: AppState, message: &str) {
        match state {
            AppState::LoginFailed => println!("{}", message.red()),
            AppState::LoggedIn | AppState::CoursesLoaded | AppState::EvaluationComplete => {
                println!("{}", message.green())
            }
            _ if state.is_busy() => println!("{}", message.dim()),
            _ => println!("{message}"),
        }
    }

    async fn on_state(&mut self, state: AppState, previous: AppState) -> anyhow::Result<Flow> {
        match state {
            AppState::CaptchaLoaded => self.submit_login().await,
            // A failed login is followed up by the worker; only a failed
            // captcha download needs the user.
            AppState::LoginFailed if previous == AppState::FetchingCaptcha => {
                match self.ask("按回车重试，输入 q 退出: ").await? {
                    Some(answer) if answer.trim() != "q" => {
                        self.send(Command::FetchCaptcha).await?;
                        Ok(Flow::Continue)
                    }
                    _ => Ok(Flow::Quit),
                }
            }
            AppState::LoginFailed => {
                self.password = None;
                Ok(Flow::Continue)
            }
            AppState::LoggedIn if previous == AppState::FetchingCourses => {
                match self.ask("输入 r 重新获取课程，回车退出: ").await? {
                    Some(answer) if answer.trim() == "r" => {
                        self.send(Command::FetchCourses).await?;
                        Ok(Flow::Continue)
                    }
                    _ => Ok(Flow::Quit),
                }
            }
            AppState::CoursesLoaded => self.choose_courses().await,
            _ => Ok(Flow::Continue),
        }
    }

    fn show_captcha(&self, image: &DynamicImage) {
        println!("{}", render::captcha_ascii(image, CAPTCHA_WIDTH));
        if let Some(path) = &self.args.captcha_out {
            match image.save(path) {
                Ok(()) => println!("验证码已保存到 {}", path.display()),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to save captcha"),
            }
        }
    }

    async fn submit_login(&mut self) -> anyhow::Result<Flow> {
        let Some(username) = self.require("学号: ", Field::Username).await? else {
            return Ok(Flow::Quit);
        };
        let Some(password) = self.require("密码: ", Field::Password).await? else {
            return Ok(Flow::Quit);
        };
        let Some(captcha) = self.prompt_non_empty("验证码: ").await? else {
            return Ok(Flow::Quit);
        };

        self.send(Command::Login {
            username,
            password,
            captcha,
        })
        .await?;
        Ok(Flow::Continue)
    }

    async fn require(&mut self, label: &str, field: Field) -> anyhow::Result<Option<String>> {
        let slot = match field {
            Field::Username => &self.username,
            Field::Password => &self.password,
        };
        if let Some(value) = slot {
            return Ok(Some(value.clone()));
        }
        let value = match field {
            Field::Username => self.prompt_non_empty(label).await?,
            Field::Password => self.prompt_password(label).await?,
        };
        match field {
            Field::Username => self.username = value.clone(),
            Field::Password => self.password = value.clone(),
        }
        Ok(value)
    }

    async fn choose_courses(&mut self) -> anyhow::Result<Flow> {
        if self.args.all {
            // Courses still listed after a full batch failed; do not loop on them.
            if self.batches > 0 {
                return Ok(Flow::Quit);
            }
            self.batches += 1;
            let selection: Vec<usize> = (0..self.courses.len()).collect();
            self.send(Command::Evaluate { selection }).await?;
            return Ok(Flow::Continue);
        }

        print!("{}", render::course_list(&self.courses));
        loop {
            let Some(answer) = self
                .ask("选择课程编号 (空格分隔，a 全选，0 或回车退出): ")
                .await?
            else {
                return Ok(Flow::Quit);
            };
            let selection: Vec<usize> = match render::parse_selection(&answer, self.courses.len()) {
                Ok(Selection::Quit) => return Ok(Flow::Quit),
                Ok(Selection::All) => (0..self.courses.len()).collect(),
                Ok(Selection::Courses(picked)) => picked,
                Err(reason) => {
                    println!("{}", reason.yellow());
                    continue;
                }
            };
            self.batches += 1;
            self.send(Command::Evaluate { selection }).await?;
            return Ok(Flow::Continue);
        }
    }

    /// Prompt until a non-blank answer arrives. `None` on end of input.
    async fn prompt_non_empty(&mut self, label: &str) -> anyhow::Result<Option<String>> {
        loop {
            match self.ask(label).await? {
                Some(answer) if answer.trim().is_empty() => continue,
                Some(answer) => return Ok(Some(answer.trim().to_string())),
                None => return Ok(None),
            }
        }
    }

    /// Read the password from the terminal without echo. Surrounding
    /// whitespace is kept.
    async fn prompt_password(&mut self, label: &str) -> anyhow::Result<Option<String>> {
        loop {
            let prompt = label.bold().to_string();
            let answer = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
                .await
                .context("Password prompt task failed")?;
            match answer {
                Ok(answer) => {
                    if let Some(password) = preset(Some(answer), Field::Password) {
                        return Ok(Some(password));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e).context("Failed to read password"),
            }
        }
    }

    async fn ask(&mut self, label: &str) -> anyhow::Result<Option<String>> {
        print!("{}", label.bold());
        std::io::stdout().flush().context("Failed to flush stdout")?;
        self.input
            .next_line()
            .await
            .context("Failed to read from stdin")
    }
}

#[derive(Clone, Copy)]
enum Field {
    Username,
    Password,
}

/// Keep a credential only if login validation could accept it: usernames
/// must have something besides whitespace, passwords must not be empty.
fn preset(value: Option<String>, field: Field) -> Option<String> {
    value.filter(|v| match field {
        Field::Username => !v.trim().is_empty(),
        Field::Password => !v.is_empty(),
    })
}
