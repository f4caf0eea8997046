use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Fill in every pending course evaluation on the academic-affairs portal.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Student number
    #[arg(short, long, env = "QUICKEVAL_USERNAME")]
    pub username: Option<String>,

    /// Portal password (prompted for when absent)
    #[arg(short, long, env = "QUICKEVAL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Also write each captcha image to this file
    #[arg(long, value_name = "PATH")]
    pub captcha_out: Option<PathBuf>,

    /// Evaluate every pending course without asking
    #[arg(short, long)]
    pub all: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty)]
    pub tracing: TracingFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "quickeval",
            "--username",
            "2023141460001",
            "--all",
            "--tracing",
            "json",
        ]);
        assert_eq!(args.username.as_deref(), Some("2023141460001"));
        assert!(args.all);
        assert_eq!(args.tracing, TracingFormat::Json);
        assert!(args.captcha_out.is_none());
    }
}
