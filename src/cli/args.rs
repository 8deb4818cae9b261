//! Command-line argument parsing

use crate::config::Config;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "docker-push")]
#[command(about = "Push a built Docker image under all of its tags and record its digest")]
#[command(version, author)]
pub struct Args {
    /// Input artifact (JSON) produced by the import or tag step
    #[arg(long = "artifact", short = 'a')]
    pub artifact: String,

    /// Configuration file (JSON)
    #[arg(long = "config", short = 'c')]
    pub config: Option<String>,

    /// Where to write the resulting artifact; printed to stdout when omitted
    #[arg(long = "output", short = 'o')]
    pub output: Option<String>,

    #[arg(long = "docker-path", help = "Docker executable to run")]
    pub docker_path: Option<String>,

    #[arg(long = "login", help = "Log in to the registry before pushing")]
    pub login: bool,

    #[arg(
        long = "login-username",
        short = 'u',
        help = "Username for registry authentication"
    )]
    pub login_username: Option<String>,

    #[arg(
        long = "login-password",
        short = 'p',
        help = "Password for registry authentication"
    )]
    pub login_password: Option<String>,

    #[arg(long = "login-server", short = 's', help = "Registry server to log in to")]
    pub login_server: Option<String>,

    #[arg(long = "ecr-login", help = "Fetch login credentials from AWS ECR")]
    pub ecr_login: bool,

    #[arg(long = "platform", help = "Platform to push, e.g. linux/amd64")]
    pub platform: Option<String>,

    #[arg(long = "aws-profile", help = "AWS profile used for ECR login")]
    pub aws_profile: Option<String>,

    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long = "quiet", short = 'q', conflicts_with = "verbose", help = "Only print errors")]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Layer command-line values over `config`; flags only ever switch options on
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(ref path) = self.docker_path {
            config.executable = path.clone();
        }
        config.login |= self.login;
        config.ecr_login |= self.ecr_login;

        if let Some(ref username) = self.login_username {
            config.login_username = username.clone();
        }
        if let Some(ref password) = self.login_password {
            config.login_password = password.clone();
        }
        if let Some(ref server) = self.login_server {
            config.login_server = server.clone();
        }
        if let Some(ref platform) = self.platform {
            config.platform = platform.clone();
        }
        if let Some(ref profile) = self.aws_profile {
            config.aws.aws_profile = profile.clone();
        }

        config
    }
}
