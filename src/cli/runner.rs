//! Runner wiring the command line to the push step

use crate::artifact::{Artifact, FileArtifact, ImageState};
use crate::cli::args::Args;
use crate::config::Config;
use crate::error::Result;
use crate::logging::Logger;
use crate::post_processor::PostProcessor;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };

        Self { args, output }
    }

    pub fn logger(&self) -> &Logger {
        &self.output
    }

    pub async fn run(&self) -> Result<()> {
        self.output.section("Docker Push");

        let config = self.load_config()?;
        self.output.detail(&format!("Configuration: {:?}", config));
        if config.login && !config.ecr_login && config.login_password.is_empty() {
            self.output
                .warning("Login requested without a password; docker may prompt for one");
        }

        let input = FileArtifact::from_file(&self.args.artifact)?;
        self.output.info(&format!("Input: {}", input.description()));

        let post_processor = PostProcessor::configure(config)?;
        let result = post_processor.post_process(&self.output, &input).await?;
        let record = result.artifact.to_record();

        match self.args.output {
            Some(ref path) => {
                record.to_file(path)?;
                self.output.detail(&format!("Artifact written to {}", path));
            }
            None => println!("{}", serde_json::to_string_pretty(&record)?),
        }

        self.output.summary_kv(
            "Pushed",
            &[
                ("Image", record.id.clone()),
                ("Tags", tags_summary(&record)),
                (
                    "Elapsed",
                    self.output.format_duration(self.output.elapsed()),
                ),
            ],
        );
        self.output.success("Push completed");
        Ok(())
    }

    fn load_config(&self) -> Result<Config> {
        let config = match self.args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };
        Ok(self.args.apply_to(config).apply_env())
    }
}

fn tags_summary(record: &FileArtifact) -> String {
    let tags = ImageState::from_artifact(record).docker_tags;
    if tags.is_empty() {
        "(none)".to_string()
    } else {
        tags.join(", ")
    }
}
