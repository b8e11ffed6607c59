// UI layer: the interactive prompt sequence, built on `dialoguer`. The
// flow itself lives in `session::drive`; this module only answers its
// questions, shows spinners and prints status lines.

use crate::api::{Credential, HostingApi};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::session::{drive, FileSource, Operator, Step};
use dialoguer::{Confirm, Input, Password, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Run the whole prompt sequence once. Returns on the first failure.
pub fn run_interactive<A: HostingApi>(api: &A, config: &ApiConfig) -> anyhow::Result<()> {
    println!("=== Upload a file to GitHub and get its raw link ===");

    let token: String = Password::new()
        .with_prompt("GitHub personal access token")
        .interact()
        .map_err(Error::Prompt)?;
    let credential = Credential::new(&token)?;

    // Staged README and authored files live here, never in the working directory.
    let staging = tempfile::Builder::new().prefix("gh-raw-uploader").tempdir()?;

    let mut prompts = Prompts::new()?;
    let outcome = drive(api, config, credential, staging.path(), &mut prompts);
    prompts.clear();

    println!("Raw link: {}", outcome?.raw_url);
    Ok(())
}

/// Terminal answers for [`drive`], with a spinner over each network call.
struct Prompts {
    style: ProgressStyle,
    spinner: Option<ProgressBar>,
}

impl Prompts {
    fn new() -> anyhow::Result<Self> {
        Ok(Prompts {
            style: ProgressStyle::with_template("{spinner} {msg}")?,
            spinner: None,
        })
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Operator for Prompts {
    fn reuse_existing(&mut self) -> Result<bool> {
        self.clear();
        Confirm::new()
            .with_prompt("Use an existing repository?")
            .default(false)
            .interact()
            .map_err(Error::Prompt)
    }

    fn new_repository_name(&mut self) -> Result<String> {
        self.clear();
        Input::<String>::new()
            .with_prompt("Name of the repository to create")
            .interact_text()
            .map_err(Error::Prompt)
    }

    fn pick_repository(&mut self, names: &[String]) -> Result<usize> {
        self.clear();
        let index = Select::new()
            .with_prompt(format!("Repository ({} owned)", names.len()))
            .items(names)
            .default(0)
            .interact()
            .map_err(Error::Prompt)?;
        Ok(index + 1)
    }

    fn file_source(&mut self) -> Result<FileSource> {
        self.clear();
        let items = ["Upload an existing file", "Write a new file"];
        let choice = Select::new()
            .with_prompt("What do you want to upload?")
            .items(&items)
            .default(0)
            .interact()
            .map_err(Error::Prompt)?;
        match choice {
            0 => {
                let path: String = Input::new()
                    .with_prompt("Path of the file to upload")
                    .interact_text()
                    .map_err(Error::Prompt)?;
                Ok(FileSource::Local {
                    path: PathBuf::from(path.trim()),
                })
            }
            1 => {
                let filename: String = Input::new()
                    .with_prompt("Name of the new file (e.g. code.txt)")
                    .interact_text()
                    .map_err(Error::Prompt)?;
                let content: String = Input::new()
                    .with_prompt("File content")
                    .allow_empty(true)
                    .interact_text()
                    .map_err(Error::Prompt)?;
                Ok(FileSource::Authored { filename, content })
            }
            other => Err(Error::InvalidSelection(format!("unknown menu option {}", other))),
        }
    }

    fn begin(&mut self, activity: &'static str) {
        self.clear();
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(self.style.clone());
        spinner.set_message(activity);
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn report(&mut self, step: Step<'_>) {
        self.clear();
        match step {
            Step::Authenticated { identity } => println!("Authenticated as {}", identity),
            Step::Listed { .. } => {}
            Step::CreatedRepository { name } => {
                println!("Created repository '{}' with a README", name)
            }
            Step::Uploaded {
                repository,
                destination,
            } => println!("Uploaded {} to {}", destination, repository),
        }
    }
}
