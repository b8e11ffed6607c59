// Session orchestration: authenticate, pick or create a repository, upload
// one file, build its raw URL. Each step is a single blocking call and any
// failure ends the flow; nothing created remotely is rolled back.

use crate::api::{CreateRepositoryRequest, Credential, HostingApi, PutContentsRequest};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Url;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const README_PATH: &str = "README.md";

/// Which repository receives the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryChoice {
    /// Create a new public repository seeded with a README.
    Create { name: String },
    /// 1-based index into the identity's repository list.
    Existing { selection: usize },
}

/// Where the uploaded bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// An existing file; uploaded under its final path component.
    Local { path: PathBuf },
    /// Operator-typed text, staged locally under `filename` and removed
    /// after the upload.
    Authored { filename: String, content: String },
}

/// Every input the flow needs, collected up front.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub credential: Credential,
    pub repository: RepositoryChoice,
    pub file: FileSource,
}

/// A local file and the repository path it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUploadRequest {
    pub source: PathBuf,
    pub destination: String,
}

impl FileUploadRequest {
    /// Upload `path` under its own file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let source = path.into();
        let destination = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidFileName(source.display().to_string()))?;
        Ok(FileUploadRequest {
            source,
            destination,
        })
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub identity: String,
    pub repository: String,
    pub destination: String,
    pub raw_url: String,
}

/// An authenticated session. The identity is resolved once, in
/// [`Session::authenticate`], and reused for every later call.
pub struct Session<'a, A: HostingApi> {
    api: &'a A,
    credential: Credential,
    identity: String,
    raw_base: String,
    staging_dir: PathBuf,
}

impl<'a, A: HostingApi> Session<'a, A> {
    /// Validate `credential` against `GET /user`. Staged files go to
    /// `staging_dir`, which must already exist.
    pub fn authenticate(
        api: &'a A,
        credential: Credential,
        config: &ApiConfig,
        staging_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let user = api.current_user(&credential)?;
        tracing::info!(login = %user.login, "authenticated");
        Ok(Session {
            api,
            credential,
            identity: user.login,
            raw_base: config.raw_base.clone(),
            staging_dir: staging_dir.into(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Names of the identity's repositories, in provider order.
    pub fn list_repositories(&self) -> Result<Vec<String>> {
        let repos = self.api.list_repositories(&self.credential)?;
        tracing::info!(count = repos.len(), "listed repositories");
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    /// Create a public repository and seed it with a generated README.
    pub fn create_repository(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyInput("repository name"));
        }
        self.api
            .create_repository(&self.credential, &CreateRepositoryRequest::public(name))?;
        tracing::info!(repository = name, "created repository");
        self.upload_staged(name, README_PATH, readme_for(name).as_bytes())?;
        Ok(name.to_string())
    }

    /// Base64-encode the source file and write it to `destination`.
    pub fn upload_file(&self, repository: &str, req: &FileUploadRequest) -> Result<()> {
        let bytes = fs::read(&req.source).map_err(|e| Error::io(&req.source, e))?;
        let payload = PutContentsRequest {
            message: format!("Add {}", req.destination),
            content: STANDARD.encode(&bytes),
        };
        self.api.put_contents(
            &self.credential,
            &self.identity,
            repository,
            &req.destination,
            &payload,
        )?;
        tracing::info!(
            repository,
            path = %req.destination,
            bytes = bytes.len(),
            "uploaded file"
        );
        Ok(())
    }

    /// Upload `file` into `repository` and return the destination path.
    pub fn publish(&self, repository: &str, file: &FileSource) -> Result<String> {
        match file {
            FileSource::Local { path } => {
                let req = FileUploadRequest::from_path(path)?;
                self.upload_file(repository, &req)?;
                Ok(req.destination)
            }
            FileSource::Authored { filename, content } => {
                let filename = validate_file_name(filename)?;
                self.upload_staged(repository, filename, content.as_bytes())?;
                Ok(filename.to_string())
            }
        }
    }

    pub fn raw_url(&self, repository: &str, destination: &str) -> Result<String> {
        build_raw_url(&self.raw_base, &self.identity, repository, destination)
    }

    /// Write `contents` to a fresh file in the staging directory, upload it,
    /// then remove it whether or not the upload went through.
    fn upload_staged(&self, repository: &str, filename: &str, contents: &[u8]) -> Result<()> {
        let staged = self.staging_dir.join(filename);
        write_new(&staged, contents)?;
        let req = FileUploadRequest {
            source: staged.clone(),
            destination: filename.to_string(),
        };
        let result = self.upload_file(repository, &req);
        if let Err(e) = fs::remove_file(&staged) {
            tracing::warn!(path = %staged.display(), error = %e, "could not remove staged file");
        }
        result
    }
}

/// Pick the `selection`-th (1-based) name.
pub fn select_repository(names: &[String], selection: usize) -> Result<&str> {
    if names.is_empty() {
        return Err(Error::InvalidSelection("no repositories to choose from".into()));
    }
    selection
        .checked_sub(1)
        .and_then(|i| names.get(i))
        .map(String::as_str)
        .ok_or_else(|| {
            Error::InvalidSelection(format!(
                "{} is outside 1..={}",
                selection,
                names.len()
            ))
        })
}

/// `<raw_base>/<identity>/<repository>/main/<path>`, each segment
/// percent-encoded. The branch is assumed to be `main`; nothing checks it.
pub fn build_raw_url(raw_base: &str, identity: &str, repository: &str, path: &str) -> Result<String> {
    let mut url =
        Url::parse(raw_base).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw_base, e)))?;
    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(format!("{} cannot be a base", raw_base)))?
        .pop_if_empty()
        .extend([identity, repository, "main", path]);
    Ok(url.into())
}

/// A completed step, reported so the caller can show progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    Authenticated { identity: &'a str },
    Listed { count: usize },
    CreatedRepository { name: &'a str },
    Uploaded { repository: &'a str, destination: &'a str },
}

/// Supplies the operator's decisions, in the order the flow needs them.
pub trait Operator {
    /// `true` to pick from the listed repositories, `false` to create one.
    fn reuse_existing(&mut self) -> Result<bool>;

    fn new_repository_name(&mut self) -> Result<String>;

    /// 1-based pick out of `names`; never called with an empty list.
    fn pick_repository(&mut self, names: &[String]) -> Result<usize>;

    fn file_source(&mut self) -> Result<FileSource>;

    /// A blocking network call is about to start.
    fn begin(&mut self, _activity: &'static str) {}

    fn report(&mut self, _step: Step<'_>) {}
}

/// Plays back a [`SessionPlan`]'s fixed choices.
struct Planned {
    repository: RepositoryChoice,
    file: FileSource,
}

impl Operator for Planned {
    fn reuse_existing(&mut self) -> Result<bool> {
        Ok(matches!(self.repository, RepositoryChoice::Existing { .. }))
    }

    fn new_repository_name(&mut self) -> Result<String> {
        match &self.repository {
            RepositoryChoice::Create { name } => Ok(name.clone()),
            RepositoryChoice::Existing { .. } => Err(Error::EmptyInput("repository name")),
        }
    }

    fn pick_repository(&mut self, _names: &[String]) -> Result<usize> {
        match self.repository {
            RepositoryChoice::Existing { selection } => Ok(selection),
            RepositoryChoice::Create { .. } => {
                Err(Error::InvalidSelection("no repository selected".into()))
            }
        }
    }

    fn file_source(&mut self) -> Result<FileSource> {
        Ok(self.file.clone())
    }
}

/// Run the whole flow, asking `operator` for each decision as it comes up.
pub fn drive<A: HostingApi, O: Operator>(
    api: &A,
    config: &ApiConfig,
    credential: Credential,
    staging_dir: &Path,
    operator: &mut O,
) -> Result<Outcome> {
    operator.begin("Verifying token...");
    let session = Session::authenticate(api, credential, config, staging_dir)?;
    operator.report(Step::Authenticated {
        identity: session.identity(),
    });

    let repository = if operator.reuse_existing()? {
        operator.begin("Fetching repositories...");
        let names = session.list_repositories()?;
        operator.report(Step::Listed { count: names.len() });
        if names.is_empty() {
            return Err(Error::InvalidSelection(format!(
                "{} has no repositories to choose from",
                session.identity()
            )));
        }
        let selection = operator.pick_repository(&names)?;
        select_repository(&names, selection)?.to_string()
    } else {
        let name = operator.new_repository_name()?;
        operator.begin("Creating repository...");
        let name = session.create_repository(&name)?;
        operator.report(Step::CreatedRepository { name: &name });
        name
    };

    let file = operator.file_source()?;
    operator.begin("Uploading...");
    let destination = session.publish(&repository, &file)?;
    let raw_url = session.raw_url(&repository, &destination)?;
    operator.report(Step::Uploaded {
        repository: &repository,
        destination: &destination,
    });

    Ok(Outcome {
        identity: session.identity().to_string(),
        repository,
        destination,
        raw_url,
    })
}

/// Run the whole flow from a fully specified plan.
pub fn run<A: HostingApi>(
    api: &A,
    config: &ApiConfig,
    plan: SessionPlan,
    staging_dir: &Path,
) -> Result<Outcome> {
    let mut planned = Planned {
        repository: plan.repository,
        file: plan.file,
    };
    drive(api, config, plan.credential, staging_dir, &mut planned)
}

fn readme_for(repository: &str) -> String {
    format!("# {}\nRepository created automatically.", repository)
}

fn validate_file_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::EmptyInput("file name"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::InvalidFileName(name.to_string()));
    }
    Ok(name)
}

fn write_new(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    file.write_all(contents).map_err(|e| Error::io(path, e))
}
