//! Git repository handler.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    CertificateCheckStatus, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, Oid,
    ProxyOptions, RemoteCallbacks, Repository,
};
use url::Url;

use super::archive::zip_directory;
use crate::http::{take_basic_auth, BasicAuth, HttpClient, HttpClientConfig};
use crate::source::{CancelToken, Source};
use crate::util::{has_ext_file, is_commit_hash, is_web_url};
use crate::zip_file::ZipFile;
use crate::{Result, ZipperError};

const DEFAULT_REF: &str = "master";

/// Namespaces tried, in order, for a symbolic reference.
const REF_TYPES: &[&str] = &["heads", "tags"];

/// How many times libgit2 may ask for credentials before we give up.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Handler for git repositories, `https://host/org/repo.git#ref`.
#[derive(Debug, Clone)]
pub struct GitHandler {
    client: Arc<HttpClient>,
}

impl GitHandler {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    pub fn name(&self) -> &'static str {
        "git"
    }

    /// Web URLs whose path ends in `.git`.
    pub fn detect(&self, src: &Source) -> bool {
        if !is_web_url(src.path()) {
            return false;
        }
        match Url::parse(src.path()) {
            Ok(url) => has_ext_file(url.path(), &[".git"]),
            Err(_) => false,
        }
    }

    /// Check the reference out into a temp dir and zip it without `.git`.
    pub fn zip(&self, src: &Source) -> Result<ZipFile> {
        let git_ref = GitRef::parse(src.path())?;
        let tmp_dir = src.scratch_dir("git-zipper")?;
        let git_ref = git_ref.with_folder(tmp_dir.path());
        let transport = Transport::new(src.http_client(&self.client).config(), git_ref.auth(), src);

        git_ref.checkout(&transport).map_err(|e| cancelled_or(src, e))?;
        fs::remove_dir_all(tmp_dir.path().join(".git"))?;

        let zip_file = zip_directory(tmp_dir.path(), src)?;
        Ok(zip_file.with_temp_dir(tmp_dir))
    }

    /// Commit id the reference points to.
    ///
    /// A reference that already is a commit id is returned as is, without
    /// touching the network.
    pub fn sha1(&self, src: &Source) -> Result<String> {
        let git_ref = GitRef::parse(src.path())?;
        if git_ref.is_commit_hash() {
            return Ok(git_ref.ref_name().to_string());
        }

        let tmp_dir = src.scratch_dir("git-zipper")?;
        let git_ref = git_ref.with_folder(tmp_dir.path());

        let transport = Transport::new(src.http_client(&self.client).config(), git_ref.auth(), src);
        git_ref.commit_sha1(&transport).map_err(|e| cancelled_or(src, e))
    }
}

fn cancelled_or(src: &Source, err: ZipperError) -> ZipperError {
    if src.is_cancelled() {
        ZipperError::Cancelled
    } else {
        err
    }
}

/// Parse a git origin, accepting scp-like `user@host:path` remotes.
fn parse_git_url(path: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(path) {
        if url.has_host() || url.scheme() == "file" {
            return Ok(url);
        }
    }

    let candidate = match path.split_once(':') {
        Some((host, rest)) if !path.contains("://") && !host.contains('/') => {
            format!("ssh://{}/{}", host, rest.trim_start_matches('/'))
        }
        _ => format!("ssh://{}", path),
    };
    Url::parse(&candidate).map_err(|e| ZipperError::invalid_url(path, e))
}

/// A repository URL and the reference to check out of it.
///
/// Fetches go into [`GitRef::folder`], set with [`GitRef::with_folder`].
#[derive(Debug, Clone)]
pub struct GitRef {
    folder: PathBuf,
    url: String,
    ref_name: String,
    auth: Option<BasicAuth>,
}

impl GitRef {
    /// Split `path` into clone URL, reference (the `#fragment`, `master`
    /// when absent) and HTTP credentials.
    pub fn parse(path: &str) -> Result<Self> {
        let mut url = parse_git_url(path)?;

        let ref_name = match url.fragment() {
            Some(fragment) if !fragment.is_empty() => fragment.to_string(),
            _ => DEFAULT_REF.to_string(),
        };
        url.set_fragment(None);

        // ssh credentials are left to the agent
        let auth = if is_web_url(path) {
            take_basic_auth(&mut url)
        } else {
            None
        };

        Ok(Self {
            folder: PathBuf::new(),
            url: url.to_string(),
            ref_name,
            auth,
        })
    }

    pub fn with_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn auth(&self) -> Option<&BasicAuth> {
        self.auth.as_ref()
    }

    pub fn is_commit_hash(&self) -> bool {
        is_commit_hash(&self.ref_name)
    }

    /// Check the reference out into the folder.
    fn checkout(&self, transport: &Transport) -> Result<()> {
        self.find_repo(false, true, transport)?;
        Ok(())
    }

    /// Commit id at the tip of the reference.
    fn commit_sha1(&self, transport: &Transport) -> Result<String> {
        if self.is_commit_hash() {
            return Ok(self.ref_name.clone());
        }

        let repo = self.find_repo(true, false, transport)?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    fn find_repo(&self, bare: bool, shallow: bool, transport: &Transport) -> Result<Repository> {
        if self.is_commit_hash() {
            return self.find_repo_from_hash(transport);
        }

        let reference = self.ref_name.to_lowercase();
        let mut last_error = None;

        for ref_type in REF_TYPES {
            let ref_name = format!("refs/{}/{}", ref_type, reference);
            log::debug!("Fetching {} from {}", ref_name, self.url);

            match self.fetch_ref(&ref_name, bare, shallow, transport) {
                Ok(repo) => return Ok(repo),
                Err(e @ ZipperError::ReferenceNotFound { .. }) => {
                    log::debug!("{} not found in {}", ref_name, self.url);
                    reset_folder(&self.folder)?;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| self.not_found()))
    }

    /// Full clone, then a forced checkout of the commit.
    fn find_repo_from_hash(&self, transport: &Transport) -> Result<Repository> {
        log::debug!("Cloning {} to check out {}", self.url, self.ref_name);

        let mut builder = RepoBuilder::new();
        builder.fetch_options(transport.fetch_options(false));
        let repo = builder.clone(&self.url, &self.folder)?;

        let oid = Oid::from_str(&self.ref_name)?;
        {
            let commit = repo.find_commit(oid)?;
            repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        }
        repo.set_head_detached(oid)?;

        Ok(repo)
    }

    /// Fetch a single remote reference and point HEAD at it.
    fn fetch_ref(
        &self,
        ref_name: &str,
        bare: bool,
        shallow: bool,
        transport: &Transport,
    ) -> Result<Repository> {
        let repo = if bare {
            Repository::init_bare(&self.folder)?
        } else {
            Repository::init(&self.folder)?
        };

        // Branches land in the remote namespace so they never clash with the unborn HEAD
        let local_ref = match ref_name.strip_prefix("refs/heads/") {
            Some(branch) => format!("refs/remotes/origin/{}", branch),
            None => ref_name.to_string(),
        };

        // libgit2 cannot negotiate a shallow fetch over the local transport
        let shallow = shallow && !self.url.starts_with("file://");

        {
            let mut remote = repo.remote("origin", &self.url)?;
            let refspec = format!("+{}:{}", ref_name, local_ref);
            let mut fetch_options = transport.fetch_options(shallow);
            match remote.fetch(&[refspec.as_str()], Some(&mut fetch_options), None) {
                Ok(()) => {}
                Err(e) if is_missing_ref(&e) => return Err(self.not_found()),
                Err(e) => return Err(e.into()),
            }
        }

        let oid = match repo.find_reference(&local_ref) {
            Ok(reference) => reference.peel_to_commit()?.id(),
            Err(e) if is_missing_ref(&e) => return Err(self.not_found()),
            Err(e) => return Err(e.into()),
        };

        if !bare {
            let commit = repo.find_commit(oid)?;
            repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        }
        repo.set_head_detached(oid)?;
        log::debug!("Resolved {} to {}", ref_name, oid);

        Ok(repo)
    }

    fn not_found(&self) -> ZipperError {
        ZipperError::ReferenceNotFound {
            url: self.url.clone(),
            reference: self.ref_name.clone(),
        }
    }
}

fn is_missing_ref(err: &git2::Error) -> bool {
    err.code() == ErrorCode::NotFound || err.class() == ErrorClass::Reference
}

/// Start over with an empty folder after a failed attempt.
fn reset_folder(folder: &Path) -> Result<()> {
    if folder.exists() {
        fs::remove_dir_all(folder)?;
    }
    fs::create_dir_all(folder)?;
    Ok(())
}

/// Network settings for one git operation.
struct Transport<'a> {
    config: &'a HttpClientConfig,
    auth: Option<BasicAuth>,
    cancel: Option<CancelToken>,
}

impl<'a> Transport<'a> {
    fn new(config: &'a HttpClientConfig, auth: Option<&BasicAuth>, src: &Source) -> Self {
        Self {
            config,
            auth: auth.cloned(),
            cancel: src.cancel_token().cloned(),
        }
    }

    fn fetch_options(&self, shallow: bool) -> FetchOptions<'a> {
        let mut callbacks = RemoteCallbacks::new();

        let auth = self.auth.clone();
        let mut attempts = 0;
        callbacks.credentials(move |_url, username_from_url, allowed_types| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }

            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(ref auth) = auth {
                    return Cred::userpass_plaintext(&auth.username, &auth.password);
                }
            }

            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
            }

            if allowed_types.contains(CredentialType::DEFAULT) {
                return Cred::default();
            }

            Err(git2::Error::from_str("no valid credentials found"))
        });

        if self.config.skip_ssl_validation {
            callbacks.certificate_check(|_cert, _host| Ok(CertificateCheckStatus::CertificateOk));
        }

        if let Some(token) = self.cancel.clone() {
            callbacks.transfer_progress(move |_progress| !token.is_cancelled());
        }

        let mut proxy = ProxyOptions::new();
        match self.config.proxy.as_deref() {
            Some(url) => proxy.url(url),
            None => proxy.auto(),
        };

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);
        fetch_options.proxy_options(proxy);
        if shallow {
            fetch_options.depth(1);
        }
        fetch_options
    }
}
