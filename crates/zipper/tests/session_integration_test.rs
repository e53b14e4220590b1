/// Integration tests for sessions
///
/// These tests drive the public `Manager` API against local directories,
/// a local HTTP server and local git repositories.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::thread;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use url::Url;
use zipper::util::sha1_from_reader;
use zipper::{ErrorKind, HttpClientConfig, Manager, Source, ZipFile, ZipperError};

fn manager() -> Manager {
    Manager::new(HttpClientConfig::new()).unwrap()
}

/// Serve `body` for every request until the test process exits.
fn serve(body: Vec<u8>, status: u16) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();

    thread::spawn(move || {
        for request in server.incoming_requests() {
            let response = tiny_http::Response::from_data(body.clone())
                .with_status_code(tiny_http::StatusCode(status));
            let _ = request.respond(response);
        }
    });

    format!("http://{}", addr)
}

fn tar_gz(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        match data {
            Some(data) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, name, *data).unwrap();
            }
            None => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder.append_data(&mut header, name, std::io::empty()).unwrap();
            }
        }
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

/// Sorted (name, content) of every file entry.
fn contents(mut zip_file: ZipFile) -> Vec<(String, String)> {
    let mut bytes = Vec::new();
    zip_file.read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes.len() as u64, zip_file.size());
    zip_file.close().unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        if file.is_dir() {
            continue;
        }
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        out.push((file.name().to_string(), content));
    }
    out.sort();
    out
}

fn entry(name: &str, content: &str) -> (String, String) {
    (name.to_string(), content.to_string())
}

#[test]
fn test_http_tar_gz_is_stripped_and_fingerprinted() {
    let body = tar_gz(&[
        ("project-1.0/", None),
        ("project-1.0/README.md", Some(b"readme")),
        ("project-1.0/src/main.rs", Some(b"fn main() {}")),
    ]);
    let base = serve(body.clone(), 200);
    let url = format!("{}/archive.tar.gz", base);

    let session = manager().create_session(&url, "").unwrap();
    assert_eq!(session.handler_name(), "http");

    assert_eq!(
        contents(session.zip().unwrap()),
        vec![entry("README.md", "readme"), entry("src/main.rs", "fn main() {}")]
    );
    assert_eq!(session.sha1().unwrap(), sha1_from_reader(Cursor::new(body)).unwrap());
}

#[test]
fn test_http_tar_without_root_folder_keeps_paths() {
    let body = tar_gz(&[
        ("README.md", Some(b"readme")),
        ("project-1.0/", None),
        ("project-1.0/main.rs", Some(b"main")),
    ]);
    let base = serve(body, 200);

    let session = manager()
        .create_session(&format!("{}/archive.tgz", base), "")
        .unwrap();
    assert_eq!(
        contents(session.zip().unwrap()),
        vec![entry("README.md", "readme"), entry("project-1.0/main.rs", "main")]
    );
}

#[test]
fn test_http_rejection() {
    let base = serve(b"gone".to_vec(), 410);

    let session = manager()
        .create_session(&format!("{}/archive.zip", base), "")
        .unwrap();
    let err = session.zip().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteRejection);
    let message = err.to_string();
    assert!(message.contains("410"), "{}", message);
    assert!(message.contains("gone"), "{}", message);
}

#[test]
fn test_nonexistent_path_is_not_detected() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope");

    let err = manager()
        .create_session(&missing.to_string_lossy(), "")
        .unwrap_err();
    assert!(matches!(err, ZipperError::NoHandlerMatched(_)));
    assert_eq!(err.kind(), ErrorKind::Detection);
}

#[test]
fn test_unknown_handler_type() {
    let err = manager().create_session("/tmp", "mercurial").unwrap_err();
    assert_eq!(err.to_string(), "Handler type 'mercurial' does not exist");
}

#[test]
fn test_local_directory_is_reproducible() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("app/lib")).unwrap();
    fs::write(temp.path().join("app/manifest.yml"), "name: app").unwrap();
    fs::write(temp.path().join("app/lib/util.rb"), "module Util; end").unwrap();

    let path = temp.path().join("app");
    let manager = manager();
    let session = manager.create_session(&path.to_string_lossy(), "").unwrap();
    assert_eq!(session.handler_name(), "local");

    let first_out = temp.path().join("first.zip");
    let second_out = temp.path().join("second.zip");
    session.write_to(&first_out).unwrap();
    session.write_to(&second_out).unwrap();
    assert_eq!(fs::read(&first_out).unwrap(), fs::read(&second_out).unwrap());

    let first_sha = session.sha1().unwrap();
    assert_eq!(first_sha, session.sha1().unwrap());

    fs::write(temp.path().join("app/lib/util.rb"), "module Util; VERSION = 2; end").unwrap();
    assert_ne!(first_sha, session.sha1().unwrap());
}

fn commit_all(repo: &git2::Repository, files: &[(&str, &str)], message: &str) -> git2::Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (name, content) in files {
        let path = workdir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        index.add_path(Path::new(name)).unwrap();
    }
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("Test", "test@example.com").unwrap();

    let parent = repo.head().ok().map(|head| head.peel_to_commit().unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

#[test]
fn test_git_tag_session() {
    let temp = TempDir::new().unwrap();
    let origin = temp.path().join("repo.git");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("master");
    let repo = git2::Repository::init_opts(&origin, &opts).unwrap();

    let tagged = commit_all(&repo, &[("app.txt", "release")], "release");
    repo.tag_lightweight("v1.2.3", &repo.find_object(tagged, None).unwrap(), false)
        .unwrap();
    commit_all(&repo, &[("app.txt", "work in progress")], "wip");

    let url = format!("{}#v1.2.3", Url::from_file_path(&origin).unwrap());
    let session = manager().create_session(&url, "git").unwrap();

    assert_eq!(session.sha1().unwrap(), tagged.to_string());
    assert_eq!(contents(session.zip().unwrap()), vec![entry("app.txt", "release")]);

    let url = format!("{}#{}", Url::from_file_path(&origin).unwrap(), tagged);
    let session = manager().create_session(&url, "git").unwrap();
    assert_eq!(session.sha1().unwrap(), tagged.to_string());
}

#[test]
fn test_git_missing_ref() {
    let temp = TempDir::new().unwrap();
    let origin = temp.path().join("repo.git");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("master");
    let repo = git2::Repository::init_opts(&origin, &opts).unwrap();
    commit_all(&repo, &[("app.txt", "release")], "release");

    let url = format!("{}#v9.9.9", Url::from_file_path(&origin).unwrap());
    let err = manager().create_session(&url, "git").unwrap().zip().unwrap_err();
    assert!(matches!(err, ZipperError::ReferenceNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::RemoteRejection);
}

#[test]
fn test_failed_sessions_leave_no_scratch_state() {
    let temp = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let origin = temp.path().join("repo.git");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("master");
    let repo = git2::Repository::init_opts(&origin, &opts).unwrap();
    commit_all(&repo, &[("app.txt", "release")], "release");

    let manager = manager();

    let url = format!("{}#v9.9.9", Url::from_file_path(&origin).unwrap());
    let source = Source::new(url).with_temp_dir(scratch.path());
    let session = manager.create_session_from_source(source, "git").unwrap();
    assert!(session.zip().is_err());
    assert!(session.sha1().is_err());

    let base = serve(b"not a tarball".to_vec(), 200);
    let source = Source::new(format!("{}/archive.tar.gz", base)).with_temp_dir(scratch.path());
    let session = manager.create_session_from_source(source, "").unwrap();
    let err = session.zip().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);

    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
#[ignore] // Requires network access
fn test_github_tarball() {
    let session = manager()
        .create_session(
            "https://github.com/octocat/Hello-World/archive/refs/heads/master.tar.gz",
            "",
        )
        .unwrap();
    let files = contents(session.zip().unwrap());
    assert!(files.iter().any(|(name, _)| name == "README"));
}
