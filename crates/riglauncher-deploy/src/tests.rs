use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Command;
use std::thread;

use riglauncher_core::{LauncherError, ProgressSink, SilentProgress};

use super::download::fetch_release_feed_at;
use super::install::{install_with_runner, is_benign_stderr_line};
use super::*;

fn test_dir(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("riglauncher-deploy-test-{label}-{nanos}"));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

#[derive(Default)]
struct RecordingSink {
    statuses: Vec<String>,
    progress: Vec<(u64, u64)>,
}

impl ProgressSink for RecordingSink {
    fn status(&mut self, message: &str) {
        self.statuses.push(message.to_string());
    }

    fn download_progress(&mut self, bytes_so_far: u64, total_size: u64) {
        self.progress.push((bytes_so_far, total_size));
    }
}

/// Serves exactly one connection with a canned HTTP response, then closes.
fn serve_once(response: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind");
    let addr = listener.local_addr().expect("must have an address");
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let _ = stream.write_all(&response);
        }
    });
    format!("http://{addr}/archive.tar.gz")
}

#[test]
fn archive_kind_by_suffix() {
    assert_eq!(ArchiveKind::infer("v1.0.0.tar.gz"), ArchiveKind::TarGz);
    assert_eq!(ArchiveKind::infer("release.TGZ"), ArchiveKind::TarGz);
    assert_eq!(ArchiveKind::infer("release.tar"), ArchiveKind::Tar);
    assert_eq!(ArchiveKind::infer("release.zip"), ArchiveKind::Zip);
    assert_eq!(ArchiveKind::infer("no-extension"), ArchiveKind::Zip);
}

#[test]
fn manifest_in_root_beats_nested_copies() {
    let root = test_dir("manifest-root");
    fs::create_dir_all(root.join("nested")).expect("must create");
    fs::write(root.join("requirements.txt"), "top").expect("must write");
    fs::write(root.join("nested/requirements.txt"), "nested").expect("must write");

    let found = locate_manifest(&root, "requirements.txt").expect("must find");
    assert_eq!(found, root.join("requirements.txt"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn manifest_found_in_subdirectory() {
    let root = test_dir("manifest-nested");
    fs::create_dir_all(root.join("pkg/deep")).expect("must create");
    fs::write(root.join("pkg/deep/requirements.txt"), "deep").expect("must write");
    fs::write(root.join("unrelated.txt"), "noise").expect("must write");

    let found = locate_manifest(&root, "requirements.txt").expect("must find");
    assert_eq!(found, root.join("pkg/deep/requirements.txt"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn missing_manifest_is_typed() {
    let root = test_dir("manifest-missing");
    let err = locate_manifest(&root, "requirements.txt").expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<LauncherError>(),
        Some(LauncherError::ManifestNotFound(_))
    ));
    let _ = fs::remove_dir_all(root);
}

#[test]
fn benign_stderr_lines() {
    assert!(is_benign_stderr_line(""));
    assert!(is_benign_stderr_line("   "));
    assert!(is_benign_stderr_line("DEPRECATION: python 2.7 reached EOL"));
    assert!(is_benign_stderr_line("WARNING: you are using an old version"));
    assert!(is_benign_stderr_line(
        "You should consider upgrading via the pip install --upgrade pip command"
    ));
    assert!(!is_benign_stderr_line("ERROR: no matching distribution"));
    assert!(!is_benign_stderr_line("Traceback (most recent call last):"));
}

#[test]
fn install_runs_twice_and_judges_the_second_pass() {
    let mut invocations: Vec<String> = Vec::new();
    install_with_runner(
        &PathBuf::from("/env/bin/pip"),
        &PathBuf::from("/tmp/requirements.txt"),
        &mut SilentProgress,
        |command| {
            invocations.push(format!("{command:?}"));
            // First pass flakes loudly; only the second pass counts.
            let script = if invocations.len() == 1 {
                "echo 'ERROR: transient resolver failure' >&2; exit 1"
            } else {
                "echo 'WARNING: harmless' >&2; exit 0"
            };
            Command::new("sh")
                .args(["-c", script])
                .output()
                .map_err(anyhow::Error::from)
        },
    )
    .expect("second pass decides");

    assert_eq!(invocations.len(), 2);
    for invocation in &invocations {
        for fragment in ["install", "--upgrade", "--no-cache", "-r", "requirements.txt"] {
            assert!(invocation.contains(fragment), "missing {fragment} in {invocation}");
        }
    }
}

#[test]
fn install_failure_carries_stderr_residue() {
    let err = install_with_runner(
        &PathBuf::from("/env/bin/pip"),
        &PathBuf::from("/tmp/requirements.txt"),
        &mut SilentProgress,
        |_| {
            Command::new("sh")
                .args([
                    "-c",
                    "echo 'WARNING: fine'; echo 'ERROR: no matching distribution' >&2; exit 0",
                ])
                .output()
                .map_err(anyhow::Error::from)
        },
    )
    .expect_err("residue must fail the install");

    match err.downcast_ref::<LauncherError>() {
        Some(LauncherError::InstallFailed(reason)) => {
            assert!(reason.contains("no matching distribution"));
            assert!(!reason.contains("WARNING"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn staging_succeeds_on_the_final_attempt() {
    let scratch = test_dir("retry-final");
    fs::write(scratch.join("requirements.txt"), "tool==1.0").expect("must write");
    let installer = DeploymentInstaller::new().expect("client");

    let mut attempts = 0;
    let payload = installer
        .stage_with_fetcher(
            "https://example.invalid/archive/v1.tar.gz",
            &scratch,
            &scratch.join("v1.tar.gz"),
            |_, _| {
                attempts += 1;
                if attempts < 10 {
                    Err(anyhow::anyhow!("connection reset"))
                } else {
                    Ok(())
                }
            },
        )
        .expect("tenth attempt lands");
    assert_eq!(attempts, 10);
    assert_eq!(payload.manifest_path, scratch.join("requirements.txt"));

    let _ = fs::remove_dir_all(scratch);
}

#[test]
fn staging_gives_up_after_the_ceiling() {
    let scratch = test_dir("retry-exhausted");
    fs::write(scratch.join("requirements.txt"), "tool==1.0").expect("must write");
    let installer = DeploymentInstaller::new().expect("client");

    let mut attempts = 0;
    let err = installer
        .stage_with_fetcher(
            "https://example.invalid/archive/v1.tar.gz",
            &scratch,
            &scratch.join("v1.tar.gz"),
            |_, _| {
                attempts += 1;
                Err(anyhow::anyhow!("connection reset"))
            },
        )
        .expect_err("must give up");

    assert_eq!(attempts, 10);
    match err.downcast_ref::<LauncherError>() {
        Some(LauncherError::DownloadFailed { attempts, reason }) => {
            assert_eq!(*attempts, 10);
            assert!(reason.contains("connection reset"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let _ = fs::remove_dir_all(scratch);
}

#[test]
fn retry_ceiling_is_configurable() {
    let scratch = test_dir("retry-configured");
    let installer = DeploymentInstaller::new().expect("client").with_retry_ceiling(3);

    let mut attempts = 0;
    let err = installer
        .stage_with_fetcher(
            "https://example.invalid/archive/v1.tar.gz",
            &scratch,
            &scratch.join("v1.tar.gz"),
            |_, _| {
                attempts += 1;
                Err(anyhow::anyhow!("timed out"))
            },
        )
        .expect_err("must give up");
    assert_eq!(attempts, 3);
    assert!(matches!(
        err.downcast_ref::<LauncherError>(),
        Some(LauncherError::DownloadFailed { attempts: 3, .. })
    ));

    let _ = fs::remove_dir_all(scratch);
}

#[test]
fn missing_manifest_is_not_retried() {
    let scratch = test_dir("retry-no-manifest");
    let installer = DeploymentInstaller::new().expect("client");

    let mut attempts = 0;
    let err = installer
        .stage_with_fetcher(
            "https://example.invalid/archive/v1.tar.gz",
            &scratch,
            &scratch.join("v1.tar.gz"),
            |_, _| {
                attempts += 1;
                Ok(())
            },
        )
        .expect_err("must fail on discovery");

    assert_eq!(attempts, 1);
    assert!(matches!(
        err.downcast_ref::<LauncherError>(),
        Some(LauncherError::ManifestNotFound(_))
    ));

    let _ = fs::remove_dir_all(scratch);
}

#[test]
fn download_streams_with_progress() {
    let body = vec![0x5au8; 20_000];
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(&body);
    let url = serve_once(response);

    let dir = test_dir("download-ok");
    let destination = dir.join("archive.tar.gz");
    let client = http_client().expect("client");
    let mut sink = RecordingSink::default();

    let written = download_archive(&client, &url, &destination, &mut sink).expect("must download");
    assert_eq!(written, 20_000);
    assert_eq!(fs::read(&destination).expect("must read").len(), 20_000);

    let (final_bytes, total) = *sink.progress.last().expect("progress reported");
    assert_eq!(final_bytes, 20_000);
    assert_eq!(total, 20_000);
    // Monotonic per-chunk reporting against the fixed total.
    assert!(sink.progress.windows(2).all(|pair| pair[0].0 < pair[1].0));
    assert!(sink.progress.iter().all(|(_, t)| *t == 20_000));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn download_without_content_length_is_rejected() {
    let response =
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n0\r\n\r\n"
            .to_vec();
    let url = serve_once(response);

    let dir = test_dir("download-no-length");
    let client = http_client().expect("client");
    let err = download_archive(&client, &url, &dir.join("archive.tar.gz"), &mut SilentProgress)
        .expect_err("must reject");
    assert!(err.to_string().contains("content length"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn download_propagates_http_errors() {
    let response = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        .to_vec();
    let url = serve_once(response);

    let dir = test_dir("download-404");
    let client = http_client().expect("client");
    let err = download_archive(&client, &url, &dir.join("archive.tar.gz"), &mut SilentProgress)
        .expect_err("must reject");
    assert!(err.to_string().contains("404"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn feed_fetch_parses_the_served_body() {
    let body = r#"[
        {"name": "v1.2.0", "prerelease": false},
        {"name": "v1.1.0", "prerelease": false}
    ]"#;
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body.as_bytes());
    let url = serve_once(response);

    let client = http_client().expect("client");
    let catalog = fetch_release_feed_at(&client, &url).expect("must fetch");
    assert_eq!(catalog.labels(), vec!["1.2.0", "1.1.0"]);
}

#[test]
fn feed_http_error_is_typed_unreachable() {
    let response =
        b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_vec();
    let url = serve_once(response);

    let client = http_client().expect("client");
    let err = fetch_release_feed_at(&client, &url).expect_err("must fail");
    match err.downcast_ref::<LauncherError>() {
        Some(LauncherError::FeedUnreachable(reason)) => assert!(reason.contains("503")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn feed_connection_failure_is_typed_unreachable() {
    // Bind then drop the listener so the port refuses connections.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("must bind");
        listener.local_addr().expect("must have an address").port()
    };
    let url = format!("http://127.0.0.1:{port}/releases");

    let client = http_client().expect("client");
    let err = fetch_release_feed_at(&client, &url).expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<LauncherError>(),
        Some(LauncherError::FeedUnreachable(_))
    ));
}

#[test]
fn install_only_requires_an_existing_manifest() {
    let dir = test_dir("install-only");
    let installer = DeploymentInstaller::new().expect("client");
    let env = riglauncher_runtime::RuntimeEnvironment::new(
        riglauncher_runtime::HostPlatform::Linux,
        "toolset",
    );
    let handle = env.resolve_paths(&dir.join("toolset"));

    let err = installer
        .install_only(&dir.join("requirements.txt"), &handle, &mut SilentProgress)
        .expect_err("must fail without the file");
    assert!(matches!(
        err.downcast_ref::<LauncherError>(),
        Some(LauncherError::ManifestNotFound(_))
    ));

    let _ = fs::remove_dir_all(dir);
}
