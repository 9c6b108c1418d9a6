//! Image builders: turn a build context into a published image reference.
//!
//! [`ContextBuilder`] only fingerprints the context: the digest is a SHA-256
//! over every file (sorted by relative path) and the exposed ports come from
//! the Dockerfile's `EXPOSE` lines. [`DockerBuilder`] additionally runs
//! `docker build` and `docker push`.
//!
//! Images without a build context are treated as already published.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use deck_core::ImageSpec;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{ClusterError, ClusterResult};

static EXPOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*EXPOSE\s+(.+)$").expect("valid EXPOSE pattern"));

/// Build-and-publish facility.
pub trait ImageBuilder: Send + Sync {
    /// Build and publish `image`, returning it with `digest` and
    /// `exposed_ports` filled in.
    fn build_and_publish(&self, image: &ImageSpec) -> ClusterResult<ImageSpec>;
}

fn build_err(image: &ImageSpec, reason: impl ToString) -> ClusterError {
    ClusterError::Build {
        image: image.name.clone(),
        reason: reason.to_string(),
    }
}

// ── Context fingerprinting ─────────────────────────────────────────

/// Fingerprints build contexts relative to `root` (the plan directory).
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    root: PathBuf,
}

impl ContextBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn context_dir(&self, context: &Path) -> PathBuf {
        self.root.join(context)
    }
}

impl ImageBuilder for ContextBuilder {
    fn build_and_publish(&self, image: &ImageSpec) -> ClusterResult<ImageSpec> {
        let Some(context) = &image.context else {
            debug!(image = %image.name, "no build context, using published image");
            return Ok(image.clone());
        };
        let dir = self.context_dir(context);
        if !dir.is_dir() {
            return Err(build_err(
                image,
                format!("build context {} is not a directory", dir.display()),
            ));
        }

        let dockerfile = dir.join(&image.dockerfile);
        let text = std::fs::read_to_string(&dockerfile)
            .map_err(|e| build_err(image, format!("{}: {e}", dockerfile.display())))?;

        let mut built = image.clone();
        built.digest = Some(context_digest(&dir).map_err(|e| build_err(image, e))?);
        built.exposed_ports = exposed_ports(&text);
        info!(
            image = %image.name,
            reference = %image.reference(),
            digest = built.digest.as_deref().unwrap_or("-"),
            "image fingerprinted"
        );
        Ok(built)
    }
}

/// `sha256:<hex>` over the relative path and contents of every file under
/// `dir`, in path order. `.git` is skipped.
pub fn context_digest(dir: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let contents = std::fs::read(entry.path())?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(&contents);
        hasher.update([0u8]);
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// Ports named by `EXPOSE` lines, in order, without protocol suffixes.
pub fn exposed_ports(dockerfile: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for caps in EXPOSE.captures_iter(dockerfile) {
        for token in caps[1].split_whitespace() {
            let port = token.split('/').next().unwrap_or(token);
            if let Ok(port) = port.parse::<u16>() {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
    }
    ports
}

// ── Docker ─────────────────────────────────────────────────────────

/// Builds with the docker CLI and pushes to the image's registry.
#[derive(Debug, Clone)]
pub struct DockerBuilder {
    context: ContextBuilder,
    docker: PathBuf,
}

impl DockerBuilder {
    /// Uses `$DECK_DOCKER` if set, otherwise `docker` on `$PATH`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_binary(root, docker_binary(std::env::var_os("DECK_DOCKER")))
    }

    pub fn with_binary(root: impl Into<PathBuf>, docker: impl Into<PathBuf>) -> Self {
        Self {
            context: ContextBuilder::new(root),
            docker: docker.into(),
        }
    }

    fn run(&self, image: &ImageSpec, args: &[&str]) -> ClusterResult<()> {
        debug!(docker = %self.docker.display(), ?args, "running docker");
        let output = Command::new(&self.docker)
            .args(args)
            .output()
            .map_err(|e| build_err(image, format!("failed to run {}: {e}", self.docker.display())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(build_err(
                image,
                format!("docker {} exited with {}: {}", args[0], output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

fn docker_binary(configured: Option<OsString>) -> PathBuf {
    configured
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("docker"))
}

impl ImageBuilder for DockerBuilder {
    fn build_and_publish(&self, image: &ImageSpec) -> ClusterResult<ImageSpec> {
        let Some(context) = &image.context else {
            return Ok(image.clone());
        };
        // Fingerprint first so a missing context or Dockerfile fails before docker runs.
        let built = self.context.build_and_publish(image)?;

        let dir = self.context.context_dir(context);
        let dockerfile = dir.join(&image.dockerfile);
        let reference = image.reference();
        let dir_arg = dir.to_string_lossy();
        let dockerfile_arg = dockerfile.to_string_lossy();

        info!(image = %image.name, %reference, "docker build");
        self.run(image, &["build", "-t", &reference, "-f", &dockerfile_arg, &dir_arg])?;
        info!(image = %image.name, %reference, "docker push");
        self.run(image, &["push", &reference])?;
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(context: Option<&str>) -> ImageSpec {
        ImageSpec {
            name: "web".to_string(),
            registry: String::new(),
            repository: "me/web".to_string(),
            tag: "latest".to_string(),
            context: context.map(PathBuf::from),
            dockerfile: "Dockerfile".to_string(),
            digest: None,
            exposed_ports: vec![],
        }
    }

    fn write_context(dir: &Path) {
        std::fs::write(
            dir.join("Dockerfile"),
            "FROM python:3.11\nWORKDIR /app\nEXPOSE 8000/tcp 8001\nexpose 9000\nCMD [\"gunicorn\"]\n",
        )
        .unwrap();
        std::fs::write(dir.join("manage.py"), "print('hi')\n").unwrap();
        std::fs::create_dir(dir.join("app")).unwrap();
        std::fs::write(dir.join("app").join("settings.py"), "DEBUG = False\n").unwrap();
    }

    #[test]
    fn parses_expose_lines() {
        let text = "FROM x\nEXPOSE 80 443/tcp\n  EXPOSE 80\nRUN echo EXPOSE 1\n";
        assert_eq!(exposed_ports(text), vec![80, 443]);
        assert!(exposed_ports("FROM scratch\n").is_empty());
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        write_context(dir.path());

        let builder = ContextBuilder::new(dir.path());
        let first = builder.build_and_publish(&image(Some("."))).unwrap();
        let second = builder.build_and_publish(&image(Some("."))).unwrap();
        assert_eq!(first.digest, second.digest);
        assert!(first.digest.as_deref().unwrap().starts_with("sha256:"));
        assert_eq!(first.exposed_ports, vec![8000, 8001, 9000]);

        std::fs::write(dir.path().join("manage.py"), "print('changed')\n").unwrap();
        let third = builder.build_and_publish(&image(Some("."))).unwrap();
        assert_ne!(first.digest, third.digest);
    }

    #[test]
    fn git_directory_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_context(dir.path());
        let before = context_digest(dir.path()).unwrap();

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("HEAD"), "ref: main\n").unwrap();
        assert_eq!(context_digest(dir.path()).unwrap(), before);
    }

    #[test]
    fn missing_context_or_dockerfile_fails() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(dir.path());

        let err = builder.build_and_publish(&image(Some("nope"))).unwrap_err();
        assert!(matches!(err, ClusterError::Build { .. }));

        let err = builder.build_and_publish(&image(Some("."))).unwrap_err();
        assert!(err.to_string().contains("Dockerfile"), "{err}");
    }

    #[test]
    fn image_without_context_passes_through() {
        let builder = ContextBuilder::new("/nonexistent");
        let published = image(None);
        assert_eq!(builder.build_and_publish(&published).unwrap(), published);

        let docker = DockerBuilder::with_binary("/nonexistent", "/nonexistent/docker");
        assert_eq!(docker.build_and_publish(&published).unwrap(), published);
    }

    #[test]
    fn docker_binary_override() {
        assert_eq!(docker_binary(None), PathBuf::from("docker"));
        assert_eq!(docker_binary(Some(OsString::new())), PathBuf::from("docker"));
        assert_eq!(
            docker_binary(Some(OsString::from("/opt/bin/podman"))),
            PathBuf::from("/opt/bin/podman")
        );
    }

    /// A docker stand-in that logs its arguments and refuses to push.
    #[cfg(unix)]
    fn fake_docker(dir: &Path) -> PathBuf {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("docker");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            b"#!/bin/sh\n\
echo \"$@\" >> \"$(dirname \"$0\")/argv.log\"\n\
if [ \"$1\" = push ]; then\n\
  echo 'denied: requested access to the resource is denied' >&2\n\
  exit 1\n\
fi\n",
        )
        .unwrap();
        file.sync_all().unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn docker_builds_then_push_failure_is_reported() {
        let bin = tempfile::tempdir().unwrap();
        let docker = fake_docker(bin.path());

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("site")).unwrap();
        write_context(&root.path().join("site"));

        let builder = DockerBuilder::with_binary(root.path(), &docker);
        let err = builder.build_and_publish(&image(Some("site"))).unwrap_err();
        assert!(
            matches!(&err, ClusterError::Build { image, .. } if image == "web"),
            "{err}"
        );
        assert!(err.to_string().contains("docker push exited"), "{err}");
        assert!(err.to_string().contains("requested access to the resource is denied"), "{err}");

        let log = std::fs::read_to_string(bin.path().join("argv.log")).unwrap();
        let calls: Vec<&str> = log.lines().collect();
        let dir = root.path().join("site");
        assert_eq!(
            calls,
            vec![
                format!(
                    "build -t me/web:latest -f {} {}",
                    dir.join("Dockerfile").display(),
                    dir.display()
                ),
                "push me/web:latest".to_string(),
            ]
        );
    }

    #[test]
    fn missing_docker_binary_is_a_build_error() {
        let root = tempfile::tempdir().unwrap();
        write_context(root.path());
        let builder = DockerBuilder::with_binary(root.path(), root.path().join("no-such-docker"));
        let err = builder.build_and_publish(&image(Some("."))).unwrap_err();
        assert!(err.to_string().contains("failed to run"), "{err}");
    }
}
