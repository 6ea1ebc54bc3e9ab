use crate::manifest::Manifest;
use crate::recipe::BuildRecipe;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info, instrument};
use wharfd_models::WharfError;

#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, program: &str, args: &[String]) -> Result<std::process::Output, WharfError>;
}

pub struct DockerCli;

#[async_trait]
impl CommandRunner for DockerCli {
    async fn run(&self, program: &str, args: &[String]) -> Result<std::process::Output, WharfError> {
        Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WharfError::DockerError {
                message: e.to_string(),
            })
    }
}

pub struct ImageBuilder<R = DockerCli> {
    runner: R,
}

impl ImageBuilder<DockerCli> {
    pub fn new() -> Self {
        Self { runner: DockerCli }
    }
}

impl Default for ImageBuilder<DockerCli> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> ImageBuilder<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    /// Validate build inputs, render the recipe, and drive `docker build`
    /// against `context`. Every step aborts the build on failure; no image is
    /// tagged on a failed build.
    #[instrument(skip(self, recipe))]
    pub async fn build_image(
        &self,
        recipe: &BuildRecipe,
        context: &Path,
        image_ref: &str,
    ) -> Result<(), WharfError> {
        let manifest_path = context.join(&recipe.manifest);
        if !manifest_path.exists() {
            return Err(WharfError::BuildStepFailed {
                step: "manifest".to_string(),
                detail: format!("{} not found in build context", recipe.manifest),
            });
        }

        let manifest = Manifest::from_file(&manifest_path)?;
        if !recipe.use_dependency_cache {
            // Closed-world mode: a loose specifier would make the install set
            // depend on resolution time, not on the manifest.
            manifest.require_fully_pinned()?;
        }
        info!(
            requirements = manifest.requirements().len(),
            closed_world = !recipe.use_dependency_cache,
            "Validated dependency manifest"
        );

        // The Dockerfile lives outside the context so the source tree is
        // never mutated by a build.
        let temp_dir = tempfile::tempdir()?;
        let dockerfile_path = temp_dir.path().join("Dockerfile");
        std::fs::write(&dockerfile_path, recipe.render())?;

        info!("Building image: {}", image_ref);
        info!("Build context: {:?}", context);

        let args = vec![
            "build".to_string(),
            "-t".to_string(),
            image_ref.to_string(),
            "-f".to_string(),
            dockerfile_path.display().to_string(),
            context.display().to_string(),
        ];
        let build_result = self.runner.run("docker", &args).await?;

        if !build_result.status.success() {
            let stderr = String::from_utf8_lossy(&build_result.stderr);
            error!("Image build failed - stderr: {}", stderr);
            return Err(WharfError::DockerError {
                message: format!("docker build failed: {stderr}"),
            });
        }

        info!("Built image: {}", image_ref);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::StartCommand;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::Mutex;
    use wharfd_models::BuildConfig;

    struct FakeRunner {
        exit_code: i32,
        stderr: &'static str,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeRunner {
        fn new(exit_code: i32, stderr: &'static str) -> Self {
            Self {
                exit_code,
                stderr,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
        ) -> Result<std::process::Output, WharfError> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            Ok(std::process::Output {
                status: std::process::ExitStatus::from_raw(self.exit_code << 8),
                stdout: Vec::new(),
                stderr: self.stderr.as_bytes().to_vec(),
            })
        }
    }

    fn recipe() -> BuildRecipe {
        BuildRecipe::from_config(
            &BuildConfig::default(),
            StartCommand {
                bind: "0.0.0.0:443".to_string(),
                workers: 2,
                entry_point: "abroad.wsgi:application".parse().unwrap(),
            },
        )
    }

    fn context_with_manifest(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), contents).unwrap();
        dir
    }

    #[tokio::test]
    async fn invokes_docker_build_with_tag_and_context() {
        let context = context_with_manifest("django==4.2.7\n");
        let builder = ImageBuilder::with_runner(FakeRunner::new(0, ""));
        builder
            .build_image(&recipe(), context.path(), "abroad:latest")
            .await
            .unwrap();

        let calls = builder.runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (program, args) = &calls[0];
        assert_eq!(program, "docker");
        assert_eq!(args[0], "build");
        assert_eq!(args[1], "-t");
        assert_eq!(args[2], "abroad:latest");
        assert_eq!(*args.last().unwrap(), context.path().display().to_string());
    }

    #[tokio::test]
    async fn missing_manifest_aborts_before_docker_runs() {
        let context = tempfile::tempdir().unwrap();
        let builder = ImageBuilder::with_runner(FakeRunner::new(0, ""));
        let err = builder
            .build_image(&recipe(), context.path(), "abroad:latest")
            .await
            .unwrap_err();
        assert!(matches!(err, WharfError::BuildStepFailed { .. }));
        assert!(builder.runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unpinned_manifest_aborts_closed_world_build() {
        let context = context_with_manifest("django>=4.2\n");
        let builder = ImageBuilder::with_runner(FakeRunner::new(0, ""));
        let err = builder
            .build_image(&recipe(), context.path(), "abroad:latest")
            .await
            .unwrap_err();
        assert!(matches!(err, WharfError::UnpinnedRequirement { .. }));
        assert!(builder.runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unpinned_manifest_allowed_when_cache_enabled() {
        let context = context_with_manifest("django>=4.2\n");
        let mut cached = recipe();
        cached.use_dependency_cache = true;
        let builder = ImageBuilder::with_runner(FakeRunner::new(0, ""));
        builder
            .build_image(&cached, context.path(), "abroad:latest")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn docker_failure_surfaces_stderr() {
        let context = context_with_manifest("django==4.2.7\n");
        let builder = ImageBuilder::with_runner(FakeRunner::new(1, "pull access denied"));
        let err = builder
            .build_image(&recipe(), context.path(), "abroad:latest")
            .await
            .unwrap_err();
        match err {
            WharfError::DockerError { message } => assert!(message.contains("pull access denied")),
            other => panic!("expected DockerError, got {other:?}"),
        }
    }
}
