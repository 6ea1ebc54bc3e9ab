use wharfd_models::{BuildConfig, EntryPoint};

/// The supervisor invocation baked into the image as its CMD.
#[derive(Debug, Clone)]
pub struct StartCommand {
    pub bind: String,
    pub workers: usize,
    pub entry_point: EntryPoint,
}

/// A renderable container build recipe. Step order is the contract: env flags
/// come before any RUN so bytecode suppression and unbuffered stdio hold for
/// the whole build and for the runtime, OS packages install and scrub their
/// cache in one layer, and the source overlay comes after dependencies so the
/// dependency layers stay cacheable across source edits.
#[derive(Debug, Clone)]
pub struct BuildRecipe {
    pub base_image: String,
    pub os_packages: Vec<String>,
    pub manifest: String,
    pub app_root: String,
    pub expose_port: u16,
    pub use_dependency_cache: bool,
    pub start: StartCommand,
}

impl BuildRecipe {
    pub fn from_config(build: &BuildConfig, start: StartCommand) -> Self {
        Self {
            base_image: build.base_image.clone(),
            os_packages: build.os_packages.clone(),
            manifest: build.manifest.clone(),
            app_root: build.app_root.clone(),
            expose_port: build.expose_port,
            use_dependency_cache: build.use_dependency_cache,
            start,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("FROM {}\n\n", self.base_image));

        out.push_str("ENV PYTHONDONTWRITEBYTECODE=1 \\\n    PYTHONUNBUFFERED=1\n\n");

        if !self.os_packages.is_empty() {
            out.push_str(&format!(
                "RUN apt-get update \\\n    && apt-get install -y --no-install-recommends {} \\\n    && rm -rf /var/lib/apt/lists/*\n\n",
                self.os_packages.join(" ")
            ));
        }

        out.push_str(&format!("WORKDIR {}\n\n", self.app_root));

        let pip_cache_flag = if self.use_dependency_cache {
            ""
        } else {
            "--no-cache-dir "
        };
        out.push_str(&format!(
            "COPY {manifest} {root}/\nRUN pip install {cache}-r {manifest}\n\n",
            manifest = self.manifest,
            root = self.app_root,
            cache = pip_cache_flag,
        ));

        out.push_str(&format!("COPY . {}/\n\n", self.app_root));

        out.push_str(&format!("EXPOSE {}\n\n", self.expose_port));

        out.push_str(&format!(
            "CMD [\"wharfd\", \"--bind\", \"{}\", \"--workers\", \"{}\", \"{}\"]\n",
            self.start.bind, self.start.workers, self.start.entry_point,
        ));

        out
    }
}
