use std::path::Path;
use wharfd_models::WharfError;

/// One requirements-file line. `pin` is set only for exact `==` pins; loose
/// specifiers (`>=`, `~=`, bare names) parse but fail the closed-world gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub pin: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    requirements: Vec<Requirement>,
}

const LOOSE_SPECIFIERS: [&str; 5] = [">=", "<=", "~=", ">", "<"];

impl Manifest {
    pub fn parse(path: &str, contents: &str) -> Result<Self, WharfError> {
        let mut requirements = Vec::new();

        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('-') {
                // -r/-e/--index-url style directives defeat the closed-world
                // guarantee: the install set would no longer be determined by
                // this file alone.
                return Err(WharfError::ManifestError {
                    path: path.to_string(),
                    reason: format!("line {}: directive '{line}' is not supported", lineno + 1),
                });
            }

            let requirement = if let Some((name, version)) = line.split_once("==") {
                let (name, version) = (name.trim(), version.trim());
                if name.is_empty() || version.is_empty() {
                    return Err(WharfError::ManifestError {
                        path: path.to_string(),
                        reason: format!("line {}: malformed pin '{line}'", lineno + 1),
                    });
                }
                Requirement {
                    name: name.to_string(),
                    pin: Some(version.to_string()),
                    raw: line.to_string(),
                }
            } else {
                let name = LOOSE_SPECIFIERS
                    .iter()
                    .find_map(|op| line.split_once(op).map(|(n, _)| n.trim()))
                    .unwrap_or(line);
                Requirement {
                    name: name.to_string(),
                    pin: None,
                    raw: line.to_string(),
                }
            };
            requirements.push(requirement);
        }

        Ok(Self { requirements })
    }

    pub fn from_file(path: &Path) -> Result<Self, WharfError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| WharfError::ManifestError {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(&display, &contents)
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_fully_pinned(&self) -> bool {
        self.requirements.iter().all(|r| r.pin.is_some())
    }

    pub fn unpinned(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter().filter(|r| r.pin.is_none())
    }

    /// Closed-world installs are only deterministic when every requirement is
    /// an exact pin.
    pub fn require_fully_pinned(&self) -> Result<(), WharfError> {
        match self.unpinned().next() {
            None => Ok(()),
            Some(requirement) => Err(WharfError::UnpinnedRequirement {
                name: requirement.name.clone(),
            }),
        }
    }
}
