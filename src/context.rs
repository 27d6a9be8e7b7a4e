//! Workspace (organization, mount) selection and persistence

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::remote::OrbitApi;
use crate::types::{ContextIds, Mount, Organization, WorkspaceContext};

/// Interactive choice between labelled options
pub trait Prompt {
    /// Let the user pick one of `labels`, returning its index
    ///
    /// `None` means the user gave up (e.g. end of input).
    fn choose(&mut self, what: &str, labels: &[String]) -> Result<Option<usize>>;
}

/// Numbered menu on a line-oriented terminal
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stderr> {
    /// Menu on stderr so stdout stays free for results
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Prompt for TerminalPrompt<R, W> {
    fn choose(&mut self, what: &str, labels: &[String]) -> Result<Option<usize>> {
        writeln!(self.output, "Please select one of the following {}:", what)?;
        for (i, label) in labels.iter().enumerate() {
            writeln!(self.output, "{}: {}", i + 1, label)?;
        }

        loop {
            write!(self.output, "> ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            match line.trim().parse::<usize>() {
                Ok(choice) if (1..=labels.len()).contains(&choice) => {
                    return Ok(Some(choice - 1));
                }
                _ => continue,
            }
        }
    }
}

/// Resolves the workspace every remote call is scoped by
pub struct ContextSelector<'a, A: OrbitApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: OrbitApi + ?Sized> ContextSelector<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Organizations sorted by name
    pub async fn organizations(&self) -> Result<Vec<Organization>> {
        tracing::debug!("Fetching organizations");
        let response = self.api.list_orgs().await?;
        if !response.is_success() {
            return Err(SyncError::Api(format!(
                "Listing organizations failed with status {}",
                response.status
            )));
        }
        let mut orgs = response.body.groups;
        orgs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(orgs)
    }

    /// Mounts of an organization sorted by name
    pub async fn mounts(&self, group_id: &str) -> Result<Vec<Mount>> {
        tracing::debug!("Fetching mounts for organization {}", group_id);
        let response = self.api.list_mounts(group_id).await?;
        if !response.is_success() {
            return Err(SyncError::Api(format!(
                "Listing mounts of {} failed with status {}",
                group_id, response.status
            )));
        }
        let mut mounts = response.body.mounts;
        mounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(mounts)
    }

    /// Ask the user for an organization, then for one of its mounts
    pub async fn ask_for_context<P: Prompt + ?Sized>(
        &self,
        prompt: &mut P,
    ) -> Result<Option<WorkspaceContext>> {
        let orgs = self.organizations().await?;
        if orgs.is_empty() {
            tracing::warn!("No organizations available to these credentials");
            return Ok(None);
        }
        let labels: Vec<String> = orgs.iter().map(|o| o.name.clone()).collect();
        let Some(org) = pick(prompt, "orgs", &labels, orgs)? else {
            return Ok(None);
        };

        let mounts = self.mounts(&org.id).await?;
        if mounts.is_empty() {
            tracing::warn!("Organization {} has no mounts", org.name);
            return Ok(None);
        }
        let labels: Vec<String> = mounts.iter().map(|m| m.mount_location.clone()).collect();
        let Some(mount) = pick(prompt, "mounts", &labels, mounts)? else {
            return Ok(None);
        };

        tracing::debug!("Selected mount {}: {}", mount.id, mount.mount_location);
        Ok(Some(WorkspaceContext::new(org, mount)))
    }

    /// Look up previously persisted identifiers
    ///
    /// `None` when the organization or the mount no longer exists.
    pub async fn find_context(&self, ids: &ContextIds) -> Result<Option<WorkspaceContext>> {
        let Some(org) = self
            .organizations()
            .await?
            .into_iter()
            .find(|o| o.id == ids.group_id)
        else {
            tracing::debug!("Organization {} not found", ids.group_id);
            return Ok(None);
        };
        tracing::info!("Found organization: {}", org.name);

        let Some(mount) = self
            .mounts(&org.id)
            .await?
            .into_iter()
            .find(|m| m.id == ids.mount_id)
        else {
            tracing::debug!("Mount {} not found", ids.mount_id);
            return Ok(None);
        };
        tracing::info!("Found mount: {}", mount.name);

        Ok(Some(WorkspaceContext::new(org, mount)))
    }

    /// Reuse the workspace stored at `path`, or ask for one and store it
    ///
    /// With `reset`, the stored workspace is ignored and replaced.
    pub async fn resolve<P: Prompt + ?Sized>(
        &self,
        path: &Path,
        prompt: &mut P,
        reset: bool,
    ) -> Result<WorkspaceContext> {
        if !reset {
            if let Some(ids) = load_context_ids(path)? {
                if let Some(context) = self.find_context(&ids).await? {
                    return Ok(context);
                }
                tracing::warn!(
                    "Stored workspace {}/{} is gone, asking again",
                    ids.group_id,
                    ids.mount_id
                );
            }
        }

        let context = self
            .ask_for_context(prompt)
            .await?
            .ok_or_else(|| SyncError::WorkspaceNotFound("no workspace selected".to_string()))?;
        save_context_ids(path, &context.ids())?;
        Ok(context)
    }
}

fn pick<P: Prompt + ?Sized, T>(
    prompt: &mut P,
    what: &str,
    labels: &[String],
    items: Vec<T>,
) -> Result<Option<T>> {
    Ok(prompt
        .choose(what, labels)?
        .and_then(|index| items.into_iter().nth(index)))
}

/// Read persisted identifiers; `None` if the file does not exist
pub fn load_context_ids(path: &Path) -> Result<Option<ContextIds>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Persist identifiers, creating parent folders as needed
pub fn save_context_ids(path: &Path, ids: &ContextIds) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string(ids)?)?;
    tracing::debug!("Saved workspace to {:?}", path);
    Ok(())
}
