//! Plain-text audit files for each research cycle.
//!
//! Layout of a cycle directory:
//!
//! ```text
//! <cycle>/
//!   academic_researcher.txt     one file per roster worker
//!   critical_analysis.txt
//!   narrative.txt
//!   refinement_context.txt      full transcript
//!   refinement_distilled.txt    what gets committed
//! ```
//!
//! Files start with a short header that [`load_cycle_artifacts`] strips, so a
//! saved cycle can be committed later.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ResearchFindings, WorkerFinding, WorkerSpec};

pub const CRITIQUE_FILE: &str = "critical_analysis.txt";
pub const NARRATIVE_FILE: &str = "narrative.txt";
pub const TRANSCRIPT_FILE: &str = "refinement_context.txt";
pub const DISTILLED_FILE: &str = "refinement_distilled.txt";

const HEADER_END: &str = "=====\n";

/// Directory name for a cycle: spaces and slashes become underscores.
pub fn dir_name(cycle_name: &str) -> String {
    cycle_name
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

/// Artifacts read back from a cycle directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleArtifacts {
    pub findings: ResearchFindings,
    pub distilled_refinement: String,
}

/// Writes the audit files of one cycle.
pub struct ArtifactSink {
    dir: PathBuf,
}

impl ArtifactSink {
    /// Create the cycle directory.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write findings, transcript and distilled refinement. Empty workers get no file.
    pub fn write_cycle(
        &self,
        findings: &ResearchFindings,
        transcript: &str,
        distilled: &str,
    ) -> Result<()> {
        for worker in findings.workers.iter().filter(|w| !w.is_empty()) {
            self.write(
                &format!("{}.txt", worker.worker_id),
                &format!("Worker: {}", worker.label),
                &worker.text,
            )?;
        }
        if !findings.critique.trim().is_empty() {
            self.write(CRITIQUE_FILE, "Critical Analysis", &findings.critique)?;
        }
        if !findings.narrative.trim().is_empty() {
            self.write(NARRATIVE_FILE, "Narrative", &findings.narrative)?;
        }
        self.write(TRANSCRIPT_FILE, "Refinement Transcript", transcript)?;
        self.write(DISTILLED_FILE, "Distilled Refinement", distilled)?;

        debug!(dir = %self.dir.display(), "Cycle artifacts written");
        Ok(())
    }

    fn write(&self, file: &str, title: &str, body: &str) -> Result<()> {
        let content = format!(
            "{}\nTimestamp: {}\n{}{}",
            title,
            Utc::now().to_rfc3339(),
            HEADER_END,
            body
        );
        fs::write(self.dir.join(file), content)?;
        Ok(())
    }
}

/// Read a cycle directory back. Missing files become empty artifacts.
pub fn load_cycle_artifacts(dir: &Path, roster: &[WorkerSpec]) -> Result<CycleArtifacts> {
    if !dir.is_dir() {
        return Err(Error::Other(format!(
            "Cycle directory not found: {}",
            dir.display()
        )));
    }

    let workers = roster
        .iter()
        .map(|worker| {
            read_body(&dir.join(format!("{}.txt", worker.id))).map(|text| WorkerFinding::new(worker, text))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CycleArtifacts {
        findings: ResearchFindings {
            workers,
            critique: read_body(&dir.join(CRITIQUE_FILE))?,
            narrative: read_body(&dir.join(NARRATIVE_FILE))?,
        },
        distilled_refinement: read_body(&dir.join(DISTILLED_FILE))?,
    })
}

fn read_body(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    let raw = fs::read_to_string(path)?;
    let body = match raw.split_once(HEADER_END) {
        Some((_, body)) => body,
        None => raw.as_str(),
    };
    Ok(body.trim().to_string())
}
