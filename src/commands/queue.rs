//! Queue commands:
//! - `phasegate queue build <candidates.yaml>` - Rescore, rank and persist a queue
//! - `phasegate queue show` - Print the current queue
//! - `phasegate queue claim [--start]` - Pop the top actionable entry
//! - `phasegate queue insert|remove|reorder` - Edit the queue in place

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use colored::Colorize;
use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};
use crate::models::Candidate;
use crate::planning::{
    load_candidates, score, BlockedCandidate, MutationReport, Queue, QueueBuilder, QueueOp,
};

use crate::workflow::Engine;

use super::common::{truncate, Workspace};

pub fn build(
    candidates_path: PathBuf,
    limit: Option<usize>,
    ttl: Option<Duration>,
) -> Result<()> {
    let workspace = Workspace::open()?;
    let config = &workspace.config;

    let candidates = load_candidates(&candidates_path)
        .with_context(|| format!("Failed to read candidates from {}", candidates_path.display()))?;
    let resolved = workspace.resolved_set().load()?;

    let builder = QueueBuilder::new(
        config.weight_table()?,
        limit.unwrap_or(config.queue.limit),
        match ttl {
            Some(ttl) => ttl,
            None => config.queue_ttl()?,
        },
    );
    let report = builder
        .build(candidates, &resolved)
        .context("Planning pass failed; no queue was written")?;
    workspace.queue_store().save(&report.queue)?;

    print_queue(&report.queue);
    print_blocked(&report.blocked);
    if !report.deferred.is_empty() {
        println!(
            "{} Deferred below the limit: {}",
            "ℹ".blue(),
            report.deferred.join(", ").dimmed()
        );
    }
    Ok(())
}

pub fn show(json: bool) -> Result<()> {
    let workspace = Workspace::open()?;
    let Some(queue) = workspace.queue_store().load()? else {
        println!("{} No queue. Run 'phasegate queue build <candidates>' first.", "ℹ".blue());
        return Ok(());
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&queue).context("Failed to encode queue")?
        );
    } else {
        print_queue(&queue);
    }
    Ok(())
}

/// Pop the top entry. With `start`, also start a workflow from the
/// candidate's category template.
///
/// With `start`, an entry whose category or mode cannot start a workflow
/// stays queued, and an entry whose workflow fails to initialize goes back
/// to rank 1.
pub fn claim(start: bool, mode: Option<String>) -> Result<()> {
    let workspace = Workspace::open()?;
    let resolved = workspace.resolved_set().load()?;
    let store = workspace.queue_store();
    let engine = if start { Some(workspace.engine()?) } else { None };

    let report = match &engine {
        Some(engine) => store.claim_checked(&resolved, Utc::now(), |candidate| {
            check_startable(engine, candidate, mode.as_deref())
        }),
        None => store.claim(&resolved, Utc::now()),
    }
    .context("Failed to claim from queue")?;

    if !report.evicted.is_empty() {
        println!("{} Evicted entries that are blocked again:", "!".yellow().bold());
        print_blocked(&report.evicted);
    }
    let Some(candidate) = report.claimed else {
        println!("{} Queue has no actionable entries", "ℹ".blue());
        return Ok(());
    };

    println!(
        "{} Claimed {} → {} (score {:.3})",
        "✓".green().bold(),
        candidate.id.cyan().bold(),
        candidate.target,
        candidate.rank_score()
    );

    let Some(engine) = engine else {
        return Ok(());
    };
    let Some(template) = candidate.category.clone() else {
        bail!("Candidate '{}' has no category", candidate.id);
    };
    match engine.initialize(&template, mode.as_deref()) {
        Ok(state) => {
            println!(
                "  {} Started {} from template {}",
                "→".dimmed(),
                state.id.cyan(),
                template
            );
            Ok(())
        }
        Err(err) => {
            let id = candidate.id.clone();
            store
                .mutate(QueueOp::Insert { candidate, position: 1 }, &resolved)
                .with_context(|| format!("Workflow for '{id}' failed ({err}) and it could not be requeued"))?;
            Err(err).with_context(|| format!("Failed to start workflow; '{id}' is back at rank 1"))
        }
    }
}

/// Reject a candidate whose category and mode do not name a startable
/// workflow.
fn check_startable(engine: &Engine, candidate: &Candidate, mode: Option<&str>) -> EngineResult<()> {
    let Some(category) = candidate.category.as_deref() else {
        return Err(EngineError::InvalidTemplate(format!(
            "candidate '{}' has no category; start a workflow with 'phasegate start <template>'",
            candidate.id
        )));
    };
    engine.templates().get(category)?.resolve_mode(mode)?;
    Ok(())
}

/// Insert a candidate from a candidates file, at the end unless a position
/// is given.
pub fn insert(candidates_path: PathBuf, id: String, position: Option<usize>) -> Result<()> {
    let workspace = Workspace::open()?;
    let position = match position {
        Some(position) => position,
        None => workspace
            .queue_store()
            .load()?
            .map(|q| q.len() + 1)
            .unwrap_or(1),
    };
    let mut candidate = load_candidates(&candidates_path)?
        .into_iter()
        .find(|c| c.id == id)
        .with_context(|| format!("Candidate '{id}' not found in {}", candidates_path.display()))?;
    candidate.score = Some(score(&candidate, &workspace.config.weight_table()?));

    mutate(&workspace, QueueOp::Insert { candidate, position })?;
    println!("{} Inserted {} at rank {position}", "✓".green().bold(), id.cyan());
    Ok(())
}

pub fn remove(rank: usize) -> Result<()> {
    let workspace = Workspace::open()?;
    let report = mutate(&workspace, QueueOp::Remove { rank })?;
    if let Some(removed) = report.removed {
        println!(
            "{} Removed {} from rank {rank}",
            "✓".green().bold(),
            removed.id.cyan()
        );
    }
    Ok(())
}

pub fn reorder(rank: usize, position: usize) -> Result<()> {
    let workspace = Workspace::open()?;
    mutate(&workspace, QueueOp::Reorder { rank, position })?;
    println!(
        "{} Moved rank {rank} to {position}",
        "✓".green().bold()
    );
    Ok(())
}

fn mutate(workspace: &Workspace, op: QueueOp) -> Result<MutationReport> {
    let store = workspace.queue_store();
    let resolved = workspace.resolved_set().load()?;
    let report = store.mutate(op, &resolved)?;
    if !report.evicted.is_empty() {
        println!("{} Evicted entries that are blocked again:", "!".yellow().bold());
        print_blocked(&report.evicted);
    }
    if let Some(queue) = store.load()? {
        print_queue(&queue);
    }
    Ok(report)
}

fn print_queue(queue: &Queue) {
    let now = Utc::now();
    let expiry = if queue.is_expired(now) {
        format!("expired {}", queue.expires_at.format("%Y-%m-%d %H:%M:%SZ")).red()
    } else {
        format!("expires {}", queue.expires_at.format("%Y-%m-%d %H:%M:%SZ")).dimmed()
    };
    println!("{} {} entries, {expiry}", "Queue".bold(), queue.len());

    if queue.is_empty() {
        return;
    }
    println!(
        "{:>4}  {:24} {:24} {:10} {:>8} {:>7}",
        "RANK".bold(),
        "ID".bold(),
        "TARGET".bold(),
        "CATEGORY".bold(),
        "SCORE".bold(),
        "EFFORT".bold()
    );
    println!("{}", "─".repeat(82));
    for entry in &queue.entries {
        let c = &entry.candidate;
        println!(
            "{:>4}  {:24} {:24} {:10} {:>8.3} {:>7.1}",
            entry.rank,
            truncate(&c.id, 24).cyan(),
            truncate(&c.target, 24),
            truncate(c.category.as_deref().unwrap_or("-"), 10),
            c.rank_score(),
            c.effort
        );
    }
}

fn print_blocked(blocked: &[BlockedCandidate]) {
    for entry in blocked {
        println!(
            "  {} {} blocked by {}",
            "⊘".red(),
            entry.id.cyan(),
            entry.blocked_by.join(", ").yellow()
        );
    }
}
