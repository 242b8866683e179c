//! Tree command handlers

use crate::config::Config;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;
use tracing::warn;
use triad_merkle::{CommitmentEvent, FieldElement, IngestHandle, TriadForest, TriadMerkleTree};

pub async fn handle(action: crate::TreeAction, config: &Config) -> Result<()> {
    match action {
        crate::TreeAction::Init { snapshot, force } => {
            if snapshot.exists() && !force {
                bail!(
                    "{} already exists (pass --force to overwrite)",
                    snapshot.display()
                );
            }
            let tree = config.tree.build_tree()?;
            save(&tree, &snapshot, config)?;

            println!("{} Initialized empty tree", "✓".green().bold());
            print_summary(&tree, &snapshot);
            Ok(())
        }

        crate::TreeAction::Append { snapshot, a, b, c } => {
            let mut tree = load(&snapshot, config)?;
            tree.insert_batch(&[a, b, c])
                .context("Failed to append triad")?;
            save(&tree, &snapshot, config)?;

            println!(
                "{} Appended triad {}",
                "✓".green().bold(),
                (tree.triad_count() - 1).to_string().cyan()
            );
            print_summary(&tree, &snapshot);
            Ok(())
        }

        crate::TreeAction::Build { snapshot, leaves } => {
            println!("{} Reading leaves from {}", "→".cyan().bold(), leaves.display());
            let leaves = read_leaves(&leaves)?;

            let mut tree = config.tree.build_tree()?;
            tree.insert_triads(leaves.chunks(3))
                .context("Failed to insert leaves")?;
            save(&tree, &snapshot, config)?;

            println!("{} Built tree from {} leaves", "✓".green().bold(), leaves.len());
            print_summary(&tree, &snapshot);
            Ok(())
        }

        crate::TreeAction::Root { snapshot } => {
            let tree = load(&snapshot, config)?;
            print_summary(&tree, &snapshot);
            Ok(())
        }

        crate::TreeAction::Ingest { dir, events } => ingest(&dir, &events, config).await,
    }
}

async fn ingest(dir: &Path, events: &Path, config: &Config) -> Result<()> {
    let content = fs::read_to_string(events)
        .with_context(|| format!("Failed to read events from {}", events.display()))?;
    let events = parse_events(&content)?;

    let forest = if TriadForest::contains_shards(dir)? {
        println!("{} Resuming forest in {}", "→".cyan().bold(), dir.display());
        TriadForest::load_from_dir(dir, config.tree.build_hasher()?)
            .with_context(|| format!("Failed to load forest from {}", dir.display()))?
    } else {
        println!("{} Starting new forest in {}", "→".cyan().bold(), dir.display());
        config.tree.build_forest()?
    };

    let (handle, task) = IngestHandle::spawn(forest, 64);
    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for event in events {
        let block = event.block_number;
        match handle.submit(event).await {
            Ok(_) => accepted += 1,
            Err(e) => {
                warn!(block, error = %e, "Skipping commitment event");
                rejected += 1;
            }
        }
    }
    handle.shutdown().await?;
    let forest = task.await.context("Ingest task failed")?;

    forest
        .save_to_dir(dir, config.tree.compression)
        .with_context(|| format!("Failed to save forest to {}", dir.display()))?;

    println!("{} Ingested {} event(s)", "✓".green().bold(), accepted);
    if rejected > 0 {
        println!("{} Rejected {} event(s)", "!".yellow().bold(), rejected);
    }
    println!("  Shards:       {}", forest.tree_count().to_string().cyan());
    println!("  Total leaves: {}", forest.total_leaves().to_string().cyan());
    println!("  Current root: {}", forest.current_root().to_string().cyan());
    Ok(())
}

fn load(path: &Path, config: &Config) -> Result<TriadMerkleTree> {
    super::load_snapshot(path, config)
}

fn save(tree: &TriadMerkleTree, path: &Path, config: &Config) -> Result<()> {
    tree.save_with(path, config.compression_for(path))
        .with_context(|| format!("Failed to write snapshot {}", path.display()))
}

fn print_summary(tree: &TriadMerkleTree, path: &Path) {
    println!("  Snapshot: {}", path.display().to_string().dimmed());
    println!("  Depth:    {}", tree.depth());
    println!(
        "  Leaves:   {} / {}",
        tree.len().to_string().cyan(),
        tree.capacity()
    );
    println!("  Root:     {}", tree.root().to_string().cyan());
    println!("            {}", tree.root().to_hex_string().dimmed());
}

/// Parse a JSON array of field elements whose length is a multiple of 3.
fn read_leaves(path: &Path) -> Result<Vec<FieldElement>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let leaves: Vec<FieldElement> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of field elements", path.display()))?;
    if leaves.len() % 3 != 0 {
        bail!(
            "Leaf count {} is not a multiple of 3; leaves are inserted in triads",
            leaves.len()
        );
    }
    Ok(leaves)
}

/// One JSON commitment event per line; blank lines are ignored.
fn parse_events(content: &str) -> Result<Vec<CommitmentEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", n + 1))
        })
        .collect()
}
