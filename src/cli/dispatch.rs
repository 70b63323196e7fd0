use anyhow::Result;
use clap::CommandFactory;
use phasegate::commands::{
    archive, completions, directive, init, queue, resolve, signal, start, status, templates, unit,
};

use super::types::{
    ArchiveCommands, Cli, Commands, QueueCommands, ResolveCommands, SignalCommands,
};

pub fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Init => init::execute(),
        Commands::Start { template, mode } => start::execute(template, mode),
        Commands::Do {
            instance,
            directive: words,
        } => directive::execute(instance, words),
        Commands::Unit {
            instance,
            unit: unit_id,
            status,
            reason,
            deliverables,
        } => unit::execute(instance, unit_id, status, reason, deliverables),
        Commands::Status { instance, json } => status::execute(instance, json),
        Commands::Templates { template } => match template {
            Some(id) => templates::show(id),
            None => templates::list(),
        },
        Commands::Queue { command } => match command {
            QueueCommands::Build {
                candidates,
                limit,
                ttl,
            } => queue::build(candidates, limit, ttl),
            QueueCommands::Show { json } => queue::show(json),
            QueueCommands::Claim { start, mode } => queue::claim(start, mode),
            QueueCommands::Insert {
                candidates,
                id,
                position,
            } => queue::insert(candidates, id, position),
            QueueCommands::Remove { rank } => queue::remove(rank),
            QueueCommands::Reorder { rank, position } => queue::reorder(rank, position),
        },
        Commands::Resolve { command } => match command {
            ResolveCommands::Add { ids } => resolve::add(ids),
            ResolveCommands::Remove { ids } => resolve::remove(ids),
            ResolveCommands::List => resolve::list(),
        },
        Commands::Signal { command } => match command {
            SignalCommands::Set {
                instance,
                name,
                value,
            } => signal::set(instance, name, value),
            SignalCommands::Show { instance } => signal::show(instance),
            SignalCommands::Clear { instance } => signal::clear(instance),
        },
        Commands::Archive { command } => match command {
            ArchiveCommands::List => archive::list(),
            ArchiveCommands::Verify => archive::verify(),
        },
        Commands::Completions { shell } => {
            completions::execute(&mut Cli::command(), shell);
            Ok(())
        }
    }
}
