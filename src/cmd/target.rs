//! Target registry commands: `ale-forge target ...`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use ale_forge::target::{TargetDraft, TargetSystem, TargetRegistry};
use ale_forge::ui::icons::{CHECK, CROSS, LOCK, SHIELD, TARGET, WARN};

use super::super::TargetCommands;
use super::{load_config, open_registry};

pub fn cmd_target(data_dir: &Path, command: &TargetCommands) -> Result<()> {
    let config = load_config(data_dir)?;
    let registry = open_registry(&config)?;

    match command {
        TargetCommands::Register {
            name,
            host,
            port,
            os,
            authorized,
            authorization_document,
            authorized_by,
            scope,
            out_of_scope,
            notes,
        } => {
            let draft = TargetDraft {
                name: name.clone(),
                host: host.clone(),
                port: *port,
                os: *os,
                authorized: *authorized,
                authorization_document: authorization_document.clone(),
                authorization_date: None,
                authorized_by: authorized_by.clone(),
                scope: scope.clone(),
                out_of_scope: out_of_scope.clone(),
                notes: notes.clone(),
            };
            let target = registry.register_target(draft)?;
            println!("{}Registered target {}", CHECK, style(&target.id).bold());
            print_target(&target);
        }
        TargetCommands::List => cmd_list(&registry),
        TargetCommands::Show { id } => {
            let target = registry
                .get_target(id)
                .with_context(|| format!("Target {} not found", id))?;
            println!("{}", serde_json::to_string_pretty(&target)?);
        }
        TargetCommands::Validate { host } => cmd_validate(&registry, host)?,
        TargetCommands::Authorize { id, document, by } => {
            let target = registry.update_authorization(id, document, by)?;
            println!("{}Authorized {} ({})", SHIELD, target.id, target.host);
        }
        TargetCommands::Revoke { id, reason } => {
            let target = registry.revoke_authorization(id, reason)?;
            println!("{}Revoked authorization for {} ({})", LOCK, target.id, target.host);
        }
        TargetCommands::Delete { id } => {
            let target = registry.delete_target(id)?;
            println!("Deleted {} ({})", target.id, target.host);
        }
        TargetCommands::Export { file } => {
            let json = registry.export_targets()?;
            match file {
                Some(path) => {
                    std::fs::write(path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported targets to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        TargetCommands::Import { file } => {
            let json = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let count = registry.import_targets(&json)?;
            println!("{}Imported {} target(s)", CHECK, count);
        }
        TargetCommands::Template { host, name } => {
            println!("{}", registry.authorization_template(host, name));
        }
        TargetCommands::SelfIds => {
            println!();
            println!("Self identifiers (never valid targets):");
            for id in registry.self_identifiers() {
                println!("  {}", id);
            }
            println!();
        }
    }

    Ok(())
}

fn print_target(target: &TargetSystem) {
    println!("  Name:     {}", target.name);
    match target.port {
        Some(port) => println!("  Host:     {}:{}", target.host, port),
        None => println!("  Host:     {}", target.host),
    }
    println!("  OS:       {}", target.os);
    if let Some(doc) = &target.authorization_document {
        println!("  Document: {}", doc);
    }
    if !target.scope.is_empty() {
        println!("  Scope:    {}", target.scope.join(", "));
    }
}

fn cmd_list(registry: &TargetRegistry) {
    let targets = registry.list_targets();
    if targets.is_empty() {
        println!();
        println!("No targets registered. Use 'ale-forge target register' to add one.");
        println!();
        return;
    }

    println!();
    println!(
        "{:<44} {:<20} {:<22} {:<8} Authorized",
        "ID", "Name", "Host", "OS"
    );
    println!(
        "{:<44} {:<20} {:<22} {:<8} ----------",
        "-".repeat(44),
        "-".repeat(20),
        "-".repeat(22),
        "--------"
    );
    for target in &targets {
        let authorized = if target.authorized {
            style("yes").green()
        } else {
            style("no").red()
        };
        println!(
            "{:<44} {:<20} {:<22} {:<8} {}",
            target.id, target.name, target.host, target.os, authorized
        );
    }
    println!();
    println!("{}{} target(s)", TARGET, targets.len());
}

fn cmd_validate(registry: &TargetRegistry, host: &str) -> Result<()> {
    let result = registry.validate_target(host);

    println!();
    println!("Validation for {}", style(host).bold());
    println!("  valid:       {}", result.is_valid);
    println!("  self-target: {}", result.is_self_target);
    println!("  authorized:  {}", result.is_authorized);
    for error in &result.errors {
        println!("  {}{}", CROSS, error);
    }
    for warning in &result.warnings {
        println!("  {}{}", WARN, style(warning).yellow());
    }
    println!();

    if result.is_self_target {
        anyhow::bail!("SECURITY ERROR: {} identifies this system", host);
    }
    if !result.is_valid {
        anyhow::bail!(
            "TARGET VALIDATION FAILED for {}: {}",
            host,
            result.errors.join(", ")
        );
    }
    Ok(())
}
