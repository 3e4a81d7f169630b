use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pixelvault::chunker::FragmentCount;
use pixelvault::config::Config;
use pixelvault::confirm::{Confirm, Preapproved};
use pixelvault::container::DeleteOutcome;
use pixelvault::diagnostics::{DiagnosticEntry, DiagnosticLog, Diagnostics};
use pixelvault::source::InputSource;
use pixelvault::transport::{ContainerId, ContainerInfo, LocalTransport};
use pixelvault::vault::{Vault, VaultOptions};
use pixelvault::VaultError;

/// Literal second argument to `delete` that skips the confirmation prompt.
const FORCE_DELETE: &str = "force-delete";

#[derive(Parser)]
#[command(
    name = "pixelvault",
    version,
    about = "Store arbitrary files as a series of lossless images",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file or an http/https URL
    Upload {
        /// File path or URL
        source: String,
        /// Container name (defaults to the source as given)
        name:   Option<String>,
    },
    /// List stored containers and their IDs
    List,
    /// Rename the container with the given ID
    Rename {
        container: String,
        name:      String,
    },
    /// Reassemble a container into a local file
    Download {
        container: String,
        output:    PathBuf,
    },
    /// Delete a container; pass `force-delete` to skip the prompt
    Delete {
        container: String,
        force:     Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_or_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let mut log = match DiagnosticLog::create(&config.logging.diagnostic_log, env!("CARGO_PKG_VERSION")) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Error: cannot open {}: {e}", config.logging.diagnostic_log.display());
            return ExitCode::FAILURE;
        }
    };

    let code = match run(cli.command, &config, &mut log) {
        Ok(code) => code,
        Err(e) => {
            log.record(DiagnosticEntry::new("Unexpected failure").error(format!("{e:#}")));
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    };

    if let Err(e) = log.finish() {
        tracing::warn!(error = %e, "could not finish diagnostic log");
    }
    code
}

fn run<D: Diagnostics>(command: Commands, config: &Config, log: D) -> anyhow::Result<ExitCode> {
    let store = LocalTransport::open(&config.store.root)
        .with_context(|| format!("opening store at {}", config.store.root.display()))?;
    let options = VaultOptions::from_config(config)?;
    let mut vault = Vault::new(store, log, options);
    let report_hint = format!("Details were written to \"{}\".", config.logging.diagnostic_log.display());

    match command {

        // ── Upload ───────────────────────────────────────────────────────────
        Commands::Upload { source, name } => {
            let input = InputSource::open(&source)?;
            let name = container_name(&source, name);
            let count = FragmentCount::for_size(input.size, vault.options().geometry.max_fragment_bytes);
            println!("Upload started. Upload will be composed of {count} fragments.");

            let report = vault.upload(&name, input.reader, input.size)?;
            if !report.resolution.is_clean() {
                println!("Resolved duplicate fragments: {}.", report.resolution.summary());
            }
            if report.verdict.is_corrupt() {
                println!("Warning: the upload appears to be corrupted ({:?}). {report_hint}", report.verdict);
            }
            println!("Upload complete!");
            println!("To download, use the following container ID: {}", report.container);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List => {
            print!("{}", list_output(&vault.list()?));
        }

        // ── Rename ───────────────────────────────────────────────────────────
        Commands::Rename { container, name } => {
            match vault.rename(&ContainerId(container), &name) {
                Ok(()) => println!("Container rename complete."),
                Err(_) => {
                    println!("An error occurred. {report_hint}");
                    println!("Container rename failed.");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }

        // ── Download ─────────────────────────────────────────────────────────
        Commands::Download { container, output } => {
            let id = ContainerId(container);
            let file = File::create(&output).with_context(|| format!("creating {}", output.display()))?;
            let mut out = BufWriter::new(file);
            match vault.download(&id, &mut out) {
                Ok(report) => {
                    out.flush()?;
                    if report.unverified > 0 {
                        println!("{} fragment(s) had no stored checksum and were not verified.", report.unverified);
                    }
                    println!("Download complete! {} bytes written to {}", report.bytes_written, output.display());
                }
                Err(VaultError::Corruption { sequence, .. }) => {
                    out.flush()?;
                    println!(
                        "Error: fragment {sequence} of container {id} is corrupted and the download cannot complete. {report_hint}"
                    );
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) if e.is_not_found() => {
                    println!("{}", missing_container(&id));
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // ── Delete ───────────────────────────────────────────────────────────
        Commands::Delete { container, force } => {
            let id = ContainerId(container);
            let mut confirm: Box<dyn Confirm> = if force.as_deref() == Some(FORCE_DELETE) {
                Box::new(Preapproved)
            } else {
                Box::new(console_confirm)
            };
            match vault.delete(&id, &mut *confirm) {
                Ok(outcome) => {
                    println!("{}", delete_message(&id, outcome));
                    if outcome == DeleteOutcome::NotFound {
                        return Ok(ExitCode::FAILURE);
                    }
                }
                Err(VaultError::OperationFailed { .. }) => {
                    println!("Deletion failed. {report_hint}");
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn console_confirm(prompt: &str) -> bool {
    println!("{prompt}");
    print!("Type \"yes\" (without quotes) to confirm. Any other value aborts. - ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    io::stdin().read_line(&mut answer).is_ok() && answer.trim_end_matches(['\r', '\n']) == "yes"
}

/// An upload without an explicit name is called exactly what was typed.
fn container_name(source: &str, name: Option<String>) -> String {
    name.unwrap_or_else(|| source.to_string())
}

fn missing_container(id: &ContainerId) -> String {
    format!("Container with ID {id} does not exist.")
}

fn delete_message(id: &ContainerId, outcome: DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::Deleted  => "Container deletion complete.".to_string(),
        DeleteOutcome::Declined => "Container deletion aborted.".to_string(),
        DeleteOutcome::NotFound => missing_container(id),
    }
}

/// What `list` prints: a notice for an empty store, otherwise the table.
fn list_output(containers: &[ContainerInfo]) -> String {
    if containers.is_empty() {
        "No uploads found\n".to_string()
    } else {
        render_table(containers)
    }
}

/// psql-style two-column table.
fn render_table(containers: &[ContainerInfo]) -> String {
    const HEADERS: [&str; 2] = ["Name", "Container ID"];
    let name_width = containers.iter().map(|c| c.name.chars().count()).chain([HEADERS[0].len()]).max().unwrap_or(0);
    let id_width = containers.iter().map(|c| c.id.0.chars().count()).chain([HEADERS[1].len()]).max().unwrap_or(0);

    let rule = |corner: char| format!("{corner}{}{corner}{}{corner}\n", "-".repeat(name_width + 2), "-".repeat(id_width + 2));
    let row = |a: &str, b: &str| format!("| {a:<name_width$} | {b:<id_width$} |\n");

    let mut table = rule('+');
    table.push_str(&row(HEADERS[0], HEADERS[1]));
    table.push_str(&format!("|{}+{}|\n", "-".repeat(name_width + 2), "-".repeat(id_width + 2)));
    for c in containers {
        table.push_str(&row(&c.name, &c.id.0));
    }
    table.push_str(&rule('+'));
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, id: &str) -> ContainerInfo {
        ContainerInfo { id: ContainerId(id.to_string()), name: name.to_string() }
    }

    #[test]
    fn empty_store_lists_a_notice_not_a_table() {
        let out = list_output(&[]);
        assert_eq!(out, "No uploads found\n");
        assert!(!out.contains('|'));
    }

    #[test]
    fn list_renders_a_padded_table() {
        let out = list_output(&[info("backup.tar", "c1"), info("a", "0123456789abcdef")]);
        let expected = "\
+------------+------------------+
| Name       | Container ID     |
|------------+------------------|
| backup.tar | c1               |
| a          | 0123456789abcdef |
+------------+------------------+
";
        assert_eq!(out, expected);
    }

    #[test]
    fn short_entries_keep_header_widths() {
        let out = render_table(&[info("x", "y")]);
        assert_eq!(out.lines().nth(1), Some("| Name | Container ID |"));
        assert_eq!(out.lines().count(), 5);
    }

    #[test]
    fn deleting_a_missing_container_says_it_does_not_exist() {
        let id = ContainerId("nope-123".into());
        assert_eq!(delete_message(&id, DeleteOutcome::NotFound), "Container with ID nope-123 does not exist.");
        assert_eq!(delete_message(&id, DeleteOutcome::Deleted), "Container deletion complete.");
        assert_eq!(delete_message(&id, DeleteOutcome::Declined), "Container deletion aborted.");
    }

    #[test]
    fn upload_name_defaults_to_the_source_as_given() {
        let cli = Cli::try_parse_from(["pixelvault", "upload", "https://example.com/a.iso?x=1"]).unwrap();
        let Commands::Upload { source, name } = cli.command else { panic!("expected upload") };
        assert_eq!(container_name(&source, name), "https://example.com/a.iso?x=1");
        assert_eq!(container_name("/srv/data/backup.tar", None), "/srv/data/backup.tar");
        assert_eq!(container_name("/srv/data/backup.tar", Some("custom".into())), "custom");
    }
}
