//! scholardash: load, inspect and edit dashboard pages from the terminal.
//!
//! Usage:
//!   scholardash <page> show                          - Display model as JSON
//!   scholardash <page> state                         - Resolved page state and provenance
//!   scholardash <page> edit <section> <json> [--manual] - Replace a section and commit
//!   scholardash <page> auto <section>                - Hand a section back to derivation
//!   scholardash ingest <file> [--linkedin=..] [--scholar=..] [--x=..]
//!   scholardash token [clear]
//!
//! Pages: compliance, grants, profile, projects, publications.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use serde_json::{json, Value};

use scholardash::config::Config;
use scholardash::ingest::IngestLinks;
use scholardash::logging::{log, obj, v_str, Domain, Level};
use scholardash::pages::{
    CompliancePage, GrantsPage, Page, PageKind, ProfilePage, ProjectsPage, PublicationsPage,
};
use scholardash::session::{Context, Session};
use scholardash::store::CommitOutcome;

fn usage() -> ! {
    eprintln!("usage: scholardash <page> show|state|edit <section> <json> [--manual]|auto <section>");
    eprintln!("       scholardash ingest <file> [--linkedin=URL] [--scholar=URL] [--x=URL]");
    eprintln!("       scholardash token [clear]");
    std::process::exit(2);
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("--{}=", name);
    args.iter().find_map(|a| a.strip_prefix(&prefix).map(str::to_string))
}

fn print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_page<P: Page>(ctx: &Context, page: P, args: &[String]) -> Result<()> {
    let command = args.first().map(String::as_str).unwrap_or("show");
    let mut session = Session::load(ctx, page).await?;

    match command {
        "show" => print(&serde_json::to_value(session.display())?),
        "state" => print(&json!({
            "state": session.state().to_value(),
            "provenance": session.provenance(),
            "manual": session.state().overrides.manual_sections().collect::<Vec<_>>(),
        })),
        "edit" => {
            let (Some(section), Some(raw)) = (args.get(1), args.get(2)) else { usage() };
            let value: Value = serde_json::from_str(raw).with_context(|| format!("parse value for {}", section))?;
            let manual = args.iter().any(|a| a == "--manual");
            session.apply_edit(section, value, manual)?;
            report(session.commit().await)?;
            print(&session.state().to_value())
        }
        "auto" => {
            let Some(section) = args.get(1) else { usage() };
            session.set_manual(section, false)?;
            report(session.commit().await)?;
            print(&session.state().to_value())
        }
        _ => usage(),
    }
}

/// Write-back failures are reported but do not fail the command.
fn report(outcome: CommitOutcome) -> Result<()> {
    match outcome {
        CommitOutcome::Persisted { state_hash } => {
            eprintln!("saved ({})", &state_hash[..state_hash.len().min(12)]);
        }
        CommitOutcome::Failed { state_hash, error } => {
            eprintln!("kept locally, write-back failed: {}", error);
            log(
                Level::Warn,
                Domain::System,
                "edit_not_persisted",
                obj(&[("state_hash", v_str(&state_hash))]),
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(head) = args.first() else { usage() };
    let cfg = Config::from_env();
    let ctx = Context::from_config(cfg)?;
    let rest = &args[1..];

    match head.as_str() {
        "ingest" => {
            let Some(file) = rest.first() else { usage() };
            let links = IngestLinks {
                linkedin_url: flag_value(rest, "linkedin"),
                scholar_url: flag_value(rest, "scholar"),
                x_url: flag_value(rest, "x"),
            };
            let receipt = ctx.ingest(&PathBuf::from(file), &links).await?;
            print(&json!({"cv_id": receipt.cv_id}))
        }
        "token" => match rest.first().map(String::as_str) {
            None => print(&json!({"cv_id": ctx.ingest_token()?})),
            Some("clear") => {
                ctx.clear_ingest_token()?;
                print(&json!({"cv_id": null}))
            }
            Some(other) => bail!("unknown token command {}", other),
        },
        name => {
            let Some(kind) = PageKind::parse(name) else { usage() };
            let limits = ctx.config.limits();
            match kind {
                PageKind::Compliance => run_page(&ctx, CompliancePage, rest).await,
                PageKind::Grants => run_page(&ctx, GrantsPage::new(limits), rest).await,
                PageKind::Profile => run_page(&ctx, ProfilePage, rest).await,
                PageKind::Projects => run_page(&ctx, ProjectsPage, rest).await,
                PageKind::Publications => run_page(&ctx, PublicationsPage::new(limits), rest).await,
            }
        }
    }
}
