// UI layer: uploads the documents directory with a progress bar, then runs
// the question/answer loop using `dialoguer`.

use crate::api::FileSearchApi;
use crate::config::Config;
use crate::documents::discover_documents;
use crate::models::{FileSearchStore, RemoteFile};
use crate::rag::{Grounding, QueryAnswer, RagSession};
use anyhow::{Context, Result};
use crossterm::style::Stylize;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::time::Duration;
use tracing::error;

const EXIT_WORDS: &[&str] = &["quit", "exit", "q"];

/// True when `input` is one of the words that end the question loop.
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim().to_lowercase();
    EXIT_WORDS.contains(&input.as_str())
}

/// Numbered source list, one title per line.
pub fn render_sources(sources: &[String]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Interactive flow: create the store, upload the documents directory and
/// answer questions until the user exits. Returns `Ok(false)` when there
/// was nothing to upload.
pub fn run_chat<A: FileSearchApi>(session: &mut RagSession<A>, config: &Config) -> Result<bool> {
    session
        .create_store(&config.store_name)
        .context("Failed to create file search store")?;

    let files = discover_documents(&config.documents, &config.extensions)
        .with_context(|| format!("Failed to read {}", config.documents.display()))?;
    let Some(files) = files else {
        println!("\nNo '{}' directory found.", config.documents.display());
        println!("Please create it and add your files there.");
        println!("Supported formats: {}", config.extensions.join(", "));
        return Ok(false);
    };
    if files.is_empty() {
        println!("No supported files found in {}", config.documents.display());
        return Ok(false);
    }

    println!("\nFound {} documents. Uploading files...", files.len());
    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")?);
    let results = session.upload_multiple_files_with(&files, |path, uploaded| {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        match uploaded {
            Some(_) => bar.println(format!("{} {}", "imported".green(), name)),
            None => bar.println(format!("{} {}", "failed".red(), name)),
        }
        bar.inc(1);
    });
    bar.finish_and_clear();

    let failed = results.iter().filter(|(_, r)| r.is_none()).count();
    if failed > 0 {
        println!("{} of {} files failed to upload", failed, results.len());
    }

    question_loop(session)?;
    Ok(true)
}

fn question_loop<A: FileSearchApi>(session: &RagSession<A>) -> Result<()> {
    let rule = "=".repeat(50);
    println!("\n{rule}");
    println!("{}", "RAG System Ready!".bold());
    println!("{rule}");
    println!("Type your questions (or 'quit' to exit):\n");

    loop {
        let input = match Input::<String>::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()
        {
            Ok(s) => s,
            // Ctrl-C at the prompt
            Err(e) if e.kind() == io::ErrorKind::Interrupted => break,
            Err(e) => return Err(e).context("Failed to read question"),
        };
        let question = input.trim();
        if is_exit_command(question) {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
        spinner.set_message("Searching documents...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        let outcome = session.query(question);
        spinner.finish_and_clear();

        match outcome {
            Ok(answer) => print_answer(&answer),
            Err(e) => error!(error = %e, "query failed"),
        }
    }

    println!("\nGoodbye!");
    Ok(())
}

pub fn print_answer(answer: &QueryAnswer) {
    println!("\nQuery: {}", answer.question);
    println!("{}", "-".repeat(50));
    println!(
        "\n{}\n{}\n",
        "Answer:".bold().green(),
        answer.text.as_deref().unwrap_or("(no answer text)")
    );
    match &answer.grounding {
        Grounding::NoCandidates => println!("No candidate responses found"),
        Grounding::NoSources => println!("No grounding sources found"),
        Grounding::Sources(sources) if sources.is_empty() => {}
        Grounding::Sources(sources) => {
            println!("{}", "Sources:".bold());
            println!("{}", render_sources(sources));
        }
    }
}

pub fn print_stores(stores: &[FileSearchStore]) {
    if stores.is_empty() {
        println!("No file search stores found");
        return;
    }
    for store in stores {
        println!(
            "{}  {}  active={} pending={} failed={}",
            store.name,
            store.display_name.as_deref().unwrap_or("-"),
            store.active_documents_count.as_deref().unwrap_or("0"),
            store.pending_documents_count.as_deref().unwrap_or("0"),
            store.failed_documents_count.as_deref().unwrap_or("0"),
        );
    }
}

pub fn print_files(files: &[RemoteFile]) {
    if files.is_empty() {
        println!("No uploaded files found");
        return;
    }
    for file in files {
        println!(
            "{}  {}  {}",
            file.name,
            file.label(),
            file.state.as_deref().unwrap_or("-")
        );
    }
}
