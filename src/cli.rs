use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser};
use dialoguer::Confirm;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use flowboard::graph::{NodeKind, NodePatch};
use flowboard::layout::auto_align;
use flowboard::snapshot::Snapshot;
use flowboard::sync::{HttpSyncProvider, SyncProvider};
#[cfg(feature = "server")]
use flowboard::serve::{ServeArgs, run_serve};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "flowboard",
    about = "Inspect and maintain flowboard node-graph snapshots."
)]
pub struct BoardArgs {
    /// Path to the board snapshot file. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Recompute node positions with the layered auto-layout before writing.
    #[arg(long = "align", action = ArgAction::SetTrue)]
    align: bool,

    /// Launch the interactive editing server instead of a one-shot pass.
    #[arg(
        long = "edit",
        action = ArgAction::SetTrue,
        conflicts_with_all = ["output", "pull"],
        requires = "input"
    )]
    edit: bool,

    /// Override the host binding when using --edit.
    #[arg(long = "serve-host", requires = "edit")]
    serve_host: Option<String>,

    /// Override the port binding when using --edit.
    #[arg(long = "serve-port", requires = "edit")]
    serve_port: Option<u16>,

    /// Replace the local board with the one stored at this sync endpoint.
    #[arg(long = "pull", conflicts_with = "edit")]
    pull: Option<String>,

    /// Overwrite without asking for confirmation.
    #[arg(short = 'y', long = "yes", action = ArgAction::SetTrue)]
    assume_yes: bool,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            #[cfg(feature = "server")]
            {
                let serve_args = ServeArgs::parse_from(
                    std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
                );
                run_serve(serve_args).await
            }
            #[cfg(not(feature = "server"))]
            {
                Err(anyhow!(
                    "'serve' command requires the 'server' feature to be enabled"
                ))
            }
        }
        _ => {
            let board_args = BoardArgs::parse_from(args);
            run_board(board_args).await
        }
    }
}

#[cfg(not(feature = "server"))]
pub fn dispatch_sync() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let board_args = BoardArgs::parse_from(args);
    if board_args.edit {
        bail!("--edit requires the 'server' feature to be enabled");
    }
    if board_args.pull.is_some() {
        bail!("--pull requires a network runtime; enable the 'server' feature");
    }
    run_inspect(board_args)
}

async fn run_board(cli: BoardArgs) -> Result<()> {
    if cli.edit {
        #[cfg(feature = "server")]
        {
            return run_edit(cli).await;
        }
        #[cfg(not(feature = "server"))]
        {
            bail!("--edit requires the 'server' feature to be enabled");
        }
    }

    if cli.pull.is_some() {
        return run_pull(cli).await;
    }

    run_inspect(cli)
}

#[cfg(feature = "server")]
async fn run_edit(cli: BoardArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref(), true)?;
    let input_path = match input_source {
        InputSource::File(path) => path,
        InputSource::Stdin => bail!("--edit requires a concrete file input"),
    };

    let host = cli
        .serve_host
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = cli.serve_port.unwrap_or(5171);

    let serve_args = ServeArgs {
        input: input_path.clone(),
        host: host.clone(),
        port,
    };

    if !cli.quiet {
        println!("Launching editor for {}", input_path.display());
        println!("API available at http://{host}:{port}/api/board");
    }

    run_serve(serve_args).await
}

async fn run_pull(cli: BoardArgs) -> Result<()> {
    let endpoint = cli
        .pull
        .clone()
        .ok_or_else(|| anyhow!("--pull requires an endpoint"))?;

    let target = match parse_input(cli.input.as_deref(), false)? {
        InputSource::File(path) => path,
        InputSource::Stdin => bail!("--pull requires a file target, not stdin"),
    };

    if target.exists() && !cli.assume_yes {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Overwrite '{}' with the board from {endpoint}?",
                target.display()
            ))
            .default(false)
            .interact()
            .context("confirmation prompt was cancelled")?;
        if !proceed {
            bail!("pull aborted");
        }
    }

    let provider = HttpSyncProvider::new(endpoint.clone(), flowboard::HttpMethod::Get);
    let snapshot = provider
        .load()
        .await
        .with_context(|| format!("failed to pull board from {endpoint}"))?;

    snapshot
        .save(&target)
        .with_context(|| format!("failed to write '{}'", target.display()))?;

    if !cli.quiet {
        println!("Pulled board -> {}", target.display());
    }

    Ok(())
}

fn run_inspect(cli: BoardArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref(), true)?;
    let raw = load_board(&input_source)?;
    let snapshot = Snapshot::parse(&raw)
        .map_err(|err| anyhow!("invalid board snapshot: {err}"))?;

    let viewport = snapshot.viewport;
    let scope = snapshot.current_scope_id;
    let mut graph = snapshot.into_graph();

    if cli.align {
        let everyone: HashSet<_> = graph.order.iter().copied().collect();
        let moves = auto_align(&graph, &everyone);
        for (id, position) in moves {
            graph.update_node(
                id,
                NodePatch {
                    position: Some(position),
                    ..NodePatch::default()
                },
            );
        }
    }

    if !cli.quiet {
        print_summary(&graph);
    }

    if cli.output.is_some() || cli.align {
        let rewritten = Snapshot::capture(&graph, viewport, scope);
        let dest = parse_output(cli.output.as_deref(), &input_source)?;
        write_board(dest, &rewritten, cli.quiet)?;
    }

    Ok(())
}

fn print_summary(graph: &flowboard::Graph) {
    let mut by_kind = [0usize; 5];
    for node in graph.nodes.values() {
        let slot = match node.kind() {
            NodeKind::Task => 0,
            NodeKind::Oscillator => 1,
            NodeKind::Timer => 2,
            NodeKind::Display => 3,
            NodeKind::Api => 4,
        };
        by_kind[slot] += 1;
    }
    println!(
        "{} nodes ({} task, {} oscillator, {} timer, {} display, {} api), {} edges",
        graph.nodes.len(),
        by_kind[0],
        by_kind[1],
        by_kind[2],
        by_kind[3],
        by_kind[4],
        graph.edges.len()
    );
}

fn parse_input(input: Option<&str>, must_exist: bool) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if must_exist && !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(output: Option<&str>, input: &InputSource) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        // --align without --output rewrites the input in place.
        None => match input {
            InputSource::File(path) => Ok(OutputDestination::File(path.clone())),
            InputSource::Stdin => Ok(OutputDestination::Stdout),
        },
    }
}

fn load_board(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no board snapshot supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

fn write_board(dest: OutputDestination, snapshot: &Snapshot, quiet: bool) -> Result<()> {
    let json = snapshot
        .to_json()
        .map_err(|err| anyhow!("failed to serialize board: {err}"))?;
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, json)?;
            if !quiet {
                println!("Wrote board -> {}", path.display());
            }
        }
    }
    Ok(())
}
