use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand};
use helpdesk_core::{
    load_config, FollowupOutcome, HelpdeskConfig, LifecycleController, LoadOutcome, LoadState,
};
use helpdesk_schema::{NewTicket, Severity};
use helpdesk_service::{HttpTicketService, StubTicketService, TicketService};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod render;

use render::{render_history, render_thread};

#[derive(Parser)]
#[command(name = "helpdesk", version, about = "helpdesk ticket client")]
struct Cli {
    #[arg(long, default_value = "helpdesk.yaml", help = "Path to the YAML config file")]
    config: PathBuf,

    #[arg(long, help = "Use the in-process stub backend instead of HTTP")]
    stub: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate the config file")]
    Validate {
        #[arg(long, help = "Also check that the ticket backend answers")]
        ping: bool,
    },
    #[command(about = "List recent tickets")]
    List,
    #[command(about = "Create a ticket")]
    Create {
        #[arg(help = "Short subject line")]
        subject: String,
        #[arg(help = "Problem description")]
        description: String,
        #[arg(long, default_value = "medium", help = "low, medium or high")]
        severity: Severity,
        #[arg(long, help = "Submitter UPN")]
        submitter: Option<String>,
    },
    #[command(about = "Show a ticket thread")]
    Show {
        #[arg(help = "Ticket ID")]
        ticket_id: String,
    },
    #[command(about = "Send a follow-up message on a ticket")]
    Followup {
        #[arg(help = "Ticket ID")]
        ticket_id: String,
        #[arg(help = "Message text")]
        text: String,
    },
    #[command(about = "Close a ticket")]
    Close {
        #[arg(help = "Ticket ID")]
        ticket_id: String,
    },
    #[command(about = "Interactive ticket session")]
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    // The stub backend runs without a config file.
    let config = if cli.stub && !cli.config.exists() {
        None
    } else {
        Some(load_config(&cli.config)?)
    };

    let log_dir = config
        .as_ref()
        .map(|c| PathBuf::from(&c.logging.dir))
        .unwrap_or_else(|| PathBuf::from("logs"));
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "helpdesk.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let service = build_service(cli.stub, config.as_ref(), &cli.config)?;
    let controller = LifecycleController::new(service.clone());

    match command {
        Commands::Validate { ping } => {
            let config =
                config.ok_or_else(|| anyhow!("no config file at {}", cli.config.display()))?;
            println!(
                "Config OK. base_url={} timeout={}s history_limit={}",
                config.service.base_url, config.service.timeout_secs, config.service.history_limit
            );
            if ping {
                service.health().await?;
                println!("Backend OK.");
            }
        }
        Commands::List => {
            controller.refresh_history().await?;
            print!("{}", render_history(&controller.history().await));
        }
        Commands::Create {
            subject,
            description,
            severity,
            submitter,
        } => {
            let mut input = NewTicket::new(subject, description).with_severity(severity);
            if let Some(submitter) = submitter {
                input = input.with_submitter(submitter);
            }
            let thread = controller.create(&input).await?;
            print!("{}", render_thread(&thread));
        }
        Commands::Show { ticket_id } => {
            select_and_print(&controller, &ticket_id).await?;
        }
        Commands::Followup { ticket_id, text } => {
            controller.select(&ticket_id).await?;
            report_followup(controller.follow_up(&text).await?);
            print_active(&controller).await;
        }
        Commands::Close { ticket_id } => {
            controller.select(&ticket_id).await?;
            let closed = controller.close().await?;
            println!("Closed {closed}.");
        }
        Commands::Chat => run_repl(&controller).await?,
    }

    Ok(())
}

fn build_service(
    stub: bool,
    config: Option<&HelpdeskConfig>,
    config_path: &Path,
) -> Result<Arc<dyn TicketService>> {
    if stub {
        tracing::info!("using stub ticket backend");
        return Ok(Arc::new(StubTicketService::new()));
    }
    let config = config.ok_or_else(|| anyhow!("no config file at {}", config_path.display()))?;
    tracing::debug!(base_url = %config.service.base_url, "using http ticket backend");
    Ok(Arc::new(HttpTicketService::from_config(&config.service)))
}

async fn select_and_print(controller: &LifecycleController, ticket_id: &str) -> Result<()> {
    match controller.select(ticket_id).await? {
        LoadOutcome::Loaded => print_active(controller).await,
        LoadOutcome::Discarded => println!("(selection changed, response for {ticket_id} ignored)"),
    }
    Ok(())
}

async fn print_active(controller: &LifecycleController) {
    match controller.store().load_state().await {
        LoadState::Loaded(thread) => print!("{}", render_thread(&thread)),
        LoadState::Failed { ticket_id, error } => eprintln!("Ticket {ticket_id} failed: {error}"),
        LoadState::Loading { ticket_id } => println!("Loading {ticket_id}..."),
        LoadState::Idle => println!("No ticket selected. Use /select <id> or /new."),
    }
}

fn report_followup(outcome: FollowupOutcome) {
    match outcome {
        FollowupOutcome::Ignored => println!("(empty message, nothing sent)"),
        FollowupOutcome::Applied { appended } => println!("({appended} new message(s))"),
        FollowupOutcome::Discarded => println!("(reply arrived for another ticket, ignored)"),
    }
}

/// `/new <subject> | <description>`
fn parse_new_ticket(args: &str) -> Option<NewTicket> {
    let (subject, description) = args.split_once('|')?;
    let subject = subject.trim();
    if subject.is_empty() {
        return None;
    }
    Some(NewTicket::new(subject, description.trim()))
}

async fn run_repl(controller: &LifecycleController) -> Result<()> {
    if let Err(err) = controller.refresh_history().await {
        eprintln!("Error: could not load history: {err}");
    }

    println!("helpdesk chat. Commands: /list, /select <id>, /new <subject> | <description>, /close. Type 'quit' to exit.");
    println!("---");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input == "quit" || input == "exit" {
            break;
        }
        if input.is_empty() {
            continue;
        }

        let (command, args) = input.split_once(' ').unwrap_or((input, ""));
        let result: Result<()> = match command {
            "/list" => {
                print!("{}", render_history(&controller.history().await));
                Ok(())
            }
            "/select" if !args.trim().is_empty() => {
                select_and_print(controller, args.trim()).await
            }
            "/new" => match parse_new_ticket(args) {
                Some(input) => controller
                    .create(&input)
                    .await
                    .map(|thread| print!("{}", render_thread(&thread)))
                    .map_err(Into::into),
                None => {
                    println!("usage: /new <subject> | <description>");
                    Ok(())
                }
            },
            "/close" => controller
                .close()
                .await
                .map(|id| println!("Closed {id}."))
                .map_err(Into::into),
            _ if command.starts_with('/') => {
                println!("unknown command: {command}");
                Ok(())
            }
            _ => match controller.follow_up(input).await {
                Ok(outcome) => {
                    report_followup(outcome);
                    print_active(controller).await;
                    Ok(())
                }
                Err(err) => Err(err.into()),
            },
        };

        if let Err(err) = result {
            eprintln!("Error: {err}");
        }
    }

    Ok(())
}
