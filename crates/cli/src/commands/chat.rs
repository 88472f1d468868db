//! `moonagent chat`: interactive session.
//!
//! Every line is one run. When the agent suspends before a tool call, the
//! call is shown for review: run it as is, edit its arguments, or skip it.

use std::io::Write;
use std::sync::Arc;

use moonagent_agent::{AgentError, ExecutionContext, Manus, MemoryState};
use moonagent_core::AgentState;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

type Input = Lines<BufReader<Stdin>>;

/// Answer to the tool review prompt.
#[derive(Debug, PartialEq, Eq)]
enum Choice {
    Approve,
    Edit,
    Reject,
}

fn parse_choice(answer: &str) -> Option<Choice> {
    match answer.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => Some(Choice::Approve),
        "e" | "edit" => Some(Choice::Edit),
        "n" | "no" => Some(Choice::Reject),
        _ => None,
    }
}

fn prompt(text: &str) -> anyhow::Result<()> {
    print!("{text}");
    std::io::stdout().flush()?;
    Ok(())
}

pub async fn run(offline: bool) -> anyhow::Result<()> {
    let (config, manus) = super::build_manus(offline)?;
    let memory = Arc::new(MemoryState::new(config.memory.capacity));
    let tools: Vec<String> = manus.tools().into_iter().map(|t| t.name).collect();

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         MoonAgent: Interactive Mode          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Agent:       {}", manus.name());
    println!("  Model:       {}", if offline { "scripted (offline)" } else { config.model.model.as_str() });
    println!("  Tools:       {}", tools.join(", "));
    println!(
        "  Review:      {}",
        if config.checkpoint.interrupt_before_tools { "tool calls are held for confirmation" } else { "off" }
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Commands: /reset, /debug, /history, exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut turn = 0u32;

    loop {
        prompt("  You > ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                manus.reset();
                memory.clear();
                println!("  Conversation reset.");
                continue;
            }
            "/debug" => {
                manus.set_debug_mode(!manus.is_debug());
                println!("  Debug mode {}.", if manus.is_debug() { "on" } else { "off" });
                continue;
            }
            "/history" => {
                println!("  {}", memory.summary());
                continue;
            }
            _ => {}
        }

        if manus.state() != AgentState::Idle {
            manus.reset();
        }
        turn += 1;
        let checkpoint_id = format!("chat-{}-{turn}", std::process::id());
        if let Err(e) = drive_turn(&manus, &memory, &mut lines, input, &checkpoint_id).await {
            eprintln!("  [Error] {e}");
        }
        if let Some(info) = manus.debug_info() {
            println!("  {}", serde_json::to_string(&info)?);
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn turn_context(memory: &Arc<MemoryState>, checkpoint_id: &str) -> ExecutionContext {
    ExecutionContext::with_memory(CancellationToken::new(), Arc::clone(memory))
        .with_checkpoint_id(checkpoint_id)
}

/// Run one turn, reviewing every held-back tool call until the run ends.
async fn drive_turn(
    manus: &Manus,
    memory: &Arc<MemoryState>,
    lines: &mut Input,
    input: &str,
    checkpoint_id: &str,
) -> anyhow::Result<()> {
    let mut outcome = manus.run(&turn_context(memory, checkpoint_id), input).await;
    loop {
        match outcome {
            Ok(message) => {
                println!();
                for line in message.content.lines() {
                    println!("  Assistant > {line}");
                }
                return Ok(());
            }
            Err(AgentError::Interrupted(interrupt)) => {
                super::print_pending(&interrupt.checkpoint_id, &interrupt.pending);
                if !review(manus, lines, &interrupt.checkpoint_id).await? {
                    println!("  Tool call skipped.");
                    return Ok(());
                }
                outcome = manus.run(&turn_context(memory, &interrupt.checkpoint_id), input).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Ask whether to run the pending call. Returns `false` if it was rejected.
async fn review(manus: &Manus, lines: &mut Input, checkpoint_id: &str) -> anyhow::Result<bool> {
    loop {
        prompt("  Run this tool? [y]es / [e]dit arguments / [n]o > ")?;
        let Some(answer) = lines.next_line().await? else {
            return Ok(false);
        };
        match parse_choice(&answer) {
            Some(Choice::Approve) => return Ok(true),
            Some(Choice::Reject) => return Ok(false),
            Some(Choice::Edit) => {
                prompt("  New JSON arguments > ")?;
                let Some(arguments) = lines.next_line().await? else {
                    return Ok(false);
                };
                match manus.amend_pending_arguments(checkpoint_id, arguments.trim()).await {
                    Ok(pending) => {
                        println!("  Arguments now: {}", pending.tool_call.function.arguments);
                        return Ok(true);
                    }
                    Err(e) => eprintln!("  {e}"),
                }
            }
            None => eprintln!("  Please answer y, e or n."),
        }
    }
}
