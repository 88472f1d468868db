//! `moonagent run`: run one task, or resume a suspended one.

use moonagent_agent::AgentError;

pub async fn run(
    message: Option<String>,
    resume: Option<String>,
    args: Option<String>,
    offline: bool,
) -> anyhow::Result<()> {
    let (config, manus) = super::build_manus(offline)?;

    let ctx = match &resume {
        Some(id) => {
            if manus.pending_action(id).await?.is_none() {
                anyhow::bail!("No suspended run under checkpoint {id}");
            }
            if let Some(args) = args {
                let pending = manus.amend_pending_arguments(id, args).await?;
                eprintln!(
                    "  Updated arguments for {}: {}",
                    pending.tool_call.function.name, pending.tool_call.function.arguments
                );
            }
            manus.context().with_checkpoint_id(id.clone())
        }
        None => manus.context(),
    };

    // Ctrl+C cancels the run
    let token = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    eprint!("  Thinking...");
    let outcome = manus.run(&ctx, message.as_deref().unwrap_or_default()).await;
    eprint!("\r              \r");

    match outcome {
        Ok(message) => println!("{}", message.content),
        Err(AgentError::Interrupted(interrupt)) => {
            super::print_pending(&interrupt.checkpoint_id, &interrupt.pending);
            super::print_resume_hint(&config, &interrupt.checkpoint_id);
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(info) = manus.debug_info() {
        eprintln!("{}", serde_json::to_string_pretty(&info)?);
    }
    Ok(())
}
